//! 流输出 Sink 实现
//!
//! 将每条日志格式化为一行写入任意 `Write`：标准输出、标准错误或以追加模式打开的文件。
//! 流没有原生事务，事务期间的条目暂存在内存队列中，提交时按顺序写出。

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::core::formatter::{Formatter, LineFormatter};
use crate::core::item::LogItem;
use crate::error::{DbLogError, Result, TransactionOp};
use crate::sinks::traits::{Adapter, TransactionQueue};

/// 流输出 Sink
pub struct StreamSink<W: Write + Send> {
    writer: W,
    queue: TransactionQueue,
    formatter: Box<dyn Formatter>,
    closed: bool,
}

impl<W: Write + Send> fmt::Debug for StreamSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSink")
            .field("queued", &self.queue.len())
            .field("formatter", &self.formatter)
            .field("closed", &self.closed)
            .finish()
    }
}

impl StreamSink<io::Stdout> {
    /// 输出到标准输出
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl StreamSink<io::Stderr> {
    /// 输出到标准错误
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl StreamSink<BufWriter<File>> {
    /// 以追加模式打开文件，文件不存在时创建
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "stream sink opened file");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            queue: TransactionQueue::new(),
            formatter: Box::new(LineFormatter::default()),
            closed: false,
        }
    }

    /// 使用指定格式化器
    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// 底层写入器
    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// 事务中暂存的条目数
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(DbLogError::SinkClosed)
        } else {
            Ok(())
        }
    }

    fn write_item(&mut self, item: &LogItem) -> Result<()> {
        let line = self.formatter.format(item)?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    /// 结束事务并按顺序写出暂存条目
    ///
    /// 某条写入失败时，该条及其后的条目放回队列，事务保持打开，可以重试。
    fn write_queued(&mut self, operation: TransactionOp) -> Result<()> {
        let items = self.queue.take(operation)?;
        debug!(count = items.len(), "stream sink committing queued items");
        for (written, item) in items.iter().enumerate() {
            if let Err(e) = self.write_item(item) {
                self.queue.restore(items[written..].to_vec());
                return Err(e);
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Adapter for StreamSink<W> {
    fn process(&mut self, item: &LogItem) -> Result<()> {
        self.ensure_open()?;
        if self.queue.push(item) {
            return Ok(());
        }
        self.write_item(item)
    }

    fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.queue.begin()
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.write_queued(TransactionOp::Commit)
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        let items = self.queue.take(TransactionOp::Rollback)?;
        debug!(count = items.len(), "stream sink discarded queued items");
        Ok(())
    }

    fn in_transaction(&mut self) -> bool {
        !self.closed && self.queue.is_active()
    }

    /// 关闭 sink
    ///
    /// 与数据库 sink 一致，关闭前先写出事务中暂存的条目。重复关闭返回 `false`。
    /// 写出或刷新失败时 sink 保持打开，未写出的条目仍在事务中。
    fn close(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.queue.is_active() {
            self.write_queued(TransactionOp::Commit)?;
        }
        self.writer.flush()?;
        self.closed = true;
        debug!("stream sink closed");
        Ok(true)
    }

    fn formatter(&self) -> &dyn Formatter {
        self.formatter.as_ref()
    }

    fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = formatter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::Severity;
    use crate::sinks::database::connection::ConnectionError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_sink() -> StreamSink<Vec<u8>> {
        StreamSink::new(Vec::new()).with_formatter(LineFormatter::new("[{level}] {message}"))
    }

    fn item(message: &str) -> LogItem {
        LogItem::at_timestamp(message, Severity::Info, 0)
    }

    fn output(sink: &StreamSink<Vec<u8>>) -> String {
        String::from_utf8(sink.writer().clone()).unwrap()
    }

    #[test]
    fn test_process_writes_one_line_per_item() {
        let mut sink = create_sink();
        sink.process(&item("first")).unwrap();
        sink.process(&item("second")).unwrap();
        assert_eq!(output(&sink), "[INFO] first\n[INFO] second\n");
    }

    #[test]
    fn test_transaction_queue() {
        let mut sink = create_sink();
        sink.begin().unwrap();
        sink.process(&item("queued")).unwrap();
        assert_eq!(sink.queued(), 1);
        assert!(sink.in_transaction());
        assert_eq!(output(&sink), "");

        sink.commit().unwrap();
        assert_eq!(output(&sink), "[INFO] queued\n");

        sink.begin().unwrap();
        sink.process(&item("dropped")).unwrap();
        sink.rollback().unwrap();
        assert_eq!(output(&sink), "[INFO] queued\n");
        assert!(!sink.in_transaction());
    }

    #[test]
    fn test_transaction_state_errors() {
        let mut sink = create_sink();
        assert!(matches!(
            sink.commit().unwrap_err(),
            DbLogError::TransactionError {
                operation: TransactionOp::Commit,
                source: ConnectionError::NoActiveTransaction,
            }
        ));
        sink.begin().unwrap();
        assert_eq!(sink.begin().unwrap_err().category(), "transaction");
    }

    #[test]
    fn test_close_writes_queue_then_rejects() {
        let mut sink = create_sink();
        sink.begin().unwrap();
        sink.process(&item("pending")).unwrap();

        assert!(sink.close().unwrap());
        assert_eq!(output(&sink), "[INFO] pending\n");
        assert!(!sink.close().unwrap());

        assert!(matches!(
            sink.process(&item("late")).unwrap_err(),
            DbLogError::SinkClosed
        ));
        assert!(matches!(sink.begin().unwrap_err(), DbLogError::SinkClosed));
    }

    /// 可切换为失败状态的写入器
    struct FlakyWriter {
        out: Vec<u8>,
        failing: Arc<AtomicBool>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            Ok(())
        }
    }

    fn create_flaky_sink() -> (StreamSink<FlakyWriter>, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let writer = FlakyWriter {
            out: Vec::new(),
            failing: failing.clone(),
        };
        let sink = StreamSink::new(writer).with_formatter(LineFormatter::new("{message}"));
        (sink, failing)
    }

    #[test]
    fn test_failed_close_keeps_queue_for_retry() {
        let (mut sink, failing) = create_flaky_sink();
        sink.begin().unwrap();
        sink.process(&item("a")).unwrap();
        sink.process(&item("b")).unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(matches!(sink.close().unwrap_err(), DbLogError::IoError { .. }));
        assert!(!sink.is_closed());
        assert!(sink.in_transaction());
        assert_eq!(sink.queued(), 2);

        failing.store(false, Ordering::SeqCst);
        assert!(sink.close().unwrap());
        assert_eq!(sink.writer().out, b"a\nb\n".to_vec());
        assert!(!sink.in_transaction());
    }

    #[test]
    fn test_failed_commit_keeps_transaction_open() {
        let (mut sink, failing) = create_flaky_sink();
        sink.begin().unwrap();
        sink.process(&item("queued")).unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(sink.commit().is_err());
        assert!(sink.in_transaction());

        failing.store(false, Ordering::SeqCst);
        sink.commit().unwrap();
        assert_eq!(sink.writer().out, b"queued\n".to_vec());
        assert!(!sink.in_transaction());
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.log");

        let mut sink = StreamSink::file(&path)
            .unwrap()
            .with_formatter(LineFormatter::new("{message}"));
        sink.process(&item("one")).unwrap();
        assert!(sink.close().unwrap());

        let mut sink = StreamSink::file(&path)
            .unwrap()
            .with_formatter(LineFormatter::new("{message}"));
        sink.process(&item("two")).unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }
}
