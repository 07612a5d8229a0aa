//! 日志分发器
//!
//! `Logger` 持有一组命名适配器，把每条日志按名称顺序分发给它们。
//! 事务控制不经过分发器，调用方通过 `adapter_mut` 直接操作具体适配器。

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::core::item::{LogItem, Severity};
use crate::error::{DbLogError, Result};
use crate::sinks::traits::Adapter;

/// 日志分发器
#[derive(Debug)]
pub struct Logger {
    name: String,
    adapters: BTreeMap<String, Box<dyn Adapter>>,
    log_level: Severity,
    /// 仅对下一次 `log` 调用生效的排除列表
    excluded: HashSet<String>,
}

impl Logger {
    /// 创建没有任何适配器的分发器，默认记录所有级别
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            adapters: BTreeMap::new(),
            log_level: Severity::Custom,
            excluded: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 注册适配器，同名适配器会被替换并返回旧值
    pub fn add_adapter(
        &mut self,
        name: impl Into<String>,
        adapter: impl Adapter + 'static,
    ) -> Option<Box<dyn Adapter>> {
        self.adapters.insert(name.into(), Box::new(adapter))
    }

    /// 构建器风格的 `add_adapter`
    pub fn with_adapter(mut self, name: impl Into<String>, adapter: impl Adapter + 'static) -> Self {
        self.add_adapter(name, adapter);
        self
    }

    /// 移除适配器，移除时不会关闭它
    pub fn remove_adapter(&mut self, name: &str) -> Result<Box<dyn Adapter>> {
        self.adapters
            .remove(name)
            .ok_or_else(|| DbLogError::AdapterNotFound(name.to_string()))
    }

    pub fn adapter(&self, name: &str) -> Result<&dyn Adapter> {
        self.adapters
            .get(name)
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| DbLogError::AdapterNotFound(name.to_string()))
    }

    pub fn adapter_mut(&mut self, name: &str) -> Result<&mut (dyn Adapter + 'static)> {
        self.adapters
            .get_mut(name)
            .map(|adapter| adapter.as_mut())
            .ok_or_else(|| DbLogError::AdapterNotFound(name.to_string()))
    }

    /// 已注册的适配器名称（按名称排序）
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// 下一次 `log` 调用跳过这些适配器
    pub fn exclude_adapters<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    /// 设置最低记录级别，比它更详细的条目会被丢弃
    pub fn set_log_level(&mut self, level: Severity) {
        self.log_level = level;
    }

    pub fn log_level(&self) -> Severity {
        self.log_level
    }

    /// 记录一条日志
    pub fn log(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        context: HashMap<String, Value>,
    ) -> Result<()> {
        let item = LogItem::now(message, severity).with_context_map(context);
        self.log_item(&item)
    }

    /// 分发一条已构建的日志
    ///
    /// 每个适配器都会被调用，返回遇到的第一个错误。
    pub fn log_item(&mut self, item: &LogItem) -> Result<()> {
        let excluded = std::mem::take(&mut self.excluded);
        if item.severity() > self.log_level {
            return Ok(());
        }

        let mut first_error = None;
        for (name, adapter) in self.adapters.iter_mut() {
            if excluded.contains(name) {
                continue;
            }
            if let Err(e) = adapter.process(item) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn emergency(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Emergency, message, HashMap::new())
    }

    pub fn critical(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Critical, message, HashMap::new())
    }

    pub fn alert(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Alert, message, HashMap::new())
    }

    pub fn error(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Error, message, HashMap::new())
    }

    pub fn warning(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Warning, message, HashMap::new())
    }

    pub fn notice(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Notice, message, HashMap::new())
    }

    pub fn info(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Info, message, HashMap::new())
    }

    pub fn debug(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Debug, message, HashMap::new())
    }

    pub fn custom(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(Severity::Custom, message, HashMap::new())
    }

    /// 关闭所有适配器
    ///
    /// 每个适配器都会尝试关闭，返回遇到的第一个错误。
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (name, adapter) in self.adapters.iter_mut() {
            match adapter.close() {
                Ok(closed) => debug!(logger = %self.name, adapter = %name, closed, "adapter closed"),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formatter::LineFormatter;
    use crate::sinks::database::connection::{share, BindValue, ConnectionError, SharedConnection};
    use crate::sinks::database::memory::{MemoryConnection, Operation};
    use crate::sinks::database::sink::DatabaseSink;
    use crate::sinks::stream::StreamSink;
    use serde_json::json;

    fn create_logger() -> (Logger, SharedConnection<MemoryConnection>) {
        let connection = share(MemoryConnection::new().with_table("logs", 5));
        let logger = Logger::new("app")
            .with_adapter(
                "db",
                DatabaseSink::new("app", connection.clone(), "logs")
                    .with_formatter(LineFormatter::new("{message}")),
            )
            .with_adapter(
                "stream",
                StreamSink::new(Vec::new()).with_formatter(LineFormatter::new("{message}")),
            );
        (logger, connection)
    }

    fn row_count(connection: &SharedConnection<MemoryConnection>) -> usize {
        connection.lock().unwrap().rows("logs").len()
    }

    #[test]
    fn test_dispatch_to_all_adapters() {
        let (mut logger, connection) = create_logger();
        assert_eq!(logger.adapter_names(), vec!["db", "stream"]);

        logger.error("boot").unwrap();
        assert_eq!(row_count(&connection), 1);
    }

    #[test]
    fn test_log_level_filters_verbose_items() {
        let (mut logger, connection) = create_logger();
        logger.set_log_level(Severity::Warning);

        logger.debug("ignored").unwrap();
        logger.info("ignored").unwrap();
        logger.warning("kept").unwrap();
        logger.emergency("kept").unwrap();
        assert_eq!(row_count(&connection), 2);
    }

    #[test]
    fn test_exclusion_applies_to_next_call_only() {
        let (mut logger, connection) = create_logger();
        logger.exclude_adapters(["db"]);
        logger.info("stream only").unwrap();
        assert_eq!(row_count(&connection), 0);

        logger.info("everywhere").unwrap();
        assert_eq!(row_count(&connection), 1);
    }

    #[test]
    fn test_context_interpolated_into_message() {
        let (mut logger, connection) = create_logger();
        let mut context = HashMap::new();
        context.insert("user".to_string(), json!("alice"));
        logger
            .log(Severity::Notice, "login by {user}", context)
            .unwrap();

        let rows = connection.lock().unwrap().rows("logs");
        assert_eq!(rows[0][3], BindValue::from("login by alice"));
    }

    #[test]
    fn test_adapter_lookup() {
        let (mut logger, _connection) = create_logger();
        assert!(logger.adapter("db").is_ok());
        assert!(matches!(
            logger.adapter_mut("missing").unwrap_err(),
            DbLogError::AdapterNotFound(name) if name == "missing"
        ));

        let removed = logger.remove_adapter("stream").unwrap();
        let item = LogItem::at_timestamp("x", Severity::Info, 0);
        assert_eq!(removed.formatter().format(&item).unwrap(), "x");
        assert!(logger.remove_adapter("stream").is_err());
    }

    #[test]
    fn test_transaction_through_adapter_mut() {
        let (mut logger, connection) = create_logger();
        logger.adapter_mut("db").unwrap().begin().unwrap();
        logger.info("staged").unwrap();
        assert_eq!(row_count(&connection), 0);

        logger.close().unwrap();
        assert_eq!(row_count(&connection), 1);
    }

    #[test]
    fn test_first_error_propagates_after_all_adapters() {
        let (mut logger, connection) = create_logger();
        connection
            .lock()
            .unwrap()
            .fail_next(Operation::Execute, ConnectionError::rejected("disk full"));

        let err = logger.info("boot").unwrap_err();
        assert_eq!(err.category(), "write");
        assert_eq!(row_count(&connection), 0);

        logger.info("boot").unwrap();
        assert_eq!(row_count(&connection), 1);
    }
}
