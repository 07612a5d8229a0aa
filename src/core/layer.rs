//! tracing 桥接层
//!
//! 将 `tracing` 事件转换为 `LogItem` 并交给 `Logger` 分发。本 crate 自身发出的事件
//! 会被跳过，分发失败只计数、不再记录日志，防止递归。

use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::core::item::{LogItem, Severity};
use crate::core::logger::Logger;

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");
const CRATE_MODULE_PREFIX: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// 把 tracing 事件分发到 `Logger` 的层
#[derive(Debug, Clone)]
pub struct LoggerLayer {
    logger: Arc<Mutex<Logger>>,
    failures: Arc<AtomicU64>,
}

impl LoggerLayer {
    pub fn new(logger: Arc<Mutex<Logger>>) -> Self {
        Self {
            logger,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 共享的 Logger
    pub fn logger(&self) -> Arc<Mutex<Logger>> {
        self.logger.clone()
    }

    /// 分发失败的事件数
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn dispatch(&self, item: &LogItem) {
        let result = match self.logger.lock() {
            Ok(mut logger) => logger.log_item(item).is_ok(),
            Err(_) => false,
        };
        if !result {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// 提取事件字段
struct FieldVisitor<'a> {
    fields: &'a mut HashMap<String, Value>,
    message: &'a mut String,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let value_str = format!("{:?}", value);
        if field.name() == "message" {
            *self.message = value_str;
        } else {
            self.insert(field, Value::String(value_str));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

/// 目标是否属于本 crate（crate 根或其子模块）
fn is_own_target(target: &str) -> bool {
    target == CRATE_TARGET || target.starts_with(CRATE_MODULE_PREFIX)
}

/// 将 tracing 事件转换为日志条目
pub fn event_to_item(event: &Event<'_>) -> LogItem {
    let metadata = event.metadata();
    let mut fields = HashMap::new();
    let mut message = String::new();

    event.record(&mut FieldVisitor {
        fields: &mut fields,
        message: &mut message,
    });

    // 没有消息字段时使用目标作为消息
    if message.is_empty() {
        message = format!("Event from {}", metadata.target());
    }

    LogItem::now(message, Severity::from(*metadata.level())).with_context_map(fields)
}

impl<S: Subscriber> Layer<S> for LoggerLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if is_own_target(event.metadata().target()) {
            return;
        }
        if DISPATCHING.with(|flag| flag.replace(true)) {
            return;
        }

        let item = event_to_item(event);
        self.dispatch(&item);

        DISPATCHING.with(|flag| flag.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formatter::LineFormatter;
    use crate::sinks::database::connection::{share, BindValue, ConnectionError};
    use crate::sinks::database::memory::{MemoryConnection, Operation};
    use crate::sinks::database::sink::DatabaseSink;
    use tracing_subscriber::layer::SubscriberExt;

    fn setup() -> (
        LoggerLayer,
        crate::sinks::database::connection::SharedConnection<MemoryConnection>,
    ) {
        let connection = share(MemoryConnection::new().with_table("logs", 5));
        let logger = Logger::new("app").with_adapter(
            "db",
            DatabaseSink::new("app", connection.clone(), "logs")
                .with_formatter(LineFormatter::new("{message}")),
        );
        (LoggerLayer::new(Arc::new(Mutex::new(logger))), connection)
    }

    #[test]
    fn test_events_become_rows() {
        let (layer, connection) = setup();
        let subscriber = tracing_subscriber::registry().with(layer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "app", user = "alice", "login failed for {}", "alice");
            tracing::warn!(target: "app", "disk almost full");
        });

        let rows = connection.lock().unwrap().rows("logs");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], BindValue::Int(Severity::Error.code()));
        assert_eq!(rows[0][3], BindValue::from("login failed for alice"));
        assert_eq!(rows[1][2], BindValue::Int(Severity::Warning.code()));
        assert_eq!(layer.failure_count(), 0);
    }

    #[test]
    fn test_own_events_are_skipped() {
        let (layer, connection) = setup();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "quantum_dblog::sinks", "internal");
        });

        assert!(connection.lock().unwrap().rows("logs").is_empty());
    }

    #[test]
    fn test_similarly_named_crates_are_dispatched() {
        let (layer, connection) = setup();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "quantum_dblog", "root");
            tracing::info!(target: "quantum_dblog::core", "nested");
            tracing::info!(target: "quantum_dblog_ext", "extension");
            tracing::info!(target: "quantum_dblogger::api", "neighbour");
        });

        let rows = connection.lock().unwrap().rows("logs");
        let messages: Vec<BindValue> = rows.iter().map(|row| row[3].clone()).collect();
        assert_eq!(
            messages,
            vec![BindValue::from("extension"), BindValue::from("neighbour")]
        );
        assert!(!is_own_target("quantum_dblog_ext"));
        assert!(is_own_target("quantum_dblog::sinks::stream"));
    }

    #[test]
    fn test_failures_are_counted() {
        let (layer, connection) = setup();
        connection
            .lock()
            .unwrap()
            .fail_next(Operation::Execute, ConnectionError::rejected("disk full"));
        let subscriber = tracing_subscriber::registry().with(layer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", "lost");
            tracing::info!(target: "app", "kept");
        });

        assert_eq!(layer.failure_count(), 1);
        assert_eq!(connection.lock().unwrap().rows("logs").len(), 1);
    }

    #[test]
    fn test_fields_become_context() {
        let (layer, _connection) = setup();
        let subscriber = tracing_subscriber::registry().with(layer);
        let captured = Arc::new(Mutex::new(None));

        struct Capture(Arc<Mutex<Option<LogItem>>>);

        impl<S: Subscriber> Layer<S> for Capture {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                *self.0.lock().unwrap() = Some(event_to_item(event));
            }
        }

        let subscriber = subscriber.with(Capture(captured.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "app", attempts = 3u64, ok = false, ratio = 0.5);
        });

        let item = captured.lock().unwrap().take().unwrap();
        assert_eq!(item.severity(), Severity::Debug);
        assert_eq!(item.message(), "Event from app");
        assert_eq!(item.context()["attempts"], Value::from(3u64));
        assert_eq!(item.context()["ok"], Value::Bool(false));
        assert_eq!(item.context()["ratio"], Value::from(0.5));
    }
}
