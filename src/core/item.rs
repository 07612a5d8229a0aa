//! QuantumDbLog 日志条目定义
//!
//! 此模块定义了在 sink 之间传递的日志条目以及严重级别。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 日志严重级别
///
/// 数值越小越严重，数值即写入数据库 `type` 列的整数代码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Emergency = 0,
    Critical = 1,
    Alert = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
    Custom = 8,
}

impl Severity {
    /// 所有级别，按代码排序
    pub const ALL: [Severity; 9] = [
        Severity::Emergency,
        Severity::Critical,
        Severity::Alert,
        Severity::Error,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
        Severity::Custom,
    ];

    /// 整数代码
    pub fn code(self) -> i64 {
        self as i64
    }

    /// 从整数代码还原级别
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// 大写名称
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EMERGENCY" => Ok(Severity::Emergency),
            "CRITICAL" => Ok(Severity::Critical),
            "ALERT" => Ok(Severity::Alert),
            "ERROR" => Ok(Severity::Error),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "NOTICE" => Ok(Severity::Notice),
            "INFO" => Ok(Severity::Info),
            "DEBUG" | "TRACE" => Ok(Severity::Debug),
            "CUSTOM" => Ok(Severity::Custom),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::INFO => Severity::Info,
            // DEBUG 与 TRACE
            _ => Severity::Debug,
        }
    }
}

/// 日志条目
///
/// 由调用方创建，sink 只读取不修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogItem {
    message: String,
    severity: Severity,
    time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    context: HashMap<String, serde_json::Value>,
}

impl LogItem {
    /// 创建新的日志条目
    pub fn new(message: impl Into<String>, severity: Severity, time: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            severity,
            time,
            context: HashMap::new(),
        }
    }

    /// 使用当前时间创建日志条目
    pub fn now(message: impl Into<String>, severity: Severity) -> Self {
        Self::new(message, severity, Utc::now())
    }

    /// 使用 Unix 秒级时间戳创建日志条目
    ///
    /// 超出 chrono 可表示范围的时间戳会被钳制为 Unix 纪元。
    pub fn at_timestamp(message: impl Into<String>, severity: Severity, secs: i64) -> Self {
        let time = Utc.timestamp_opt(secs, 0).single().unwrap_or_default();
        Self::new(message, severity, time)
    }

    /// 添加上下文字段
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// 替换全部上下文字段
    pub fn with_context_map(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// 写入数据库的整数类型代码
    pub fn type_code(&self) -> i64 {
        self.severity.code()
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Unix 秒级时间戳
    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }

    pub fn context(&self) -> &HashMap<String, serde_json::Value> {
        &self.context
    }
}
