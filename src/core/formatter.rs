//! 格式化器
//!
//! 负责将日志条目渲染为最终写入 sink 的文本，支持行文本与 JSON 两种格式。

use crate::config::{LogFormatConfig, LogFormatType};
use crate::core::item::{LogItem, Severity};
use crate::error::{DbLogError, Result};
use colored::Colorize;
use std::fmt::{Debug, Write as _};

/// 默认行模板
pub const DEFAULT_LINE_TEMPLATE: &str = "[{timestamp}][{level}] {message}";

/// 默认时间戳格式（ISO 8601）
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// 格式化器 trait
///
/// 所有 sink 通过此接口获取条目的最终文本表示。
pub trait Formatter: Send + Sync + Debug {
    /// 将条目渲染为字符串
    fn format(&self, item: &LogItem) -> Result<String>;
}

/// 用上下文字段替换消息中的 `{key}` 占位符
///
/// 从左到右扫描一遍消息，替换进来的值不会被再次展开；未知占位符原样保留。
pub fn interpolate(item: &LogItem) -> String {
    let context = item.context();
    let mut rest = item.message();
    if context.is_empty() {
        return rest.to_string();
    }

    let mut out = String::with_capacity(rest.len());
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let token = after
            .find('}')
            .and_then(|close| context.get(&after[..close]).map(|v| (v, &after[close + 1..])));
        match token {
            Some((value, tail)) => {
                match value {
                    serde_json::Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// 按 strftime 格式渲染条目时间，格式无效时返回 `FormatError`
fn format_time(item: &LogItem, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", item.time().format(format))
        .map_err(|_| DbLogError::format(format!("无效的时间戳格式: '{}'", format)))?;
    Ok(out)
}

/// 行文本格式化器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormatter {
    template: String,
    timestamp_format: String,
    colored: bool,
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_TEMPLATE)
    }
}

impl LineFormatter {
    /// 使用指定模板创建格式化器
    ///
    /// 模板支持 `{timestamp}`、`{level}` 与 `{message}` 占位符。
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            colored: false,
        }
    }

    /// 设置时间戳格式（chrono strftime 语法）
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// 启用或禁用级别着色
    pub fn with_colors(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn render_level(&self, severity: Severity) -> String {
        if !self.colored {
            return severity.to_string();
        }
        let name = severity.as_str();
        match severity {
            Severity::Emergency | Severity::Critical | Severity::Alert => {
                name.red().bold().to_string()
            }
            Severity::Error => name.red().to_string(),
            Severity::Warning => name.yellow().to_string(),
            Severity::Notice => name.cyan().to_string(),
            Severity::Info => name.green().to_string(),
            Severity::Debug => name.blue().to_string(),
            Severity::Custom => name.magenta().to_string(),
        }
    }
}

impl Formatter for LineFormatter {
    fn format(&self, item: &LogItem) -> Result<String> {
        let timestamp = format_time(item, &self.timestamp_format)?;
        // {message} 最后替换，避免消息内容中的占位符被二次展开
        Ok(self
            .template
            .replace("{timestamp}", &timestamp)
            .replace("{level}", &self.render_level(item.severity()))
            .replace("{message}", &interpolate(item)))
    }
}

/// JSON 格式化器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFormatter {
    timestamp_format: String,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置时间戳格式
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, item: &LogItem) -> Result<String> {
        let mut object = serde_json::Map::new();
        object.insert("level".into(), item.severity().as_str().into());
        object.insert("message".into(), interpolate(item).into());
        object.insert(
            "timestamp".into(),
            format_time(item, &self.timestamp_format)?.into(),
        );
        if !item.context().is_empty() {
            let context = serde_json::to_value(item.context())
                .map_err(|e| DbLogError::format(format!("context serialization failed: {}", e)))?;
            object.insert("context".into(), context);
        }
        serde_json::to_string(&object)
            .map_err(|e| DbLogError::format(format!("JSON serialization failed: {}", e)))
    }
}

/// 根据配置构建格式化器
pub fn build_formatter(config: &LogFormatConfig) -> Box<dyn Formatter> {
    match config.format_type {
        LogFormatType::Text => Box::new(
            LineFormatter::new(config.template.clone())
                .with_timestamp_format(config.timestamp_format.clone())
                .with_colors(config.colored),
        ),
        LogFormatType::Json => Box::new(
            JsonFormatter::new().with_timestamp_format(config.timestamp_format.clone()),
        ),
    }
}
