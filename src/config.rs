//! 定义 QuantumDbLog 的所有配置结构体。

use crate::core::formatter::{DEFAULT_LINE_TEMPLATE, DEFAULT_TIMESTAMP_FORMAT};
use crate::core::item::Severity;
use crate::error::{DbLogError, Result};
use serde::Deserialize;
use std::path::Path;

// --- 辅助函数，用于提供配置项的默认值 ---
fn default_logger_name() -> String {
    "app".to_string()
}
fn default_level() -> String {
    "CUSTOM".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}
fn default_log_template() -> String {
    DEFAULT_LINE_TEMPLATE.to_string()
}
fn default_db_table_name() -> String {
    "logs".to_string()
}
fn default_format_type() -> LogFormatType {
    LogFormatType::Text
}

/// QuantumDbLog 的顶层配置结构体。
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DbLogConfig {
    /// 写入每一行的 sink 名称
    #[serde(default = "default_logger_name")]
    pub name: String,
    /// 最低记录级别，比它更详细的条目会被丢弃
    #[serde(default = "default_level")]
    pub level: String,
    pub database: Option<DatabaseSinkConfig>,
    #[serde(default)]
    pub format: LogFormatConfig,
}

impl Default for DbLogConfig {
    fn default() -> Self {
        Self {
            name: default_logger_name(),
            level: default_level(),
            database: None,
            format: LogFormatConfig::default(),
        }
    }
}

impl DbLogConfig {
    /// 解析后的最低级别
    pub fn severity(&self) -> Result<Severity> {
        self.level
            .parse::<Severity>()
            .map_err(|_| DbLogError::InvalidLogLevel(self.level.clone()))
    }
}

/// 日志格式类型
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum LogFormatType {
    Text,
    Json,
}

/// 日志格式化相关的配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogFormatConfig {
    #[serde(default = "default_format_type")]
    pub format_type: LogFormatType,
    #[serde(default = "default_log_template")]
    pub template: String,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default = "default_false")]
    pub colored: bool,
}

impl Default for LogFormatConfig {
    fn default() -> Self {
        Self {
            format_type: default_format_type(),
            template: default_log_template(),
            timestamp_format: default_timestamp_format(),
            colored: default_false(),
        }
    }
}

/// 数据库输出的配置。
#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSinkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub connection_string: String,
    #[serde(default = "default_db_table_name")]
    pub table_name: String,
}

// 安全的Debug实现，避免泄露敏感的连接字符串
impl std::fmt::Debug for DatabaseSinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSinkConfig")
            .field("enabled", &self.enabled)
            .field("connection_string", &"[REDACTED]")
            .field("table_name", &self.table_name)
            .finish()
    }
}

/// 用于从 TOML 文件加载 `DbLogConfig` 的辅助函数。
pub fn load_config_from_file(path: &Path) -> Result<DbLogConfig> {
    if !path.exists() {
        return Err(DbLogError::ConfigFileMissing(
            path.to_string_lossy().into_owned(),
        ));
    }

    let config_str = std::fs::read_to_string(path)?;
    load_config_from_str(&config_str)
}

/// 用于从 TOML 字符串加载 `DbLogConfig` 的辅助函数。
pub fn load_config_from_str(config_str: &str) -> Result<DbLogConfig> {
    let config: DbLogConfig = toml::from_str(config_str)?;
    Ok(config)
}

/// 表名只允许 `[schema.]table` 形式的标识符，表名会被直接拼接进 SQL。
pub fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return false;
    }
    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

/// 验证配置的有效性。
pub fn validate_config(config: &DbLogConfig) -> Result<()> {
    config.severity()?;

    if config.name.trim().is_empty() {
        return Err(DbLogError::config("sink 名称不能为空"));
    }

    if let Some(ref database) = config.database {
        if database.enabled && database.connection_string.trim().is_empty() {
            return Err(DbLogError::config("数据库连接字符串不能为空"));
        }
        if !is_valid_table_name(&database.table_name) {
            return Err(DbLogError::config(format!(
                "无效的表名: '{}'",
                database.table_name
            )));
        }
    }

    if config.format.format_type == LogFormatType::Text
        && !config.format.template.contains("{message}")
    {
        return Err(DbLogError::config("行模板必须包含 {message} 占位符"));
    }

    Ok(())
}
