//! 环境变量配置模块
//!
//! 此模块提供从环境变量读取数据库连接信息的功能，环境变量优先于配置文件。

use crate::config::{DatabaseSinkConfig, DbLogConfig};
use std::env;

/// 数据库连接字符串环境变量
pub const DATABASE_URL_VAR: &str = "QUANTUM_DBLOG_DATABASE_URL";
/// 目标表名环境变量
pub const TABLE_VAR: &str = "QUANTUM_DBLOG_TABLE";

/// 环境变量配置管理器
pub struct EnvConfig;

impl EnvConfig {
    /// 从环境变量读取数据库连接字符串
    pub fn get_database_url() -> Option<String> {
        Self::lookup_env(DATABASE_URL_VAR)
    }

    /// 从环境变量读取目标表名
    pub fn get_table_name() -> Option<String> {
        Self::lookup_env(TABLE_VAR)
    }

    /// 读取变量，空值视为未设置
    fn lookup_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|s| !s.is_empty())
    }

    /// 将环境变量覆盖到配置上
    pub fn apply_overrides(config: &mut DbLogConfig) {
        Self::apply_overrides_with(config, Self::lookup_env);
    }

    /// 用给定的变量查找函数覆盖配置
    ///
    /// 空值视为未设置。仅设置了连接字符串时也会创建数据库配置段。
    pub fn apply_overrides_with<F>(config: &mut DbLogConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|s| !s.is_empty());
        let url = read(DATABASE_URL_VAR);
        let table = read(TABLE_VAR);

        match config.database {
            Some(ref mut database) => {
                if let Some(url) = url {
                    database.connection_string = url;
                }
                if let Some(table) = table {
                    database.table_name = table;
                }
            }
            None => {
                if let Some(url) = url {
                    config.database = Some(DatabaseSinkConfig {
                        enabled: true,
                        connection_string: url,
                        table_name: table.unwrap_or_else(|| "logs".to_string()),
                    });
                }
            }
        }
    }
}
