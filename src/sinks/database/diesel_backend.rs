//! 基于 Diesel 的数据库连接
//!
//! 把 Diesel 的 SQLite、MySQL、PostgreSQL 连接适配为 sink 使用的 `Connection`。
//! 事务通过连接自带的事务管理器控制，深度为零以外一律视为已有事务，不创建保存点。

use diesel::connection::{Connection as DieselConnectionTrait, TransactionManager};
use diesel::result::Error as DieselError;
use tracing::{debug, info};

use crate::config::{is_valid_table_name, DatabaseSinkConfig};
use crate::error::{DbLogError, Result};
use crate::sinks::database::connection::{
    check_binds, share, BindType, BindValue, ConnectionError, ConnectionResult,
};
use crate::sinks::database::sink::DatabaseSink;

/// Diesel 连接包装
///
/// `close` 会丢弃内部连接，之后的所有操作返回 `ConnectionError::Closed`。
pub struct DieselConnection<C> {
    inner: Option<C>,
}

impl<C> std::fmt::Debug for DieselConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DieselConnection")
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl<C: DieselConnectionTrait> DieselConnection<C> {
    /// 根据连接字符串建立连接
    pub fn establish(database_url: &str) -> Result<Self> {
        let connection = C::establish(database_url).map_err(|e| DbLogError::DatabaseConnection {
            source: ConnectionError::backend(e.to_string()),
        })?;
        Ok(Self::from_raw(connection))
    }

    /// 包装一个已建立的连接
    pub fn from_raw(connection: C) -> Self {
        Self {
            inner: Some(connection),
        }
    }

    /// 访问底层连接，例如用于建表或查询
    pub fn raw_mut(&mut self) -> ConnectionResult<&mut C> {
        self.inner.as_mut().ok_or(ConnectionError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn depth(&mut self) -> ConnectionResult<u32> {
        let conn = self.raw_mut()?;
        let depth = C::TransactionManager::transaction_manager_status_mut(conn)
            .transaction_depth()
            .map_err(map_diesel_error)?;
        Ok(depth.map_or(0, |d| d.get()))
    }

    fn under_transaction(&mut self) -> bool {
        matches!(self.depth(), Ok(depth) if depth > 0)
    }

    fn begin_transaction(&mut self) -> ConnectionResult<()> {
        if self.depth()? > 0 {
            return Err(ConnectionError::TransactionAlreadyActive);
        }
        C::TransactionManager::begin_transaction(self.raw_mut()?).map_err(map_diesel_error)
    }

    fn commit_transaction(&mut self) -> ConnectionResult<()> {
        if self.depth()? == 0 {
            return Err(ConnectionError::NoActiveTransaction);
        }
        C::TransactionManager::commit_transaction(self.raw_mut()?).map_err(map_diesel_error)
    }

    fn rollback_transaction(&mut self) -> ConnectionResult<()> {
        if self.depth()? == 0 {
            return Err(ConnectionError::NoActiveTransaction);
        }
        C::TransactionManager::rollback_transaction(self.raw_mut()?).map_err(map_diesel_error)
    }

    fn close_connection(&mut self) -> bool {
        // 底层连接在 drop 时关闭，未提交的事务由数据库回滚
        self.inner.take().is_some()
    }
}

/// 将 Diesel 错误映射为连接层错误
pub fn map_diesel_error(error: DieselError) -> ConnectionError {
    match error {
        DieselError::DatabaseError(_, info) => ConnectionError::rejected(info.message()),
        DieselError::NotInTransaction => ConnectionError::NoActiveTransaction,
        DieselError::AlreadyInTransaction => ConnectionError::TransactionAlreadyActive,
        other => ConnectionError::backend(other.to_string()),
    }
}

/// 把 `?` 占位符改写为 PostgreSQL 的 `$n` 形式
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
fn numbered_placeholders(sql: &str) -> String {
    let mut index = 0;
    let mut out = String::with_capacity(sql.len() + 8);
    for c in sql.chars() {
        if c == '?' {
            index += 1;
            out.push('$');
            out.push_str(&index.to_string());
        } else {
            out.push(c);
        }
    }
    out
}

macro_rules! impl_log_connection {
    ($conn:ty, $backend:ty, $rewrite:expr) => {
        impl crate::sinks::database::connection::Connection for DieselConnection<$conn> {
            fn is_under_transaction(&mut self) -> bool {
                self.under_transaction()
            }

            fn begin(&mut self) -> ConnectionResult<()> {
                self.begin_transaction()
            }

            fn commit(&mut self) -> ConnectionResult<()> {
                self.commit_transaction()
            }

            fn rollback(&mut self) -> ConnectionResult<()> {
                self.rollback_transaction()
            }

            fn close(&mut self) -> ConnectionResult<bool> {
                Ok(self.close_connection())
            }

            fn execute(
                &mut self,
                sql: &str,
                params: &[BindValue],
                types: &[BindType],
            ) -> ConnectionResult<()> {
                use diesel::sql_types::{BigInt, Bool, Double, Nullable, Text};
                use diesel::RunQueryDsl;

                check_binds(params, types)?;
                let rewrite: fn(&str) -> String = $rewrite;
                let statement = rewrite(sql);

                let mut query = diesel::sql_query(statement).into_boxed::<$backend>();
                for (value, bind_type) in params.iter().zip(types) {
                    query = match (value, bind_type) {
                        (BindValue::Str(s), _) => query.bind::<Text, _>(s.clone()),
                        (BindValue::Int(i), _) => query.bind::<BigInt, _>(*i),
                        (BindValue::Float(f), _) => query.bind::<Double, _>(*f),
                        (BindValue::Bool(b), _) => query.bind::<Bool, _>(*b),
                        (BindValue::Null, BindType::Int) => {
                            query.bind::<Nullable<BigInt>, _>(None::<i64>)
                        }
                        (BindValue::Null, BindType::Float) => {
                            query.bind::<Nullable<Double>, _>(None::<f64>)
                        }
                        (BindValue::Null, BindType::Bool) => {
                            query.bind::<Nullable<Bool>, _>(None::<bool>)
                        }
                        (BindValue::Null, _) => query.bind::<Nullable<Text>, _>(None::<String>),
                    };
                }

                query
                    .execute(self.raw_mut()?)
                    .map(|_| ())
                    .map_err(map_diesel_error)
            }
        }
    };
}

#[cfg(feature = "sqlite")]
impl_log_connection!(
    diesel::sqlite::SqliteConnection,
    diesel::sqlite::Sqlite,
    |sql: &str| sql.to_string()
);

#[cfg(feature = "mysql")]
impl_log_connection!(
    diesel::mysql::MysqlConnection,
    diesel::mysql::Mysql,
    |sql: &str| sql.to_string()
);

#[cfg(feature = "postgres")]
impl_log_connection!(
    diesel::pg::PgConnection,
    diesel::pg::Pg,
    numbered_placeholders
);

/// SQLite 日志连接
#[cfg(feature = "sqlite")]
pub type SqliteLogConnection = DieselConnection<diesel::sqlite::SqliteConnection>;

/// MySQL 日志连接
#[cfg(feature = "mysql")]
pub type MysqlLogConnection = DieselConnection<diesel::mysql::MysqlConnection>;

/// PostgreSQL 日志连接
#[cfg(feature = "postgres")]
pub type PgLogConnection = DieselConnection<diesel::pg::PgConnection>;

impl<C> DatabaseSink<DieselConnection<C>>
where
    C: DieselConnectionTrait + Send,
    DieselConnection<C>: crate::sinks::database::connection::Connection,
{
    /// 根据配置建立连接并创建 sink
    ///
    /// 表必须已经存在，这里不会创建或修改表结构。
    pub fn from_config(name: impl Into<String>, config: &DatabaseSinkConfig) -> Result<Self> {
        if !config.enabled {
            return Err(DbLogError::config("数据库输出未启用"));
        }
        if !is_valid_table_name(&config.table_name) {
            return Err(DbLogError::config(format!(
                "无效的表名: '{}'",
                config.table_name
            )));
        }

        let connection = DieselConnection::<C>::establish(&config.connection_string)?;
        info!(table = %config.table_name, "database sink connected");
        debug!(config = ?config, "database sink configuration");

        Ok(DatabaseSink::new(
            name,
            share(connection),
            config.table_name.clone(),
        ))
    }
}

/// 打开 SQLite 数据库并创建 sink
#[cfg(feature = "sqlite")]
pub fn open_sqlite_sink(
    name: impl Into<String>,
    config: &DatabaseSinkConfig,
) -> Result<DatabaseSink<SqliteLogConnection>> {
    DatabaseSink::from_config(name, config)
}


#[cfg(all(test, feature = "sqlite"))]
mod sqlite_tests {
    use super::*;
    use crate::core::formatter::LineFormatter;
    use crate::core::item::{LogItem, Severity};
    use crate::sinks::database::connection::Connection;
    use crate::sinks::traits::Adapter;
    use diesel::sql_types::BigInt;
    use diesel::sqlite::SqliteConnection;
    use diesel::{QueryableByName, RunQueryDsl};
    use tempfile::TempDir;

    #[derive(QueryableByName)]
    struct Count {
        #[diesel(sql_type = BigInt)]
        count: i64,
    }

    const CREATE_TABLE: &str = "CREATE TABLE logs (\
        id INTEGER PRIMARY KEY AUTOINCREMENT, \
        name TEXT NOT NULL, \
        type INTEGER NOT NULL, \
        message TEXT NOT NULL, \
        time INTEGER NOT NULL)";

    fn prepare(dir: &TempDir) -> DatabaseSinkConfig {
        let path = dir.path().join("logs.db");
        let url = path.to_string_lossy().into_owned();
        let mut conn = SqliteConnection::establish(&url).unwrap();
        diesel::sql_query(CREATE_TABLE).execute(&mut conn).unwrap();
        DatabaseSinkConfig {
            enabled: true,
            connection_string: url,
            table_name: "logs".to_string(),
        }
    }

    fn count_rows(config: &DatabaseSinkConfig) -> i64 {
        let mut conn = SqliteConnection::establish(&config.connection_string).unwrap();
        let rows: Vec<Count> = diesel::sql_query("SELECT COUNT(*) AS count FROM logs")
            .load(&mut conn)
            .unwrap();
        rows[0].count
    }

    fn open(config: &DatabaseSinkConfig) -> DatabaseSink<SqliteLogConnection> {
        open_sqlite_sink("app", config)
            .unwrap()
            .with_formatter(LineFormatter::new("{message}"))
    }

    #[test]
    fn test_sqlite_autocommit_insert() {
        let dir = TempDir::new().unwrap();
        let config = prepare(&dir);
        let mut sink = open(&config);

        sink.process(&LogItem::at_timestamp("boot", Severity::Error, 1000))
            .unwrap();
        assert_eq!(count_rows(&config), 1);
        assert!(sink.close().unwrap());
        assert!(!sink.close().unwrap());
    }

    #[test]
    fn test_sqlite_rollback_and_close_commit() {
        let dir = TempDir::new().unwrap();
        let config = prepare(&dir);
        let mut sink = open(&config);

        sink.begin().unwrap();
        sink.process(&LogItem::at_timestamp("discarded", Severity::Info, 1))
            .unwrap();
        sink.rollback().unwrap();
        assert_eq!(count_rows(&config), 0);

        sink.begin().unwrap();
        assert!(sink.in_transaction());
        assert!(sink.begin().is_err());
        sink.process(&LogItem::at_timestamp("kept", Severity::Info, 2))
            .unwrap();
        assert!(sink.close().unwrap());
        assert_eq!(count_rows(&config), 1);
    }

    #[test]
    fn test_sqlite_missing_table_is_write_error() {
        let dir = TempDir::new().unwrap();
        let mut config = prepare(&dir);
        config.table_name = "missing".to_string();
        let mut sink = open(&config);

        let err = sink
            .process(&LogItem::at_timestamp("boot", Severity::Error, 1000))
            .unwrap_err();
        assert!(matches!(
            err,
            DbLogError::WriteError {
                source: ConnectionError::Rejected(_),
                ..
            }
        ));
    }

    #[test]
    fn test_sqlite_commit_without_transaction() {
        let dir = TempDir::new().unwrap();
        let config = prepare(&dir);
        let mut conn = SqliteLogConnection::establish(&config.connection_string).unwrap();
        assert_eq!(conn.commit(), Err(ConnectionError::NoActiveTransaction));
        assert!(conn.close().unwrap());
        assert_eq!(conn.begin(), Err(ConnectionError::Closed));
    }

    #[test]
    fn test_disabled_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = prepare(&dir);
        config.enabled = false;
        let err = open_sqlite_sink("app", &config).unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
