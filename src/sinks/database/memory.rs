//! 内存数据库连接
//!
//! 一个进程内的 `Connection` 实现，用于测试和没有真实数据库的场景。
//! 支持预先声明的表、自增主键、事务暂存、调用日志以及故障注入。
//! 只理解 `INSERT INTO <table> VALUES (...)` 形式的语句，值表达式只能是 `?` 或 `null`。

use super::connection::{check_binds, BindType, BindValue, Connection, ConnectionError, ConnectionResult};
use std::collections::HashMap;

/// 连接上发生的一次调用
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin,
    Commit,
    Rollback,
    Close,
    Execute {
        sql: String,
        params: Vec<BindValue>,
        types: Vec<BindType>,
    },
}

/// 可注入故障的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Begin,
    Commit,
    Rollback,
    Close,
    Execute,
}

#[derive(Debug, Default)]
struct Table {
    columns: usize,
    rows: Vec<Vec<BindValue>>,
    next_id: i64,
}

impl Table {
    fn append(&mut self, mut values: Vec<BindValue>) {
        self.next_id += 1;
        if let Some(first) = values.first_mut() {
            if *first == BindValue::Null {
                *first = BindValue::Int(self.next_id);
            }
        }
        self.rows.push(values);
    }
}

/// 内存连接
#[derive(Debug)]
pub struct MemoryConnection {
    tables: HashMap<String, Table>,
    /// 打开事务时暂存的 (表名, 行)
    staged: Option<Vec<(String, Vec<BindValue>)>>,
    open: bool,
    journal: Vec<Call>,
    failures: HashMap<Operation, ConnectionError>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// 创建一个已打开、没有任何表的连接
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            staged: None,
            open: true,
            journal: Vec::new(),
            failures: HashMap::new(),
        }
    }

    /// 声明一张具有指定列数的表
    pub fn with_table(mut self, name: impl Into<String>, columns: usize) -> Self {
        self.create_table(name, columns);
        self
    }

    /// 声明一张具有指定列数的表，已存在时保持原样
    pub fn create_table(&mut self, name: impl Into<String>, columns: usize) {
        self.tables.entry(name.into()).or_insert_with(|| Table {
            columns,
            ..Default::default()
        });
    }

    /// 下一次执行 `operation` 时返回 `error`（一次性）
    pub fn fail_next(&mut self, operation: Operation, error: ConnectionError) {
        self.failures.insert(operation, error);
    }

    /// 已提交、对其他读者可见的行
    pub fn rows(&self, table: &str) -> Vec<Vec<BindValue>> {
        self.tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// 当前事务中暂存的行
    pub fn pending_rows(&self, table: &str) -> Vec<Vec<BindValue>> {
        self.staged
            .iter()
            .flatten()
            .filter(|(name, _)| name == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// 调用日志
    pub fn journal(&self) -> &[Call] {
        &self.journal
    }

    /// 日志中某类调用的次数
    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.journal.iter().filter(|call| predicate(call)).count()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn record(&mut self, call: Call, operation: Operation) -> ConnectionResult<()> {
        self.journal.push(call);
        if let Some(error) = self.failures.remove(&operation) {
            return Err(error);
        }
        if !self.open {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    fn build_row(&self, sql: &str, params: &[BindValue]) -> ConnectionResult<(String, Vec<BindValue>)> {
        let (table_name, exprs) = parse_insert(sql)?;
        let table = self
            .tables
            .get(&table_name)
            .ok_or_else(|| ConnectionError::rejected(format!("no such table: {}", table_name)))?;

        if exprs.len() != table.columns {
            return Err(ConnectionError::rejected(format!(
                "table {} has {} columns but {} values were supplied",
                table_name,
                table.columns,
                exprs.len()
            )));
        }

        let mut bound = params.iter();
        let mut values = Vec::with_capacity(exprs.len());
        for expr in &exprs {
            match expr.to_ascii_lowercase().as_str() {
                "?" => values.push(
                    bound
                        .next()
                        .cloned()
                        .ok_or_else(|| ConnectionError::rejected("not enough bind values"))?,
                ),
                "null" => values.push(BindValue::Null),
                other => {
                    return Err(ConnectionError::rejected(format!(
                        "unsupported value expression: {}",
                        other
                    )))
                }
            }
        }
        if bound.next().is_some() {
            return Err(ConnectionError::rejected("too many bind values"));
        }

        Ok((table_name, values))
    }
}

/// 解析 `INSERT INTO <table> VALUES (...)`，返回表名与值表达式
fn parse_insert(sql: &str) -> ConnectionResult<(String, Vec<String>)> {
    const PREFIX: &str = "INSERT INTO ";
    const VALUES: &str = "VALUES";

    let unsupported = || ConnectionError::rejected(format!("unsupported statement: {}", sql));

    let statement = sql.trim().trim_end_matches(';').trim_end();
    if !statement.to_ascii_uppercase().starts_with(PREFIX) {
        return Err(unsupported());
    }

    let rest = statement[PREFIX.len()..].trim_start();
    let (table, rest) = rest.split_once(char::is_whitespace).ok_or_else(unsupported)?;
    let rest = rest.trim_start();
    if !rest.to_ascii_uppercase().starts_with(VALUES) {
        return Err(unsupported());
    }

    let list = rest[VALUES.len()..].trim();
    let inner = list
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(unsupported)?;

    let exprs = inner.split(',').map(|s| s.trim().to_string()).collect();
    Ok((table.to_string(), exprs))
}

impl Connection for MemoryConnection {
    fn is_under_transaction(&mut self) -> bool {
        self.open && self.staged.is_some()
    }

    fn begin(&mut self) -> ConnectionResult<()> {
        self.record(Call::Begin, Operation::Begin)?;
        if self.staged.is_some() {
            return Err(ConnectionError::TransactionAlreadyActive);
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> ConnectionResult<()> {
        self.record(Call::Commit, Operation::Commit)?;
        let staged = self.staged.take().ok_or(ConnectionError::NoActiveTransaction)?;
        for (table, row) in staged {
            if let Some(table) = self.tables.get_mut(&table) {
                table.append(row);
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> ConnectionResult<()> {
        self.record(Call::Rollback, Operation::Rollback)?;
        self.staged
            .take()
            .map(|_| ())
            .ok_or(ConnectionError::NoActiveTransaction)
    }

    fn close(&mut self) -> ConnectionResult<bool> {
        self.journal.push(Call::Close);
        if let Some(error) = self.failures.remove(&Operation::Close) {
            return Err(error);
        }
        if !self.open {
            return Ok(false);
        }
        // 关闭时未提交的事务被隐式回滚
        self.staged = None;
        self.open = false;
        Ok(true)
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[BindValue],
        types: &[BindType],
    ) -> ConnectionResult<()> {
        self.record(
            Call::Execute {
                sql: sql.to_string(),
                params: params.to_vec(),
                types: types.to_vec(),
            },
            Operation::Execute,
        )?;
        check_binds(params, types)?;
        let (table, row) = self.build_row(sql, params)?;

        match self.staged {
            Some(ref mut staged) => staged.push((table, row)),
            None => {
                if let Some(table) = self.tables.get_mut(&table) {
                    table.append(row);
                }
            }
        }
        Ok(())
    }
}
