use std::fmt;

use futures::stream::BoxStream;
use rollcall_types::errors::{ApplicationError, DbError};

/// Transaction isolation levels understood by the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL keyword(s) for `SET TRANSACTION ISOLATION LEVEL`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    TextArray(Vec<String>),
}

/// Named query parameters.
/// Backends bind them positionally in insertion order (`$1`, `$2`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: Vec<(String, SqlValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: SqlValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.params.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A result row: column values in select order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_columns(self) -> Vec<String> {
        self.columns
    }

    /// Splits off the first two columns, failing on shorter rows.
    pub fn into_pair(self) -> Result<(String, String), DbError> {
        let found = self.columns.len();
        let mut columns = self.columns.into_iter();

        match (columns.next(), columns.next()) {
            (Some(first), Some(second)) => Ok((first, second)),
            _ => Err(DbError::MalformedRow { expected: 2, found }),
        }
    }
}

/// Lazy, forward-only sequence of rows.
/// `None` marks the end; a storage failure mid-way is an `Err` item.
pub type RowStream = BoxStream<'static, Result<Row, ApplicationError>>;

pub struct QueryResult {
    rows: RowStream,
}

impl QueryResult {
    pub fn new(rows: RowStream) -> Self {
        Self { rows }
    }

    pub fn result(self) -> RowStream {
        self.rows
    }
}

/// A Unit of Work (UoW) runs every operation within a single transaction.
///
/// Dropping a unit of work without calling `commit` or `rollback` must roll
/// the transaction back.
#[async_trait::async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn query(&self, sql: &str, params: QueryParams)
    -> Result<QueryResult, ApplicationError>;

    // Transaction control methods
    // Consume self to ensure the UoW is not used after commit/rollback
    async fn commit(self: Box<Self>) -> Result<(), ApplicationError>;
    async fn rollback(self: Box<Self>) -> Result<(), ApplicationError>;
}

/// A factory for creating Unit of Work instances.
#[async_trait::async_trait]
pub trait UnitOfWorkProvider: Send + Sync {
    /// Begin a new Unit of Work (transaction) at the given isolation level.
    async fn begin(&self, isolation: IsolationLevel)
    -> Result<Box<dyn UnitOfWork>, ApplicationError>;
}
