use futures::{StreamExt, stream};
use sqlx::{
    PgPool, Postgres, Transaction,
    postgres::PgArguments,
    query::Query,
};
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use rollcall_app::uow::{
    IsolationLevel, QueryParams, QueryResult, Row, SqlValue, UnitOfWork, UnitOfWorkProvider,
};
use rollcall_types::errors::{ApplicationError, DbError};

use crate::mapping::to_row;

const DEFAULT_FETCH_SIZE: usize = 100;

type SharedTx = Arc<Mutex<Transaction<'static, Postgres>>>;

#[derive(Debug, Clone)]
pub struct PostgresUnitOfWorkProvider {
    pool: PgPool,
    fetch_size: usize,
}

impl PostgresUnitOfWorkProvider {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    /// Rows pulled per `FETCH` while streaming a result set.
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size.max(1);
        self
    }
}

#[async_trait::async_trait]
impl UnitOfWorkProvider for PostgresUnitOfWorkProvider {
    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn UnitOfWork>, ApplicationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;

        // Must run before the first query of the transaction.
        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_sql()
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;

        Ok(Box::new(PostgresUnitOfWork {
            tx: Arc::new(Mutex::new(tx)),
            fetch_size: self.fetch_size,
        }))
    }
}

/// A transaction whose queries are streamed through server-side cursors.
///
/// Each `query` declares a `NO SCROLL` cursor and the returned stream reads
/// it with `FETCH FORWARD`, so rows are pulled from the server on demand.
/// Cursors only live inside the transaction: drain or drop the stream
/// before `commit` or `rollback`.
#[derive(Debug)]
pub struct PostgresUnitOfWork {
    tx: SharedTx,
    fetch_size: usize,
}

#[async_trait::async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn query(
        &self,
        sql: &str,
        params: QueryParams,
    ) -> Result<QueryResult, ApplicationError> {
        let name = format!("rollcall_{}", Uuid::new_v4().simple());
        let declare = format!("DECLARE {name} NO SCROLL CURSOR FOR {sql}");

        {
            let mut tx_guard = self.tx.lock().await;

            bind_params(sqlx::query(&declare), &params)
                .persistent(false)
                .execute(&mut **tx_guard)
                .await
                .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;
        }

        tracing::trace!(cursor = %name, "Cursor declared");

        let cursor = Cursor {
            tx: Some(self.tx.clone()),
            name,
            fetch_size: self.fetch_size,
            buffered: VecDeque::new(),
        };

        let rows = stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.buffered.is_empty() {
                cursor.fetch_next_batch().await?;
            }
            Ok::<_, ApplicationError>(cursor.buffered.pop_front().map(|row| (row, cursor)))
        })
        .boxed();

        Ok(QueryResult::new(rows))
    }

    async fn commit(self: Box<Self>) -> Result<(), ApplicationError> {
        // Try to unwrap the Arc to get ownership of the Mutex<Transaction>.
        // If this fails, a row stream is still alive: the transaction
        // cannot be committed and will rollback on Drop.
        if let Ok(mutex) = Arc::try_unwrap(self.tx) {
            mutex
                .into_inner()
                .commit()
                .await
                .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;
        } else {
            return Err(ApplicationError::Db(DbError::Transaction(
                "transaction still has multiple owners".to_string(),
            )));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ApplicationError> {
        if let Ok(mutex) = Arc::try_unwrap(self.tx) {
            mutex
                .into_inner()
                .rollback()
                .await
                .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;
        } else {
            tracing::warn!("Row stream still open, refusing to report a rollback");
            return Err(ApplicationError::Db(DbError::Transaction(
                "transaction still has multiple owners".to_string(),
            )));
        }
        Ok(())
    }
}

struct Cursor {
    // Released once the cursor is exhausted and closed.
    tx: Option<SharedTx>,
    name: String,
    fetch_size: usize,
    buffered: VecDeque<Row>,
}

impl Cursor {
    async fn fetch_next_batch(&mut self) -> Result<(), ApplicationError> {
        let Some(tx) = self.tx.as_ref() else {
            return Ok(());
        };
        let mut tx_guard = tx.lock().await;

        let batch = sqlx::query(&format!(
            "FETCH FORWARD {} FROM {}",
            self.fetch_size, self.name
        ))
        .persistent(false)
        .fetch_all(&mut **tx_guard)
        .await
        .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;

        for row in &batch {
            self.buffered.push_back(to_row(row)?);
        }

        if batch.len() < self.fetch_size {
            sqlx::query(&format!("CLOSE {}", self.name))
                .persistent(false)
                .execute(&mut **tx_guard)
                .await
                .map_err(|e| ApplicationError::Db(DbError::Database(e)))?;

            drop(tx_guard);
            self.tx = None;
            tracing::trace!(cursor = %self.name, "Cursor exhausted");
        }

        Ok(())
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &QueryParams,
) -> Query<'q, Postgres, PgArguments> {
    for value in params.values() {
        query = match value {
            SqlValue::Text(text) => query.bind(text.clone()),
            SqlValue::TextArray(items) => query.bind(items.clone()),
        };
    }
    query
}
