use async_trait::async_trait;
use futures::{FutureExt, TryStreamExt, stream::BoxStream};
use std::sync::Arc;

use rollcall_types::{common::UserRow, errors::ApplicationError};

use crate::{
    cqrs::{
        Query, QueryHandler,
        queries::{GetUsers, UserRows},
    },
    transaction::{Transaction, stream_within, transactionally},
    uow::{IsolationLevel, QueryParams, Row, SqlValue, UnitOfWork, UnitOfWorkProvider},
};

const SELECT_USERS_BY_IDS: &str = "SELECT id, firstname FROM users WHERE id = ANY($1)";

/// Rows of a [`GetUsers`] call streamed while its transaction is open.
pub type UserStream = BoxStream<'static, Result<UserRow, ApplicationError>>;

pub struct GetUsersHandler {
    uow_provider: Arc<dyn UnitOfWorkProvider>,
}

impl GetUsersHandler {
    pub fn new(uow_provider: Arc<dyn UnitOfWorkProvider>) -> Self {
        Self { uow_provider }
    }

    /// Like `handle`, but hands rows over as they are fetched.
    ///
    /// The transaction stays open until the stream ends: it commits after
    /// the last row, rolls back on the first error (yielded as the final
    /// item) and rolls back if the stream is dropped early.
    pub async fn stream(&self, query: &GetUsers) -> Result<UserStream, ApplicationError> {
        query.validate()?;

        let tx = Transaction::begin(self.uow_provider.as_ref(), IsolationLevel::Serializable)
            .await?;

        let result = tx
            .unit_of_work()
            .query(SELECT_USERS_BY_IDS, params_for(query))
            .await;

        match result {
            Ok(result) => Ok(stream_within(tx, result.result(), to_user_row)),
            Err(cause) => Err(tx.abort(cause).await),
        }
    }
}

#[async_trait]
impl QueryHandler<GetUsers> for GetUsersHandler {
    /// Fetches the users and commits before returning them.
    ///
    /// The row stream is drained inside the transaction, so the returned
    /// rows never depend on a finished transaction's cursor.
    async fn handle(&self, query: &GetUsers) -> Result<<GetUsers as Query>::Output, ApplicationError> {
        query.validate()?;
        let params = params_for(query);

        let rows = transactionally(
            self.uow_provider.as_ref(),
            IsolationLevel::Serializable,
            move |uow| fetch_users(uow, params).boxed(),
        )
        .await?;

        tracing::debug!(requested = query.user_ids().len(), found = rows.len(), "Fetched users");
        Ok(UserRows::new(rows))
    }
}

async fn fetch_users(
    uow: &dyn UnitOfWork,
    params: QueryParams,
) -> Result<Vec<UserRow>, ApplicationError> {
    uow.query(SELECT_USERS_BY_IDS, params)
        .await?
        .result()
        .and_then(|row| async move { to_user_row(row) })
        .try_collect()
        .await
}

// Ids are bound as one array, never spliced into the SQL.
fn params_for(query: &GetUsers) -> QueryParams {
    QueryParams::new().bind("ids", SqlValue::TextArray(query.user_ids().to_vec()))
}

fn to_user_row(row: Row) -> Result<UserRow, ApplicationError> {
    Ok(row.into_pair()?.into())
}
