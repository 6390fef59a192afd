use futures::{
    StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use tracing::{debug, error, warn};

use rollcall_types::errors::{AppError, ApplicationError};

use crate::uow::{IsolationLevel, Row, RowStream, UnitOfWork, UnitOfWorkProvider};

/// Scoped handle on an active unit of work.
///
/// `commit`, `rollback` and `abort` consume the guard, so a transaction
/// reaches exactly one terminal state. A guard dropped while still active
/// drops its unit of work, which rolls the transaction back.
pub struct Transaction {
    uow: Box<dyn UnitOfWork>,
    finish: FinishGuard,
}

struct FinishGuard {
    isolation: IsolationLevel,
    finished: bool,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                isolation = %self.isolation,
                "Transaction dropped while active, rolling back"
            );
        }
    }
}

impl Transaction {
    pub async fn begin(
        provider: &dyn UnitOfWorkProvider,
        isolation: IsolationLevel,
    ) -> Result<Self, ApplicationError> {
        let uow = provider.begin(isolation).await?;
        debug!(%isolation, "Transaction started");

        Ok(Self {
            uow,
            finish: FinishGuard {
                isolation,
                finished: false,
            },
        })
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.finish.isolation
    }

    pub fn unit_of_work(&self) -> &dyn UnitOfWork {
        self.uow.as_ref()
    }

    pub async fn commit(self) -> Result<(), ApplicationError> {
        let Transaction { uow, mut finish } = self;
        finish.finished = true;

        uow.commit().await?;
        debug!(isolation = %finish.isolation, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ApplicationError> {
        let Transaction { uow, mut finish } = self;
        finish.finished = true;

        uow.rollback().await?;
        debug!(isolation = %finish.isolation, "Transaction rolled back");
        Ok(())
    }

    /// Rolls back because of `cause` and returns the error to surface.
    pub async fn abort(self, cause: ApplicationError) -> ApplicationError {
        debug!(error = %cause, "Aborting transaction");

        match self.rollback().await {
            Ok(()) => AppError::TransactionRolledBack {
                source: Box::new(cause),
            }
            .into(),
            Err(rollback) => {
                error!(error = %cause, rollback_error = %rollback, "Rollback failed");
                AppError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                }
                .into()
            }
        }
    }
}

/// Runs `operation` inside a transaction opened at `isolation`.
///
/// Commits when the operation returns `Ok`, rolls back when it returns
/// `Err`. The two are mutually exclusive: a failed operation is never
/// followed by a commit, and a successful one is never rolled back.
pub async fn transactionally<T, F>(
    provider: &dyn UnitOfWorkProvider,
    isolation: IsolationLevel,
    operation: F,
) -> Result<T, ApplicationError>
where
    T: Send,
    F: for<'u> FnOnce(&'u dyn UnitOfWork) -> BoxFuture<'u, Result<T, ApplicationError>> + Send,
{
    let tx = Transaction::begin(provider, isolation).await?;
    let outcome = operation(tx.unit_of_work()).await;

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(cause) => Err(tx.abort(cause).await),
    }
}

struct Streaming<M> {
    tx: Option<Transaction>,
    rows: Option<RowStream>,
    map: M,
}

/// Streams `rows` while keeping `tx` open.
///
/// The transaction commits after the last row; a storage or mapping error
/// rolls it back and becomes the final item. Dropping the stream early
/// drops the transaction, which rolls back.
pub fn stream_within<T, M>(
    tx: Transaction,
    rows: RowStream,
    map: M,
) -> BoxStream<'static, Result<T, ApplicationError>>
where
    T: Send + 'static,
    M: FnMut(Row) -> Result<T, ApplicationError> + Send + 'static,
{
    let state = Streaming {
        tx: Some(tx),
        rows: Some(rows),
        map,
    };

    stream::unfold(state, |mut state| async move {
        let tx = state.tx.take()?;

        let next = match state.rows.as_mut() {
            Some(rows) => rows.next().await,
            None => None,
        };

        match next.map(|row| row.and_then(&mut state.map)) {
            Some(Ok(item)) => {
                state.tx = Some(tx);
                Some((Ok(item), state))
            }
            Some(Err(cause)) => {
                // Release the cursor before finishing the transaction.
                state.rows = None;
                let err = tx.abort(cause).await;
                Some((Err(err), state))
            }
            None => {
                state.rows = None;
                match tx.commit().await {
                    Ok(()) => None,
                    Err(err) => Some((Err(err), state)),
                }
            }
        }
    })
    .fuse()
    .boxed()
}

#[cfg(test)]
mod tests {
    use futures::{FutureExt, TryStreamExt};
    use rollcall_types::errors::DbError;

    use super::*;
    use crate::{
        test_utils::tests::{MockOutcome, MockUnitOfWorkProvider, TxCall},
        uow::QueryParams,
    };

    fn row(id: &str, name: &str) -> Row {
        Row::new(vec![id.to_string(), name.to_string()])
    }

    async fn count_rows(uow: &dyn UnitOfWork) -> Result<usize, ApplicationError> {
        let rows: Vec<Row> = uow
            .query("SELECT 1", QueryParams::new())
            .await?
            .result()
            .try_collect()
            .await?;
        Ok(rows.len())
    }

    #[tokio::test]
    async fn test_commits_once_on_success() {
        let provider =
            MockUnitOfWorkProvider::new(MockOutcome::Rows(vec![row("u1", "Ann")]));

        let count = transactionally(&provider, IsolationLevel::Serializable, |uow| {
            count_rows(uow).boxed()
        })
        .await
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(provider.commits(), 1);
        assert_eq!(provider.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_rolls_back_without_commit_on_failure() {
        let provider = MockUnitOfWorkProvider::new(MockOutcome::QueryError);

        let result = transactionally(&provider, IsolationLevel::Serializable, |uow| {
            count_rows(uow).boxed()
        })
        .await;

        assert!(matches!(
            result,
            Err(ApplicationError::App(AppError::TransactionRolledBack { .. }))
        ));
        assert_eq!(provider.rollbacks(), 1);
        assert_eq!(provider.commits(), 0);
    }

    #[tokio::test]
    async fn test_reports_both_errors_when_rollback_fails() {
        let provider = MockUnitOfWorkProvider::new(MockOutcome::QueryError).failing_rollback();

        let result = transactionally(&provider, IsolationLevel::Serializable, |uow| {
            count_rows(uow).boxed()
        })
        .await;

        assert!(matches!(
            result,
            Err(ApplicationError::App(AppError::RollbackFailed { .. }))
        ));
        assert_eq!(provider.commits(), 0);
    }

    #[tokio::test]
    async fn test_begin_failure_skips_operation() {
        let provider = MockUnitOfWorkProvider::new(MockOutcome::Rows(vec![])).failing_begin();

        let result = transactionally(&provider, IsolationLevel::Serializable, |uow| {
            count_rows(uow).boxed()
        })
        .await;

        assert!(matches!(result, Err(ApplicationError::Db(DbError::Database(_)))));
        assert_eq!(
            provider.calls(),
            vec![TxCall::Begin(IsolationLevel::Serializable)]
        );
    }

    #[tokio::test]
    async fn test_commit_failure_is_not_followed_by_rollback() {
        let provider =
            MockUnitOfWorkProvider::new(MockOutcome::Rows(vec![row("u1", "Ann")])).failing_commit();

        let result = transactionally(&provider, IsolationLevel::Serializable, |uow| {
            count_rows(uow).boxed()
        })
        .await;

        assert!(result.is_err());
        assert_eq!(provider.commits(), 1);
        assert_eq!(provider.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_abandoned() {
        let provider = MockUnitOfWorkProvider::new(MockOutcome::Rows(vec![]));

        let tx = Transaction::begin(&provider, IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        assert_eq!(tx.isolation(), IsolationLevel::ReadCommitted);
        drop(tx);

        assert_eq!(
            provider.calls(),
            vec![TxCall::Begin(IsolationLevel::ReadCommitted), TxCall::Abandoned]
        );
    }
}
