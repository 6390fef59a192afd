#[cfg(any(test, feature = "test-utils"))]
#[cfg(not(tarpaulin_include))]
pub mod tests {
    use async_trait::async_trait;
    use futures::{StreamExt, stream};
    use std::{
        io,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    use rollcall_types::errors::{ApplicationError, DbError};

    use crate::uow::{
        IsolationLevel, QueryParams, QueryResult, Row, UnitOfWork, UnitOfWorkProvider,
    };

    /// Every storage call a mock unit of work has seen, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TxCall {
        Begin(IsolationLevel),
        Query { sql: String, params: QueryParams },
        Commit,
        Rollback,
        /// Dropped without commit or rollback.
        Abandoned,
    }

    /// What the mock returns from `query`.
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        Rows(Vec<Row>),
        QueryError,
        /// Yields the rows, then a connection error.
        FailAfter(Vec<Row>),
    }

    pub fn connection_error() -> ApplicationError {
        ApplicationError::Db(DbError::Database(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ))))
    }

    #[derive(Clone)]
    pub struct MockUnitOfWorkProvider {
        outcome: MockOutcome,
        journal: Arc<Mutex<Vec<TxCall>>>,
        fail_begin: bool,
        fail_commit: bool,
        fail_rollback: bool,
    }

    impl MockUnitOfWorkProvider {
        pub fn new(outcome: MockOutcome) -> Self {
            Self {
                outcome,
                journal: Arc::new(Mutex::new(Vec::new())),
                fail_begin: false,
                fail_commit: false,
                fail_rollback: false,
            }
        }

        pub fn failing_begin(mut self) -> Self {
            self.fail_begin = true;
            self
        }

        pub fn failing_commit(mut self) -> Self {
            self.fail_commit = true;
            self
        }

        pub fn failing_rollback(mut self) -> Self {
            self.fail_rollback = true;
            self
        }

        pub fn calls(&self) -> Vec<TxCall> {
            self.journal.lock().unwrap().clone()
        }

        pub fn commits(&self) -> usize {
            self.count(|c| matches!(c, TxCall::Commit))
        }

        pub fn rollbacks(&self) -> usize {
            self.count(|c| matches!(c, TxCall::Rollback))
        }

        fn count(&self, pred: impl Fn(&TxCall) -> bool) -> usize {
            self.journal.lock().unwrap().iter().filter(|c| pred(*c)).count()
        }
    }

    #[async_trait]
    impl UnitOfWorkProvider for MockUnitOfWorkProvider {
        async fn begin(
            &self,
            isolation: IsolationLevel,
        ) -> Result<Box<dyn UnitOfWork>, ApplicationError> {
            self.journal.lock().unwrap().push(TxCall::Begin(isolation));

            if self.fail_begin {
                return Err(connection_error());
            }

            Ok(Box::new(MockUnitOfWork {
                outcome: self.outcome.clone(),
                journal: self.journal.clone(),
                fail_commit: self.fail_commit,
                fail_rollback: self.fail_rollback,
                finished: AtomicBool::new(false),
            }))
        }
    }

    pub struct MockUnitOfWork {
        outcome: MockOutcome,
        journal: Arc<Mutex<Vec<TxCall>>>,
        fail_commit: bool,
        fail_rollback: bool,
        finished: AtomicBool,
    }

    impl MockUnitOfWork {
        fn finish(&self, call: TxCall) {
            self.finished.store(true, Ordering::SeqCst);
            self.journal.lock().unwrap().push(call);
        }
    }

    impl Drop for MockUnitOfWork {
        fn drop(&mut self) {
            if !self.finished.load(Ordering::SeqCst) {
                self.journal.lock().unwrap().push(TxCall::Abandoned);
            }
        }
    }

    #[async_trait]
    impl UnitOfWork for MockUnitOfWork {
        async fn query(
            &self,
            sql: &str,
            params: QueryParams,
        ) -> Result<QueryResult, ApplicationError> {
            self.journal.lock().unwrap().push(TxCall::Query {
                sql: sql.to_string(),
                params,
            });

            let rows = match &self.outcome {
                MockOutcome::Rows(rows) => stream::iter(rows.clone().into_iter().map(Ok)).boxed(),
                MockOutcome::QueryError => return Err(connection_error()),
                MockOutcome::FailAfter(rows) => stream::iter(rows.clone().into_iter().map(Ok))
                    .chain(stream::once(async { Err(connection_error()) }))
                    .boxed(),
            };

            Ok(QueryResult::new(rows))
        }

        async fn commit(self: Box<Self>) -> Result<(), ApplicationError> {
            self.finish(TxCall::Commit);
            if self.fail_commit {
                return Err(DbError::Transaction("could not serialize access".to_string()).into());
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), ApplicationError> {
            self.finish(TxCall::Rollback);
            if self.fail_rollback {
                return Err(connection_error());
            }
            Ok(())
        }
    }
}
