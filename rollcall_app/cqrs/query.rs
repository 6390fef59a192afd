use async_trait::async_trait;
use rollcall_types::errors::ApplicationError;

/// A marker trait for Query structs.
/// Queries are operations that read the state of the system.
pub trait Query: Send + Sync {
    /// The data type that this query will return.
    type Output: Send;
}

/// A trait for handlers that execute Queries.
/// Handlers own their storage dependency and the transaction lifecycle
/// of every call.
#[async_trait]
pub trait QueryHandler<Q: Query> {
    async fn handle(&self, query: &Q) -> Result<Q::Output, ApplicationError>;
}
