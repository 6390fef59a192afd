pub mod config;
pub mod cqrs;
pub mod queries_handlers;
pub mod transaction;
pub mod uow;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
