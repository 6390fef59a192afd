pub mod mapping;
pub mod uow;

mod connection;

pub use connection::{DbPool, establish_connection_pool, establish_test_connection_pool};
pub use uow::{PostgresUnitOfWork, PostgresUnitOfWorkProvider};
