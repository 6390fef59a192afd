mod get_users;

pub use get_users::{GetUsersHandler, UserStream};
