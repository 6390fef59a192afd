use dotenvy::dotenv;
use std::env;

pub struct Config {
    /// Rows pulled per round-trip when streaming a result set.
    pub fetch_size: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let fetch_size = match env::var("ROLLCALL_FETCH_SIZE") {
            Ok(val) => val.parse::<usize>().unwrap_or(100).clamp(1, 10_000),
            Err(_) => 100,
        };

        Self { fetch_size }
    }
}

