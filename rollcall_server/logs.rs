use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Sets up the logging configuration for the application.
///
/// This function initializes `tracing_subscriber` with two layers:
/// 1. A layer that logs to stderr, keeping stdout for query results.
/// 2. A layer that logs to a daily rotating file in the `logs/` directory.
///
/// Log levels are controlled by the `RUST_LOG` environment variable.
/// If `RUST_LOG` is not set, it defaults to `info` for all crates,
/// and `debug` for the `rollcall` crates.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the lifetime of the process.
pub fn setup_logging() -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("logs", "rollcall.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_target(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true);

    let default_filter = "info,rollcall_app=debug,rollcall_db=debug,rollcall=debug";

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
