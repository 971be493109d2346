//! Logging setup for the apex-hybrid binaries, benches and tests
//!
//! The library itself only emits `tracing` events: tree construction and
//! graph-tree assembly log node counts at `debug`, tree combination at `trace`.
//! Installing a subscriber is left to the executable.

use tracing::Level;
use tracing_subscriber::EnvFilter;

fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

/// Install the standard subscriber with a default level of INFO
///
/// The level can be overridden with `RUST_LOG`, e.g.
/// `RUST_LOG=apex_hybrid=debug cargo run --bin hybrid_switching` shows the
/// size of every tree built.
///
/// # Example
/// ```no_run
/// use apex_hybrid::init_logger;
///
/// init_logger();
/// tracing::info!("Application started");
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the standard subscriber with a custom default level
///
/// Panics if a global subscriber is already set; use [`try_init_logger`] when
/// that can happen.
pub fn init_logger_with_level(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();
}

/// Install a subscriber that writes through the test harness capture.
///
/// Returns `false` when a subscriber was already installed, so it is safe to
/// call from every test.
pub fn try_init_logger(default_level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_test_writer()
        .try_init()
        .is_ok()
}
