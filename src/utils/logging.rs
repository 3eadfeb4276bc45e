use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Map a textual level from configuration to a tracing `Level`.
///
/// Unknown values fall back to `INFO`.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Build the log filter. `RUST_LOG` wins when set; otherwise everything at
/// `default_level` and above is logged.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(parse_level(default_level)).into())
        .from_env_lossy()
}

/// Initialize tracing/logging for the binary.
///
/// Library components never call this; they log through the span handed to
/// them by the `Transmitter` that owns them.
pub fn init(default_level: &str) {
    // Use try_init so tests and libraries can call this multiple times without panicking
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_target(false)
        .try_init();
}
