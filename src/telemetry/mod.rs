//! Logging setup for ragscope
//!
//! Structured logs go to stderr so answers on stdout stay clean. Filter
//! precedence: `RAGSCOPE_LOG`, then `RUST_LOG`, then the configured level.

use tracing_subscriber::EnvFilter;

/// Environment variable with the highest filter precedence
pub const LOG_ENV: &str = "RAGSCOPE_LOG";

/// Resolve the filter directive for `level`
pub fn filter_directive(level: &str) -> String {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| level.to_string())
}

/// Install the global subscriber
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(filter_directive(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("debug");
        init_logging("info");
    }
}
