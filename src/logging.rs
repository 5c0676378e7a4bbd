//! Tracing setup shared by all Serval binaries.

use tracing_subscriber::EnvFilter;

/// Installs a compact stderr subscriber. `RUST_LOG` overrides `level`.
///
/// Stdout stays free for protocol traffic. Calling this more than once is a no-op.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
