use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "networth=info";

/// Builds the filter from `RUST_LOG`, falling back to `networth=<level>`.
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    let default_filter = level.map_or_else(|| DEFAULT_FILTER.to_string(), |l| format!("networth={l}"));
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs the global subscriber. Logs go to stderr so that `--json`
/// output on stdout stays machine readable. Calling it twice is harmless.
pub fn init_logging(level: Option<&str>) {
    let result = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init();

    if result.is_ok() {
        tracing::debug!("logging initialized");
    }
}
