use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, writing to stderr. `RUST_LOG` wins
/// over `default_filter`. A second call is a no-op.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
