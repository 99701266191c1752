use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Log lines go to stderr so stdout only
/// carries job results.
///
/// Defaults to `info` unless overridden by `STEREOPIPE_LOG`.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var("STEREOPIPE_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
