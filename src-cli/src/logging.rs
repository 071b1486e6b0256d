use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(level: &str) -> Result<(), InitError> {
    LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
