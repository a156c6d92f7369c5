use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a process-wide subscriber filtered by `RUST_LOG`. Embedding
/// services usually bring their own; this is for standalone consumers and
/// local debugging.
pub fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("logging initialized");
    Ok(())
}
