use anyhow::Result;
use tracing_subscriber::EnvFilter;

use maskrcnn_infer::Config;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::new();
    maskrcnn_infer::run(&config)?;

    Ok(())
}
