use anyhow::Context;
use tracing_subscriber::EnvFilter;

use hm11_bridge::transport::SerialTransport;
use hm11_bridge::{config, supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = config::device_path();
    let transport = SerialTransport::open(&path, config::BAUD_RATE)
        .with_context(|| format!("opening UART device {path}"))?;

    if let Err(e) = supervisor::run(transport).await {
        tracing::error!(error = ?e, "fatal error");
        std::process::exit(1);
    }

    Ok(())
}
