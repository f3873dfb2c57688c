//! # KoiHire Server
//!
//! Entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database pool, Redis and the payment provider
//! - HTTP/WebSocket server and background jobs

use anyhow::Result;
use tracing::info;

use koihire::config::Settings;
use koihire::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    koihire::telemetry::init_tracing();

    info!("Starting KoiHire...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        payments = ?settings.payments.provider,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
