/// relsync server entry point
///
/// Loads configuration from the environment and serves:
/// - Release management at /releases/*
/// - Instance, maintenance, module and variable endpoints
/// - Manual cleanup at /cleanup
/// - Health check at /healthz

use relsync::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
