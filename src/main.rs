use fedhub::common::config::HubConfig;
use fedhub::server::HubServer;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::builder()
        .parse(std::env::var("RUST_LOG").unwrap_or_else(|_| "info,fedhub=debug,tower_http=debug".to_string()))
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(fmt::time::uptime())
        .init();

    tracing::info!("loading configuration");
    let config = HubConfig::load().await?;

    tracing::info!(host = %config.server.host, port = config.server.port, "starting federation hub");

    let server = HubServer::new(config).await?;
    server.run().await?;

    Ok(())
}
