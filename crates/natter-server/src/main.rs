mod config;
mod dispatcher;
mod registry;
mod server;
mod session;

use clap::Parser;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use config::ServerConfig;
use server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .init();

    let server = Server::bind(&config)?;
    let addr = server.local_addr()?;

    info!("natter-server listening on {}", addr);
    println!("Listening on port {}", addr.port());

    server.run().await;

    Ok(())
}
