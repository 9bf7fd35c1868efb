use std::net::SocketAddr;

use clap::Parser;
use tracing::Level;

#[derive(Debug, Clone, Parser)]
#[command(name = "natter-server", about = "Direct-message chat server", version)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 picks a free port.
    #[arg(long, default_value = "0.0.0.0:0")]
    pub listen_addr: SocketAddr,

    /// Messages queued per connection; beyond this, messages to it are dropped.
    #[arg(long, default_value_t = 256)]
    pub outbox_capacity: usize,

    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,
}
