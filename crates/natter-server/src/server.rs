use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use quinn::{Endpoint, Incoming, ServerConfig as QuinnServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::session::{Exit, Session};

pub const ALPN: &[u8] = b"natter";

fn generate_self_signed_cert() -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .context("failed to generate certificate")?;

    let cert_der = cert.cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()));

    Ok((vec![cert_der], key_der))
}

fn configure_server() -> anyhow::Result<QuinnServerConfig> {
    let (certs, key) = generate_self_signed_cert()?;

    let mut server_crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("failed to create TLS config")?;

    server_crypto.alpn_protocols = vec![ALPN.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
        .context("failed to create QUIC config")?;
    Ok(QuinnServerConfig::with_crypto(Arc::new(crypto)))
}

/// Listens for connections and runs one session per connection, all
/// sharing one registry.
pub struct Server {
    endpoint: Endpoint,
    registry: Registry,
    outbox_capacity: usize,
}

impl Server {
    /// Bind the listener. Failing here is fatal to the process.
    pub fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let endpoint = Endpoint::server(configure_server()?, config.listen_addr)
            .with_context(|| format!("failed to bind {}", config.listen_addr))?;

        Ok(Self {
            endpoint,
            registry: Registry::new(),
            outbox_capacity: config.outbox_capacity,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accept connections until the endpoint is closed.
    pub async fn run(self) {
        while let Some(incoming) = self.endpoint.accept().await {
            let registry = self.registry.clone();
            let outbox_capacity = self.outbox_capacity;
            tokio::spawn(async move {
                if let Err(e) = serve(incoming, registry, outbox_capacity).await {
                    error!("Connection failed: {:#}", e);
                }
            });
        }
    }
}

async fn serve(incoming: Incoming, registry: Registry, outbox_capacity: usize) -> anyhow::Result<()> {
    let connection = incoming.await.context("handshake failed")?;
    let remote = connection.remote_address();
    info!("New connection from {}", remote);

    // One bidirectional stream per client carries the whole conversation.
    let (send, recv) = connection.accept_bi().await.context("failed to accept stream")?;

    let session = Session::new(registry, recv, send, outbox_capacity);
    let id = session.id();
    match session.run().await {
        Exit::Disconnected => info!("{} ({}) disconnected", id, remote),
        Exit::EndOfStream => debug!("{} ({}) closed the stream", id, remote),
        Exit::Failed(e) => info!("{} ({}) dropped: {}", id, remote, e),
    }
    Ok(())
}
