use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tracing::info;

use natter_protocol::{MessageReader, MessageWriter};

const ALPN: &[u8] = b"natter";
const KEEP_ALIVE: Duration = Duration::from_secs(10);

pub struct Client {
    endpoint: Endpoint,
    connection: Option<Connection>,
}

impl Client {
    pub fn new() -> anyhow::Result<Self> {
        let mut endpoint = Endpoint::client("0.0.0.0:0".parse()?)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut crypto = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptSelfSigned(provider)))
            .with_no_client_auth();

        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let mut client_config = ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)?,
        ));

        // Keeps an idle chat from hitting the QUIC idle timeout.
        let mut transport = quinn::TransportConfig::default();
        transport.keep_alive_interval(Some(KEEP_ALIVE));
        client_config.transport_config(Arc::new(transport));

        endpoint.set_default_client_config(client_config);

        Ok(Self {
            endpoint,
            connection: None,
        })
    }

    pub async fn connect(
        &mut self,
        addr: SocketAddr,
    ) -> anyhow::Result<(MessageReader<RecvStream>, MessageWriter<SendStream>)> {
        let connection = self.endpoint.connect(addr, "localhost")?.await?;
        info!("Connected to server at {}", addr);

        let (send, recv) = connection.open_bi().await?;
        self.connection = Some(connection);

        Ok((MessageReader::new(recv), MessageWriter::new(send)))
    }

    pub async fn close(self) {
        if let Some(connection) = self.connection {
            connection.close(0u32.into(), b"bye");
        }
        self.endpoint.wait_idle().await;
    }
}

/// The server presents a fresh self-signed certificate on every start, so
/// there is no chain to validate. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptSelfSigned(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptSelfSigned {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
