//! Server trust capability and the transport seam.
//!
//! `ServerTrust` has exactly two variants so production wiring cannot drift
//! into accepting invalid certificates by accident; the insecure variant has
//! to be selected explicitly at every `start` call.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::notify::error::NotifyError;

/// Certificate trust policy for the stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTrust {
    /// Validate the server certificate against system roots.
    SystemRoots,
    /// Accept any certificate, including invalid hostnames.
    AcceptInvalidCerts,
}

/// Byte stream usable as the notification transport.
pub trait StreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamIo for T {}

/// Opens encrypted byte streams to the notification endpoint.
///
/// Injected into the manager so tests can substitute a plain transport.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Connects to `host:port` under the given trust policy.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        trust: ServerTrust,
    ) -> Result<Box<dyn StreamIo>, NotifyError>;
}

/// Production transport: TCP connect followed by a TLS handshake.
#[derive(Debug, Default)]
pub struct TlsTransport;

#[async_trait]
impl NotificationTransport for TlsTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        trust: ServerTrust,
    ) -> Result<Box<dyn StreamIo>, NotifyError> {
        let connector = match trust {
            ServerTrust::SystemRoots => native_tls::TlsConnector::new()?,
            ServerTrust::AcceptInvalidCerts => native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?,
        };
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let tcp = TcpStream::connect((host, port)).await?;
        let tls = connector
            .connect(host, tcp)
            .await
            .map_err(NotifyError::Tls)?;
        Ok(Box::new(tls))
    }
}
