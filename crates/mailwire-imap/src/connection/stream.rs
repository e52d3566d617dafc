//! Stream types for IMAP connections.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::{Config, Security};
use crate::{Error, Result};

/// A transport that can be upgraded to TLS in place.
///
/// Implemented by [`ImapStream`]; test doubles implement it to script a
/// STARTTLS exchange without a real handshake.
pub trait StartTls: AsyncRead + AsyncWrite + Unpin + Sized {
    /// Returns true if the stream is already encrypted.
    fn is_tls(&self) -> bool;

    /// Wraps the stream in TLS, consuming the plaintext handle.
    fn start_tls(self, host: &str, timeout: Duration) -> impl Future<Output = Result<Self>> + Send;
}

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for ImapStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("ImapStream::Plain"),
            Self::Tls(_) => f.write_str("ImapStream::Tls"),
        }
    }
}

impl StartTls for ImapStream {
    fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    async fn start_tls(self, host: &str, limit: Duration) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let tls = handshake(tcp, host, limit).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with the Mozilla root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

async fn handshake(tcp: TcpStream, host: &str, limit: Duration) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(host.to_string())?;
    let connector = create_tls_connector();
    let tls = timeout(limit, connector.connect(server_name, tcp))
        .await
        .map_err(|_| Error::Timeout(limit))??;
    Ok(tls)
}

/// Opens the transport described by `config`: TCP, plus a TLS handshake when
/// the security mode is [`Security::Implicit`]. Both steps are bounded by
/// the connect timeout.
pub async fn connect(config: &Config) -> Result<ImapStream> {
    let addr = (config.host.as_str(), config.port);
    let tcp = timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))??;

    if config.security == Security::Implicit {
        let tls = handshake(tcp, &config.host, config.connect_timeout).await?;
        tracing::info!(host = %config.host, port = config.port, "connected with TLS");
        return Ok(ImapStream::Tls(Box::new(tls)));
    }

    tracing::info!(host = %config.host, port = config.port, "connected in plaintext");
    Ok(ImapStream::Plain(tcp))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let config = Config::builder("127.0.0.1")
            .port(port)
            .security(Security::None)
            .build();
        let stream = connect(&config).await.unwrap();
        assert!(!stream.is_tls());
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::builder("127.0.0.1")
            .port(port)
            .security(Security::None)
            .build();
        assert!(matches!(connect(&config).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_start_tls_invalid_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let stream = ImapStream::Plain(tcp);
        let result = stream.start_tls("not a hostname", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::InvalidDnsName(_))));
        accept.await.unwrap();
    }
}
