use crate::resolver::SniResolver;
use rustls::ServerConfig;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// rustls server config whose certificate comes from `resolver` on every
/// handshake.
pub fn build_server_config(resolver: Arc<SniResolver>) -> Result<Arc<ServerConfig>, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// TLS data plane listener.
///
/// Every accepted connection gets its own task. Certificates are picked
/// per handshake, so store updates apply to the next connection without
/// touching the listener.
pub struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl TlsListener {
    pub async fn bind(
        addr: &str,
        config: Arc<ServerConfig>,
        handshake_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(config),
            handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "TLS listener started"),
            Err(e) => debug!(error = %e, "TLS listener address unavailable"),
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("TLS listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let acceptor = self.acceptor.clone();
                        let timeout = self.handshake_timeout;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(acceptor, stream, timeout).await {
                                debug!(peer = %peer, error = %e, "Connection closed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept error");
                    }
                },
            }
        }
    }
}

/// Complete the handshake, read the request head and answer with a short
/// plain-text response naming the SNI that was served.
async fn handle_connection(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    timeout: Duration,
) -> io::Result<()> {
    let mut tls = tokio::time::timeout(timeout, acceptor.accept(stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))??;

    let sni = tls.get_ref().1.server_name().unwrap_or("-").to_owned();

    let mut buf = [0u8; 4096];
    let n = tokio::time::timeout(timeout, tls.read(&mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request read timed out"))??;
    if n == 0 {
        return Ok(());
    }

    let body = format!("certsync: {sni}\n");
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    tls.write_all(response.as_bytes()).await?;
    tls.shutdown().await
}
