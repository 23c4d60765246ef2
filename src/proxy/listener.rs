//! Listener orchestration
//!
//! Binds the plaintext and TLS listeners. Each listener is a lazy, unbounded
//! [`Stream`] of accepted connections; the TLS handshake is deferred to
//! [`Accepted::into_io`] so a slow client never stalls the accept loop.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use log::{debug, info, warn};
use openssl::ssl::SslAcceptor;
use tokio::net::{TcpListener, TcpStream};

use crate::common::{try_catch, BoxedIo, ConnectionInfo, FileReader, ProxyError, Result, PORT};
use crate::config::ProxyOptions;
use crate::tls::{accept_tls, create_tls_acceptor, describe_cert};

/// How accepted sockets are turned into request streams
#[derive(Clone)]
pub enum Transport {
    Plain,
    Tls(Arc<SslAcceptor>),
}

/// A bound listener
pub struct Listener {
    scheme: &'static str,
    inner: TcpListener,
    transport: Transport,
}

/// A connection accepted by a [`Listener`], not yet read from
pub struct Accepted {
    pub stream: TcpStream,
    pub info: ConnectionInfo,
    transport: Transport,
}

impl Accepted {
    /// Finish transport setup; runs the TLS handshake for HTTPS connections
    pub async fn into_io(self) -> Result<BoxedIo> {
        let _ = self.stream.set_nodelay(true);
        match self.transport {
            Transport::Plain => Ok(Box::new(self.stream)),
            Transport::Tls(acceptor) => {
                let stream = accept_tls(&acceptor, self.stream).await?;
                Ok(Box::new(stream))
            }
        }
    }
}

impl Listener {
    async fn bind(opts: &ProxyOptions, scheme: &'static str, port: u16, transport: Transport) -> Result<Self> {
        let inner = TcpListener::bind((opts.bind_host(), port)).await?;
        Ok(Self {
            scheme,
            inner,
            transport,
        })
    }

    /// `http` or `https`
    pub fn scheme(&self) -> &'static str {
        self.scheme
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Stop accepting; the socket is released when the listener is dropped
    pub fn close(self) {
        match self.inner.local_addr() {
            Ok(addr) => debug!("closing {} listener on {}", self.scheme, addr),
            Err(_) => debug!("closing {} listener", self.scheme),
        }
    }
}

impl Stream for Listener {
    type Item = Result<Accepted>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_accept(cx) {
            Poll::Ready(Ok((stream, peer))) => Poll::Ready(Some(Ok(Accepted {
                stream,
                info: ConnectionInfo::new(peer, this.scheme),
                transport: this.transport.clone(),
            }))),
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(ProxyError::Io(e)))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Validate a listener port; absent, zero, or out of range is an error
fn listener_port(port: Option<i64>, scheme: &'static str) -> Result<u16> {
    port.and_then(|p| PORT.check(p))
        .filter(|p| *p >= 1)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or(ProxyError::NoPort(scheme))
}

/// Start the plaintext listener
pub async fn serve_http(opts: &ProxyOptions) -> Result<Listener> {
    let port = listener_port(opts.port.http, "http")?;
    info!("http [{}]", port);
    Listener::bind(opts, "http", port, Transport::Plain).await
}

/// Start the TLS listener
///
/// Certificate and key are read through `reader` before binding.
pub async fn serve_https(opts: &ProxyOptions, reader: &dyn FileReader) -> Result<Listener> {
    let port = listener_port(opts.port.https, "https")?;
    let (crt, key) = match (&opts.crt, &opts.key) {
        (Some(crt), Some(key)) => (crt, key),
        _ => return Err(ProxyError::NoKeyOrCert),
    };

    let cert_pem = reader.read(crt).await?;
    let key_pem = reader.read(key).await?;

    match describe_cert(&cert_pem) {
        Ok(cert) => info!("Certificate {} (SHA-256 {})", cert.subject, cert.fingerprint),
        Err(e) => warn!("Could not describe certificate {}: {}", crt.display(), e),
    }
    let acceptor = try_catch(|| create_tls_acceptor(&cert_pem, &key_pem))?;

    info!("https [{}]", port);
    Listener::bind(opts, "https", port, Transport::Tls(Arc::new(acceptor))).await
}
