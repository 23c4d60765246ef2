//! Tunnel engine
//!
//! One session per accepted CONNECT: open the upstream connection (optionally
//! under a deadline), acknowledge the client, then relay bytes until either
//! side is done. Every session owns a child of the process-wide shutdown
//! token, so cancelling one tunnel never touches its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, error};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::forwarder::proxy_data;
use super::request::InboundRequest;
use crate::common::{BoxedIo, ErrorKind, ProxyError, Result};

/// Opens upstream connections
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, hostname: &'a str, port: u16) -> BoxFuture<'a, Result<BoxedIo>>;
}

/// Default connector: plain TCP with Nagle disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, hostname: &'a str, port: u16) -> BoxFuture<'a, Result<BoxedIo>> {
        Box::pin(async move {
            let stream = TcpStream::connect((hostname, port)).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedIo)
        })
    }
}

/// Receives non-ignorable tunnel failures
pub trait Reporter: Send + Sync {
    fn report(&self, hostname: &str, port: u16, err: &ProxyError);
}

/// Default reporter: one error-level log record per failure
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, hostname: &str, port: u16, err: &ProxyError) {
        error!("tunnel {}:{} failed: {}", hostname, port, err);
    }
}

/// Factory for tunnel sessions
#[derive(Clone)]
pub struct Tunnel {
    connector: Arc<dyn Connector>,
    reporter: Arc<dyn Reporter>,
    ignorable: fn(ErrorKind) -> bool,
    shutdown: CancellationToken,
}

impl Tunnel {
    pub fn new(
        connector: Arc<dyn Connector>,
        reporter: Arc<dyn Reporter>,
        ignorable: fn(ErrorKind) -> bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connector,
            reporter,
            ignorable,
            shutdown,
        }
    }

    /// Prepare a session to `hostname:port`
    pub fn to(&self, port: u16, hostname: impl Into<String>) -> Session {
        Session {
            tunnel: self.clone(),
            hostname: hostname.into(),
            port,
        }
    }
}

/// A single tunnel to a fixed target
pub struct Session {
    tunnel: Tunnel,
    hostname: String,
    port: u16,
}

impl Session {
    /// Serve `request` until the tunnel closes
    ///
    /// Never fails: ignorable errors end the session quietly, anything else
    /// goes to the reporter exactly once.
    pub async fn serve<R: InboundRequest>(self, request: R, timeout: Option<Duration>) {
        let token = self.tunnel.shutdown.child_token();
        // Cancelled on every exit path
        let _guard = token.clone().drop_guard();

        if let Err(e) = self.drive(request, timeout, &token).await {
            if (self.tunnel.ignorable)(e.kind()) {
                debug!("tunnel {}:{} ended: {}", self.hostname, self.port, e);
            } else {
                self.tunnel.reporter.report(&self.hostname, self.port, &e);
            }
        }
    }

    async fn drive<R: InboundRequest>(
        &self,
        request: R,
        timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<()> {
        debug!("connecting to {}:{}", self.hostname, self.port);

        let connect = self.tunnel.connector.connect(&self.hostname, self.port);
        let upstream = match timeout {
            Some(limit) => cancellable(token, deadline(connect, limit, &self.hostname, self.port)).await?,
            None => cancellable(token, connect).await?,
        };

        // The acknowledgement is flushed before the raw stream comes back
        let upgraded = match cancellable(token, request.establish()).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                super::forwarder::try_close(upstream).await;
                return Err(e);
            }
        };

        debug!("tunnel established to {}:{}", self.hostname, self.port);
        proxy_data(upgraded.io, upstream, upgraded.buffered, token).await
    }
}

/// Bound a connect attempt; the attempt is dropped once the limit passes
async fn deadline<T, F>(fut: F, limit: Duration, hostname: &str, port: u16) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProxyError::Deadline {
            host: hostname.to_string(),
            port,
            timeout: limit,
        })?
}

/// Run `fut` unless `token` fires first
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProxyError::Cancelled),
        r = fut => r,
    }
}
