//! Proxy lifecycle
//!
//! Builds the request handler, starts both listeners, multiplexes their
//! accepted connections into one accept loop, and tears everything down
//! when the shutdown token fires or the loop fails.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::handler::RequestHandler;
use super::listener::{serve_http, serve_https, Accepted};
use super::request::RawRequest;
use super::tunnel::{Connector, LogReporter, Reporter, TcpConnector};
use crate::common::{is_ignorable, ErrorKind, FileReader, ProxyError, Result, TokioFileReader};
use crate::config::{ProxyOptions, SHUTDOWN_GRACE};

/// External collaborators of one proxy run
#[derive(Clone)]
pub struct Collaborators {
    /// Opens upstream connections
    pub connector: Arc<dyn Connector>,
    /// Reads credential and TLS material
    pub reader: Arc<dyn FileReader>,
    /// Receives non-ignorable tunnel failures
    pub reporter: Arc<dyn Reporter>,
    /// Separates connection churn from real faults
    pub ignorable: fn(ErrorKind) -> bool,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            connector: Arc::new(TcpConnector),
            reader: Arc::new(TokioFileReader),
            reporter: Arc::new(LogReporter),
            ignorable: is_ignorable,
        }
    }
}

/// Run the proxy with the default collaborators
///
/// Resolves once the proxy has fully stopped. Fails when it could not
/// start at all, or when accepting connections fails for a reason other
/// than connection churn.
pub async fn run(opts: &ProxyOptions, shutdown: CancellationToken) -> Result<()> {
    run_with(opts, Collaborators::default(), shutdown).await
}

/// Run the proxy with explicit collaborators
pub async fn run_with(opts: &ProxyOptions, collaborators: Collaborators, shutdown: CancellationToken) -> Result<()> {
    // Cancelled on every exit path, taking all tunnels of this run with it
    let run_token = shutdown.child_token();
    let _guard = run_token.clone().drop_guard();

    let handler = Arc::new(RequestHandler::build(opts, &collaborators, run_token.clone()).await?);

    let (http, https) = tokio::join!(serve_http(opts), serve_https(opts, collaborators.reader.as_ref()));

    let mut listeners = Vec::with_capacity(2);
    let mut causes = Vec::new();
    for started in [http, https] {
        match started {
            Ok(listener) => listeners.push(listener),
            Err(e) => {
                warn!("{}", e);
                causes.push(e.to_string());
            }
        }
    }
    if listeners.is_empty() {
        return Err(ProxyError::ProgramExited(format!("\n{}", causes.join("\n"))));
    }

    let mut incoming = stream::select_all(listeners);
    let mut tasks = JoinSet::new();

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break Ok(());
            }
            next = incoming.next() => next,
        };

        match next {
            Some(Ok(accepted)) => {
                let handler = Arc::clone(&handler);
                let token = run_token.clone();
                let ignorable = collaborators.ignorable;
                tasks.spawn(async move {
                    connection_task(accepted, handler, token, ignorable).await;
                });
            }
            Some(Err(e)) if (collaborators.ignorable)(e.kind()) => {
                debug!("Accept failed: {}", e);
            }
            Some(Err(e)) => {
                if is_descriptor_exhaustion(&e) {
                    error!("Accept failed, out of file descriptors (raise the open file limit): {}", e);
                } else {
                    error!("Accept failed, stopping: {}", e);
                }
                break Err(e);
            }
            None => break Ok(()),
        }

        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
    };

    run_token.cancel();
    for listener in incoming.into_iter() {
        listener.close();
    }

    let drain = async { while tasks.join_next().await.is_some() {} };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("{} connection(s) still open after {:?}, aborting", tasks.len(), SHUTDOWN_GRACE);
        tasks.abort_all();
    }

    info!("Proxy stopped");
    outcome
}

/// EMFILE or ENFILE
fn is_descriptor_exhaustion(err: &ProxyError) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    match err {
        ProxyError::Io(e) => matches!(e.raw_os_error(), Some(ENFILE | EMFILE)),
        _ => false,
    }
}

/// Serve one accepted connection until it is done or the run ends
async fn connection_task(
    accepted: Accepted,
    handler: Arc<RequestHandler>,
    token: CancellationToken,
    ignorable: fn(ErrorKind) -> bool,
) {
    let info = accepted.info.clone();
    debug!("Accepted {} connection from {}", info.scheme, info.source);

    let result = tokio::select! {
        _ = token.cancelled() => Err(ProxyError::Cancelled),
        r = serve_connection(accepted, &handler) => r,
    };

    match result {
        Ok(()) => debug!("Connection from {} closed after {} ms", info.source, info.elapsed_ms()),
        Err(e) if ignorable(e.kind()) => debug!("Connection from {} ended: {}", info.source, e),
        Err(e) => warn!("Connection from {} failed: {}", info.source, e),
    }
}

async fn serve_connection(accepted: Accepted, handler: &RequestHandler) -> Result<()> {
    let io = accepted.into_io().await?;
    let request = RawRequest::read_from(io).await?;
    handler.handle(request).await
}
