//! Request dispatcher
//!
//! Built once per run; decides for every inbound request whether it is
//! answered directly (204, 407, 400) or turned into a tunnel.

use std::time::Duration;

use http::Method;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::auth::AuthStore;
use super::request::{InboundRequest, Reply};
use super::tunnel::Tunnel;
use super::Collaborators;
use crate::common::{parse_target, Result};
use crate::config::ProxyOptions;

/// Per-run request handler
#[derive(Clone)]
pub struct RequestHandler {
    auth: Option<AuthStore>,
    timeout: Option<Duration>,
    tunnel: Tunnel,
}

impl RequestHandler {
    /// Build the handler, loading the credential store if one is configured
    ///
    /// An unreadable, malformed, or empty credential store is an error;
    /// only an absent `auth` option yields an open proxy.
    pub async fn build(
        opts: &ProxyOptions,
        collaborators: &Collaborators,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let auth = match opts.auth_source() {
            Some(source) => {
                let source = source.into_absolute()?;
                info!("Loading proxy credentials from {}", source);
                Some(AuthStore::load(&source, collaborators.reader.as_ref()).await?)
            }
            None => {
                warn!("No credential store configured, proxy is open");
                None
            }
        };

        let tunnel = Tunnel::new(
            collaborators.connector.clone(),
            collaborators.reporter.clone(),
            collaborators.ignorable,
            shutdown,
        );

        Ok(Self {
            auth,
            timeout: opts.connect_timeout(),
            tunnel,
        })
    }

    /// Dispatch one request
    ///
    /// Only transport failures while writing a direct reply are returned;
    /// tunnel failures are handled inside the tunnel engine.
    pub async fn handle<R: InboundRequest>(&self, request: R) -> Result<()> {
        if request.method() != Method::CONNECT {
            debug!("{} {} rejected with 204", request.method(), request.target());
            return request.respond(Reply::NoContent).await;
        }

        if let Some(ref store) = self.auth {
            if !store.authorized(request.headers()) {
                debug!("CONNECT {} rejected with 407", request.target());
                return request.respond(Reply::ProxyAuthRequired).await;
            }
        }

        let (hostname, port) = match parse_target(request.target()) {
            Ok(target) => target,
            Err(e) => {
                debug!("CONNECT rejected with 400: {}", e);
                return request.respond(Reply::BadRequest).await;
            }
        };

        self.tunnel.to(port, hostname).serve(request, self.timeout).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TokioFileReader;
    use crate::proxy::auth::{basic_token, AUTH_HEADER};
    use crate::proxy::request::ESTABLISHED;
    use crate::proxy::tunnel::tests::{CountingReporter, MemoryConnector, MemoryRequest};
    use crate::common::is_ignorable;
    use http::HeaderValue;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    fn collaborators(connector: &Arc<MemoryConnector>) -> Collaborators {
        Collaborators {
            connector: connector.clone(),
            reader: Arc::new(TokioFileReader),
            reporter: Arc::new(CountingReporter::default()),
            ignorable: is_ignorable,
        }
    }

    async fn handler(auth: Option<&str>, connector: &Arc<MemoryConnector>) -> RequestHandler {
        let opts = ProxyOptions {
            auth: auth.map(str::to_string),
            ..Default::default()
        };
        RequestHandler::build(&opts, &collaborators(connector), CancellationToken::new())
            .await
            .unwrap()
    }

    const USERS: &str = r#"{ "alice": "wonderland" }"#;

    #[tokio::test]
    async fn test_non_connect_gets_204() {
        let connector = Arc::new(MemoryConnector::default());
        let handler = handler(Some(USERS), &connector).await;

        for method in [Method::GET, Method::POST, Method::OPTIONS] {
            let (mut req, _client) = MemoryRequest::connect("http://example.com/", b"");
            req.method = method;
            let replies = req.replies.clone();

            handler.handle(req).await.unwrap();

            assert_eq!(*replies.lock().unwrap(), vec![Reply::NoContent]);
        }
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_connect_gets_407() {
        let connector = Arc::new(MemoryConnector::default());
        let handler = handler(Some(USERS), &connector).await;

        for header in [None, Some(basic_token("alice", "wrong"))] {
            let (mut req, _client) = MemoryRequest::connect("example.com:443", b"");
            if let Some(value) = header {
                req.headers.insert(AUTH_HEADER, HeaderValue::from_str(&value).unwrap());
            }
            let replies = req.replies.clone();

            handler.handle(req).await.unwrap();

            assert_eq!(*replies.lock().unwrap(), vec![Reply::ProxyAuthRequired]);
        }
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorized_connect_opens_one_tunnel() {
        let connector = Arc::new(MemoryConnector::default());
        let handler = handler(Some(USERS), &connector).await;

        let (mut req, mut client) = MemoryRequest::connect("example.com:8443", b"");
        req.headers.insert(
            AUTH_HEADER,
            HeaderValue::from_str(&basic_token("alice", "wonderland")).unwrap(),
        );
        let replies = req.replies.clone();

        let task = tokio::spawn(async move { handler.handle(req).await });

        let mut ack = vec![0u8; ESTABLISHED.len()];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, ESTABLISHED);

        drop(client);
        connector.upstreams.lock().unwrap().clear();
        task.await.unwrap().unwrap();

        assert!(replies.lock().unwrap().is_empty());
        assert_eq!(
            *connector.attempts.lock().unwrap(),
            vec![("example.com".to_string(), 8443)]
        );
    }

    #[tokio::test]
    async fn test_open_proxy_skips_auth() {
        let connector = Arc::new(MemoryConnector::default());
        let handler = handler(None, &connector).await;

        let (req, client) = MemoryRequest::connect("example.com", b"");
        drop(client);
        handler.handle(req).await.unwrap();

        assert_eq!(
            *connector.attempts.lock().unwrap(),
            vec![("example.com".to_string(), 443)]
        );
    }

    #[tokio::test]
    async fn test_bad_target_gets_400() {
        let connector = Arc::new(MemoryConnector::default());
        let handler = handler(None, &connector).await;

        let (req, _client) = MemoryRequest::connect("/no/host", b"");
        let replies = req.replies.clone();
        handler.handle(req).await.unwrap();

        assert_eq!(*replies.lock().unwrap(), vec![Reply::BadRequest]);
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_store_fails_build() {
        let connector = Arc::new(MemoryConnector::default());
        let collab = collaborators(&connector);

        for auth in ["{}", "{ not json", "/definitely/not/here.json"] {
            let opts = ProxyOptions {
                auth: Some(auth.to_string()),
                ..Default::default()
            };
            let result = RequestHandler::build(&opts, &collab, CancellationToken::new()).await;
            assert!(result.is_err(), "{:?} should fail", auth);
        }
    }
}
