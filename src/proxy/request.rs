//! Inbound requests
//!
//! The dispatcher and tunnel engine only see [`InboundRequest`]; the raw
//! HTTP/1.x transport used by both listeners is [`RawRequest`].

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::common::{BoxedIo, ProxyError, Result};

/// Largest accepted request head
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Most headers accepted in one request
pub const MAX_HEADERS: usize = 64;

/// Acknowledgement written once the upstream connection is open
pub const ESTABLISHED: &[u8] = b"HTTP/1.0 200\r\n\r\n";

/// Responses the proxy gives instead of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Any non-CONNECT method
    NoContent,
    /// CONNECT without accepted credentials
    ProxyAuthRequired,
    /// CONNECT target without a usable host
    BadRequest,
}

impl Reply {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT,
            Self::ProxyAuthRequired => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
        }
    }

    /// Extra headers of this reply
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::ProxyAuthRequired => &[("Proxy-Authenticate", "proxy auth")],
            _ => &[],
        }
    }

    /// Serialised HTTP/1.1 response head, no body
    pub fn to_bytes(&self) -> Vec<u8> {
        let status = self.status();
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
        for (name, value) in self.headers() {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if *self != Self::NoContent {
            head.push_str("Content-Length: 0\r\n");
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }
}

/// Raw client stream after the acknowledgement
pub struct Upgraded {
    /// Client duplex stream
    pub io: BoxedIo,
    /// Client bytes read past the request head; relayed upstream first
    pub buffered: Bytes,
}

/// Capability interface over one inbound request
pub trait InboundRequest: Send + 'static {
    fn method(&self) -> &Method;

    /// Request target (authority form for CONNECT)
    fn target(&self) -> &str;

    fn headers(&self) -> &HeaderMap;

    /// Answer without tunnelling and finish the request
    fn respond(self, reply: Reply) -> BoxFuture<'static, Result<()>>;

    /// Send the established acknowledgement, then hand over the raw stream
    ///
    /// The acknowledgement is flushed before the stream is returned.
    fn establish(self) -> BoxFuture<'static, Result<Upgraded>>;
}

/// One request read off a raw (plain or TLS) connection
pub struct RawRequest {
    io: BoxedIo,
    method: Method,
    target: String,
    headers: HeaderMap,
    buffered: Bytes,
}

impl std::fmt::Debug for RawRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawRequest")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .field("buffered", &self.buffered.len())
            .field("io", &"<stream>")
            .finish()
    }
}

impl RawRequest {
    /// Read and parse a request head from `io`
    ///
    /// End of stream before a complete head is a `BadResource`-class error.
    pub async fn read_from(mut io: BoxedIo) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(4096);

        loop {
            if io.read_buf(&mut buf).await? == 0 {
                return Err(ProxyError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before request head",
                )));
            }

            let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut req = httparse::Request::new(&mut raw_headers);

            match req.parse(&buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let method = Method::from_bytes(req.method.unwrap_or("").as_bytes())
                        .map_err(|e| ProxyError::Http(e.to_string()))?;
                    let target = req.path.unwrap_or("").to_string();

                    let mut headers = HeaderMap::with_capacity(req.headers.len());
                    for h in req.headers.iter() {
                        let name = HeaderName::from_bytes(h.name.as_bytes())
                            .map_err(|e| ProxyError::Http(e.to_string()))?;
                        let value = HeaderValue::from_bytes(h.value)
                            .map_err(|e| ProxyError::Http(e.to_string()))?;
                        headers.append(name, value);
                    }

                    let buffered = buf.split_off(head_len).freeze();
                    debug!("{} {} ({} byte(s) buffered)", method, target, buffered.len());

                    return Ok(Self {
                        io,
                        method,
                        target,
                        headers,
                        buffered,
                    });
                }
                Ok(httparse::Status::Partial) => {
                    if buf.len() >= MAX_HEAD_SIZE {
                        return Err(ProxyError::Http("request head too large".to_string()));
                    }
                }
                Err(e) => return Err(ProxyError::Http(e.to_string())),
            }
        }
    }
}

impl InboundRequest for RawRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn respond(self, reply: Reply) -> BoxFuture<'static, Result<()>> {
        let mut io = self.io;
        Box::pin(async move {
            io.write_all(&reply.to_bytes()).await?;
            io.flush().await?;
            let _ = io.shutdown().await;
            Ok(())
        })
    }

    fn establish(self) -> BoxFuture<'static, Result<Upgraded>> {
        let Self { mut io, buffered, .. } = self;
        Box::pin(async move {
            io.write_all(ESTABLISHED).await?;
            io.flush().await?;
            Ok(Upgraded { io, buffered })
        })
    }
}
