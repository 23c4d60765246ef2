//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application,
//! together with the classification of "expected" network termination.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use log::error;
use thiserror::Error;

/// Caldera error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The credential store could not be read, parsed, or was empty
    #[error("fail to read auth file: {0}")]
    AuthStore(String),

    /// Malformed inbound HTTP request
    #[error("HTTP error: {0}")]
    Http(String),

    /// Listener port missing or outside `[1, 65535]`
    #[error("no {0} port")]
    NoPort(&'static str),

    /// HTTPS listener configured without certificate or key
    #[error("no key or cert file")]
    NoKeyOrCert,

    /// Upstream connect did not finish before the deadline
    #[error("connect to {host}:{port} timed out after {timeout:?}")]
    Deadline {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// Operation aborted by a cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Neither listener could be started
    #[error("program exited: {0}")]
    ProgramExited(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Closed classification of failures produced by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The resource is already gone (closed socket, EOF mid-request)
    BadResource,
    /// Write to a peer that has closed its side
    BrokenPipe,
    /// Peer reset or aborted the connection
    ConnectionReset,
    /// Interrupted system call
    Interrupted,
    /// Connect deadline exceeded
    Deadline,
    /// Cancelled through a cancellation token
    Cancelled,
    /// Anything else
    Other,
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::BrokenPipe => Self::BrokenPipe,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Self::ConnectionReset,
            io::ErrorKind::Interrupted => Self::Interrupted,
            io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof => Self::BadResource,
            io::ErrorKind::TimedOut => Self::Deadline,
            _ => Self::Other,
        }
    }
}

impl ProxyError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) => e.kind().into(),
            Self::Deadline { .. } => ErrorKind::Deadline,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

/// Whether an error of this kind is an expected consequence of connection churn
pub fn is_ignorable(kind: ErrorKind) -> bool {
    !matches!(kind, ErrorKind::Other)
}

/// Run a collaborator call, turning a panic into an ordinary error value
pub fn try_catch<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ProxyError::Other(format!("unknown: {}", panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Log an error with its cause and hand it back for re-raising
///
/// Use as `.map_err(tap_catch)`.
pub fn tap_catch(err: ProxyError) -> ProxyError {
    match std::error::Error::source(&err) {
        Some(cause) => error!("{}: {}", err, cause),
        None => error!("{}", err),
    }
    err
}
