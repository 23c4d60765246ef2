//! Shared types module
//!
//! This module contains shared data types and structures used throughout the application.

use std::net::SocketAddr;
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncWrite};

/// A raw duplex byte stream (plain TCP, TLS, or in-memory)
pub trait AsyncIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type-erased duplex stream
pub type BoxedIo = Box<dyn AsyncIo>;

/// Connection information
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Peer address
    pub source: SocketAddr,
    /// Listener that accepted the connection (`http` or `https`)
    pub scheme: &'static str,
    /// Accept timestamp
    pub timestamp: SystemTime,
}

impl ConnectionInfo {
    pub fn new(source: SocketAddr, scheme: &'static str) -> Self {
        Self {
            source,
            scheme,
            timestamp: SystemTime::now(),
        }
    }

    /// Milliseconds since the connection was accepted
    pub fn elapsed_ms(&self) -> u128 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }
}
