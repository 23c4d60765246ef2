//! TLS handling module
//!
//! Builds the HTTPS listener's acceptor from certificate and key bytes and
//! runs per-connection handshakes.

mod acceptor;
mod cert;

pub use acceptor::{accept_tls, create_tls_acceptor};
pub use cert::{describe_cert, CertificateInfo};

#[cfg(test)]
pub(crate) use acceptor::tests;
