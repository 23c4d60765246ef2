//! Proxy module
//!
//! This module implements the CONNECT tunnelling proxy: credential checks,
//! the two listeners, request dispatch, the tunnel engine, and the run
//! lifecycle tying them together.

pub mod auth;
pub mod handler;
pub mod listener;
pub mod request;
pub mod tunnel;
mod forwarder;
mod service;

pub use auth::{basic_token, AuthStore, AUTH_HEADER};
pub use handler::RequestHandler;
pub use listener::{serve_http, serve_https, Accepted, Listener};
pub use request::{InboundRequest, RawRequest, Reply, Upgraded, ESTABLISHED};
pub use service::{run, run_with, Collaborators};
pub use tunnel::{Connector, LogReporter, Reporter, Session, TcpConnector, Tunnel};
