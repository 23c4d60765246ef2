//! Caldera: an authenticating HTTP/HTTPS CONNECT tunnel proxy
//!
//! Clients ask the proxy to open a raw TCP connection to an arbitrary
//! `host:port` with `CONNECT`. After an optional `Proxy-Authorization`
//! check the proxy connects upstream, acknowledges the client, and relays
//! bytes unmodified in both directions until either side closes.
//!
//! # Main Features
//!
//! - Plaintext and TLS listeners, either of which may be disabled
//! - Basic proxy authentication against a JSON credential store
//! - Bounded upstream connect time
//! - Graceful shutdown through a cancellation token
//!
//! # Example
//!
//! ```no_run
//! use caldera::config::{PortOptions, ProxyOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> caldera::Result<()> {
//!     let opts = ProxyOptions {
//!         port: PortOptions { http: Some(8080), https: None },
//!         ..Default::default()
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!     let signal = shutdown.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         signal.cancel();
//!     });
//!
//!     caldera::run(&opts, shutdown).await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;
pub mod tls;

// Re-export commonly used structures and functions for convenience
pub use common::{ProxyError, Result};
pub use config::ProxyOptions;
pub use proxy::{run, run_with, Collaborators};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
