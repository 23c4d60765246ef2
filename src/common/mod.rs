//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;
pub mod types;

// Re-export commonly used types and functions
pub use error::{is_ignorable, tap_catch, try_catch, ErrorKind, ProxyError, Result};
pub use fs::{FileReader, TokioFileReader};
pub use log::init_logger;
pub use net::{normalize_port, parse_target, SafeInt, PORT};
pub use types::{AsyncIo, BoxedIo, ConnectionInfo};
