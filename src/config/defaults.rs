//! Default configuration values
//!
//! Single source of truth for defaults shared by the command line and the
//! configuration loader.

use std::time::Duration;

/// Default address listeners bind to
pub const HOSTNAME_STR: &str = "0.0.0.0";

/// Default certificate path as string
pub const CERT_PATH_STR: &str = "server.crt";

/// Default private key path as string
pub const KEY_PATH_STR: &str = "server.key";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default upstream connect timeout in milliseconds
pub const TIMEOUT_MS: u64 = 500;

/// Grace period granted to in-flight connections after shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default upstream connect timeout
pub fn connect_timeout() -> Duration {
    Duration::from_millis(TIMEOUT_MS)
}
