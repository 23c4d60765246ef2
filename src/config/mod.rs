//! Configuration module
//!
//! Options consumed by the proxy core. They are assembled once per run by the
//! binary (defaults, then an optional JSON file, then command line and
//! environment) and stay immutable afterwards.

mod defaults;
mod loader;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::common::fs::to_absolute;
use crate::common::{Result, PORT};

pub use defaults::{
    HOSTNAME_STR, CERT_PATH_STR, KEY_PATH_STR, LOG_LEVEL_STR, TIMEOUT_MS, SHUTDOWN_GRACE,
};

/// Proxy options
///
/// Absence of a port means "do not start that listener".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyOptions {
    /// Credential source: inline JSON object or path to a JSON file
    pub auth: Option<String>,

    /// Address the listeners bind to
    pub hostname: Option<String>,

    /// Listener ports
    pub port: PortOptions,

    /// Upstream connect timeout in milliseconds, `0` for unbounded
    pub timeout: Option<u64>,

    /// PEM certificate chain for the HTTPS listener
    pub crt: Option<PathBuf>,

    /// PEM private key for the HTTPS listener
    pub key: Option<PathBuf>,
}

/// Listener ports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortOptions {
    #[serde(deserialize_with = "deserialize_port")]
    pub http: Option<i64>,

    #[serde(deserialize_with = "deserialize_port")]
    pub https: Option<i64>,
}

/// Ports outside `[0, 65535]` or of the wrong JSON type load as absent
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| PORT.check_value(v)))
}

/// Where the credential store comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    /// JSON text given directly
    Inline(String),
    /// JSON file
    File(PathBuf),
}

impl AuthSource {
    /// Interpret an `auth` option value
    ///
    /// Text starting with `{` is inline JSON, anything else a file path.
    pub fn parse(value: &str) -> Self {
        if value.trim_start().starts_with('{') {
            Self::Inline(value.to_string())
        } else {
            Self::File(PathBuf::from(value))
        }
    }

    /// Resolve file sources to an absolute path
    pub fn into_absolute(self) -> Result<Self> {
        match self {
            Self::File(path) => Ok(Self::File(to_absolute(&path)?)),
            inline => Ok(inline),
        }
    }
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => write!(f, "<inline>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl ProxyOptions {
    /// Configured credential source, if any
    pub fn auth_source(&self) -> Option<AuthSource> {
        self.auth.as_deref().map(AuthSource::parse)
    }

    /// Deadline for the upstream connect step, `None` when unbounded
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.timeout {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(defaults::connect_timeout()),
        }
    }

    /// Address the listeners bind to
    pub fn bind_host(&self) -> &str {
        self.hostname.as_deref().unwrap_or(HOSTNAME_STR)
    }
}

/// Log the configuration
pub fn log_config(opts: &ProxyOptions) {
    use log::info;

    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    let port = |p: Option<i64>| p.map_or_else(|| "-".to_string(), |p| p.to_string());

    info!("=== Configuration ===");
    info!("  Bind address: {}", opts.bind_host());
    info!("  HTTP port: {}", port(opts.port.http));
    info!("  HTTPS port: {}", port(opts.port.https));
    match opts.connect_timeout() {
        Some(t) => info!("  Connect timeout: {} ms", t.as_millis()),
        None => info!("  Connect timeout: unbounded"),
    }
    match opts.auth_source() {
        Some(src) => info!("  Credentials: {}", src),
        None => info!("  Credentials: none (open proxy)"),
    }
    if let Some(ref crt) = opts.crt {
        info!("  Certificate: {}", crt.display());
    }
    if let Some(ref key) = opts.key {
        info!("  Private key: {}", key.display());
    }
}
