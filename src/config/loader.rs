//! Configuration loader
//!
//! Reads options from a JSON file and layers option sets on top of each other.

use std::fs;
use std::path::Path;

use log::debug;

use super::ProxyOptions;
use crate::common::{ProxyError, Result};

impl ProxyOptions {
    /// Load options from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from file: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("Failed to read configuration file {}: {}", path.display(), e))
        })?;

        Self::from_json(&content)
            .map_err(|e| ProxyError::Config(format!("Error parsing {}: {}", path.display(), e)))
    }

    /// Parse options from JSON text
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Layer `other` on top of `self`; values set in `other` win
    pub fn merge(self, other: ProxyOptions) -> ProxyOptions {
        ProxyOptions {
            auth: other.auth.or(self.auth),
            hostname: other.hostname.or(self.hostname),
            port: super::PortOptions {
                http: other.port.http.or(self.port.http),
                https: other.port.https.or(self.port.https),
            },
            timeout: other.timeout.or(self.timeout),
            crt: other.crt.or(self.crt),
            key: other.key.or(self.key),
        }
    }
}
