//! Network utility functions
//!
//! This module provides port validation and CONNECT target helpers.

use http::Uri;
use serde_json::Value;

use super::error::{ProxyError, Result};

/// Largest integer a double can hold exactly
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Inclusive integer range check
///
/// Accepts a value only when it is an exact integer inside `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeInt {
    pub min: i64,
    pub max: i64,
}

/// Valid values for a listener port
pub const PORT: SafeInt = SafeInt::new(0, 65535);

impl SafeInt {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Check an already-typed integer
    pub fn check(&self, n: i64) -> Option<i64> {
        ((-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&n) && n >= self.min && n <= self.max).then_some(n)
    }

    /// Check an untyped JSON value
    ///
    /// Booleans, strings, non-integers and out-of-range numbers are absent.
    pub fn check_value(&self, value: &Value) -> Option<i64> {
        let Value::Number(n) = value else {
            return None;
        };

        if let Some(i) = n.as_i64() {
            return self.check(i);
        }

        // u64 beyond i64::MAX is never a safe integer
        if n.is_u64() {
            return None;
        }

        let f = n.as_f64()?;
        if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64 {
            self.check(f as i64)
        } else {
            None
        }
    }
}

/// Port of a CONNECT target, defaulting by scheme
///
/// An explicit, non-zero port always wins; otherwise `http` targets use 80
/// and everything else 443.
pub fn normalize_port(uri: &Uri) -> u16 {
    match uri.port_u16() {
        Some(port) if port > 0 => port,
        _ if uri.scheme_str() == Some("http") => 80,
        _ => 443,
    }
}

/// Split a request target into `(hostname, port)`
///
/// Accepts authority form (`host:port`) as sent with CONNECT as well as
/// absolute URLs. IPv6 literals lose their brackets.
pub fn parse_target(target: &str) -> Result<(String, u16)> {
    let uri: Uri = target
        .parse()
        .map_err(|e| ProxyError::Http(format!("invalid target {:?}: {}", target, e)))?;

    let host = uri
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProxyError::Http(format!("target without host: {:?}", target)))?;

    Ok((host.to_string(), normalize_port(&uri)))
}
