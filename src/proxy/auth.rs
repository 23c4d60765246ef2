//! Proxy credential store
//!
//! Precomputes the accepted `Proxy-Authorization` values from a JSON object
//! of `username -> password` pairs.

use std::collections::{BTreeMap, HashSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::HeaderMap;
use log::debug;
use serde_json::Value;

use crate::common::{FileReader, ProxyError, Result};
use crate::config::AuthSource;

/// Header carrying proxy credentials
pub const AUTH_HEADER: &str = "proxy-authorization";

/// Authentication scheme of the stored tokens
const SCHEME: &str = "Basic";

/// Immutable set of accepted authorization header values
#[derive(Debug, Clone)]
pub struct AuthStore {
    tokens: HashSet<String>,
}

impl AuthStore {
    /// Build the store from JSON text
    ///
    /// Passwords may be strings, numbers, or booleans; `{"alice": 1}` accepts
    /// `alice:1`. Fails when the text is not a JSON object, a password is
    /// `null` or structured, or there are no entries.
    pub fn from_json(data: &str) -> Result<Self> {
        let users: BTreeMap<String, Value> =
            serde_json::from_str(data).map_err(|e| ProxyError::AuthStore(e.to_string()))?;

        let tokens = users
            .iter()
            .map(|(user, pass)| password_text(user, pass).map(|pass| basic_token(user, &pass)))
            .collect::<Result<HashSet<String>>>()?;

        if tokens.is_empty() {
            return Err(ProxyError::AuthStore("empty auth file".to_string()));
        }

        debug!("Loaded {} proxy credential(s)", tokens.len());
        Ok(Self { tokens })
    }

    /// Build the store from a configured source
    pub async fn load(source: &AuthSource, reader: &dyn FileReader) -> Result<Self> {
        match source {
            AuthSource::Inline(data) => Self::from_json(data),
            AuthSource::File(path) => {
                let bytes = reader
                    .read(path)
                    .await
                    .map_err(|e| ProxyError::AuthStore(e.to_string()))?;
                let data = String::from_utf8(bytes).map_err(|e| ProxyError::AuthStore(e.to_string()))?;
                Self::from_json(&data)
            }
        }
    }

    /// Exact, case-sensitive membership test of a header value
    pub fn contains(&self, value: &str) -> bool {
        self.tokens.contains(value)
    }

    /// Whether the request headers carry accepted proxy credentials
    ///
    /// A missing or non-text header is never authorized.
    pub fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| self.contains(v))
    }

    /// Number of stored credentials
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Textual form of a scalar password value
fn password_text(user: &str, pass: &Value) -> Result<String> {
    match pass {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ProxyError::AuthStore(format!("password of {:?} is not a scalar", user))),
    }
}

/// `Basic <base64(user:pass)>`
pub fn basic_token(user: &str, pass: &str) -> String {
    format!("{} {}", SCHEME, STANDARD.encode(format!("{}:{}", user, pass)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TokioFileReader;
    use http::HeaderValue;
    use std::io::Write;

    const USERS: &str = r#"{ "alice": "wonderland", "bob": "builder" }"#;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_token() {
        assert_eq!(basic_token("aladdin", "opensesame"), "Basic YWxhZGRpbjpvcGVuc2VzYW1l");
    }

    #[test]
    fn test_two_entry_store() {
        let store = AuthStore::from_json(USERS).unwrap();
        assert_eq!(store.len(), 2);

        assert!(store.authorized(&headers_with(&basic_token("alice", "wonderland"))));
        assert!(store.authorized(&headers_with(&basic_token("bob", "builder"))));

        assert!(!store.authorized(&headers_with(&basic_token("alice", "builder"))));
        assert!(!store.authorized(&headers_with(&basic_token("mallory", "x"))));
        assert!(!store.authorized(&headers_with("basic YWxpY2U6d29uZGVybGFuZA==")));
        assert!(!store.authorized(&headers_with("")));
        assert!(!store.authorized(&HeaderMap::new()));

        let mut unrelated = HeaderMap::new();
        unrelated.insert("authorization", HeaderValue::from_str(&basic_token("alice", "wonderland")).unwrap());
        assert!(!store.authorized(&unrelated));
    }

    #[test]
    fn test_empty_or_malformed_store_fails() {
        for data in [
            "{}",
            "",
            "not json",
            "[]",
            r#"["alice"]"#,
            r#"{ "alice": null }"#,
            r#"{ "alice": ["x"] }"#,
            r#"{ "alice": { "pass": "x" } }"#,
        ] {
            let result = AuthStore::from_json(data);
            assert!(
                matches!(result, Err(ProxyError::AuthStore(_))),
                "{:?} should fail",
                data
            );
        }
    }

    #[test]
    fn test_scalar_passwords() {
        let store = AuthStore::from_json(r#"{ "alice": 1, "bob": true, "carol": 2.5 }"#).unwrap();

        assert!(store.contains(&basic_token("alice", "1")));
        assert!(store.contains(&basic_token("bob", "true")));
        assert!(store.contains(&basic_token("carol", "2.5")));
        assert!(!store.contains(&basic_token("alice", "1.0")));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(USERS.as_bytes()).unwrap();

        let source = AuthSource::File(file.path().to_path_buf());
        let store = AuthStore::load(&source, &TokioFileReader).await.unwrap();
        assert!(store.contains(&basic_token("bob", "builder")));
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let source = AuthSource::File("/definitely/not/here.json".into());
        let result = AuthStore::load(&source, &TokioFileReader).await;
        assert!(matches!(result, Err(ProxyError::AuthStore(_))));
    }

    #[tokio::test]
    async fn test_load_inline() {
        let source = AuthSource::Inline(USERS.to_string());
        let store = AuthStore::load(&source, &TokioFileReader).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
