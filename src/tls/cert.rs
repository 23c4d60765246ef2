//! Certificate inspection helpers

use openssl::hash::MessageDigest;
use openssl::x509::X509;

use crate::common::Result;

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Certificate subject
    pub subject: String,
    /// SHA-256 fingerprint, colon-separated upper-case hex
    pub fingerprint: String,
}

/// Summarise the leaf certificate of a PEM chain
pub fn describe_cert(cert_pem: &[u8]) -> Result<CertificateInfo> {
    let cert = X509::from_pem(cert_pem)?;

    let subject = cert
        .subject_name()
        .entries()
        .map(|entry| {
            let field = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!("{}={}", field, value)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let fingerprint = cert
        .digest(MessageDigest::sha256())?
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":");

    Ok(CertificateInfo { subject, fingerprint })
}
