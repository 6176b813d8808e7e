//! Binary decoders for country-contributed PKD material.
//!
//! Overview
//! - Content identity: SHA-256 over the exact bytes received, lowercase hex.
//!   Re-encoded forms are never the fingerprint preimage.
//! - LDIF (RFC 2849 subset): streaming entry iterator, continuation lines,
//!   `::` base64 markers, `;binary` attribute options, `#` comments.
//! - X.509 / CRL (RFC 5280): full metadata extraction via `x509-parser`,
//!   ring-backed signature checks.
//! - CMS SignedData (RFC 5652): Master List and Deviation List containers via
//!   the `cms`/`der` stack; signer certificates and embedded certificates are
//!   returned separately.
//! - DN normalization: format-agnostic canonical form used as the sole
//!   equality primitive across the subsystem. Not schema-aware.

#![deny(unsafe_code)]

pub mod cms_container;
pub mod crl;
pub mod digest;
pub mod dn;
pub mod ldif;
pub mod x509;

use thiserror::Error;

/// Decoder errors. Every variant is recoverable at the entry level: callers
/// skip the entry, count the failure and continue.
#[derive(Debug, Error)]
pub enum CodecError {
    /// LDIF structure violation (orphan continuation, missing dn, bad marker).
    #[error("ldif: {0}")]
    Ldif(String),
    /// Base64 payload did not decode after alphabet filtering.
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// DER did not parse.
    #[error("malformed: {0}")]
    Malformed(String),
    /// X.509 version outside v1..v3.
    #[error("unsupported x509 version: {0}")]
    UnsupportedVersion(u32),
    /// CMS container did not parse or carries no usable content.
    #[error("cms: {0}")]
    Cms(String),
    /// Underlying reader failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode base64 text, silently dropping characters outside the base64
/// alphabet (line folds and stray whitespace are common in contributed data).
pub fn decode_base64(s: &str) -> Result<Vec<u8>, CodecError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let filtered: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    Ok(STANDARD.decode(filtered.as_bytes())?)
}

/// Unwrap PEM if present, otherwise return the input unchanged. The result is
/// the DER fingerprint preimage for single-certificate uploads.
pub fn maybe_pem_to_der(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if !bytes.starts_with(b"-----BEGIN") {
        return Ok(bytes.to_vec());
    }
    let mut cursor = std::io::Cursor::new(bytes);
    for item in rustls_pemfile::read_all(&mut cursor) {
        match item {
            Ok(rustls_pemfile::Item::X509Certificate(der)) => return Ok(der.as_ref().to_vec()),
            Ok(_) => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Err(CodecError::Malformed("pem contains no certificate".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_ignores_foreign_characters() {
        // "ABCD" with embedded whitespace and punctuation outside the alphabet
        let decoded = decode_base64("AB\n C\tD!").unwrap();
        assert_eq!(decoded, decode_base64("ABCD").unwrap());
    }

    #[test]
    fn non_pem_passes_through() {
        let der = vec![0x30, 0x03, 0x02, 0x01, 0x01];
        assert_eq!(maybe_pem_to_der(&der).unwrap(), der);
    }
}
