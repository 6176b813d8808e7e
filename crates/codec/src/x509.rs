//! X.509 certificate metadata extraction.

use crate::{digest, dn, CodecError};
use chrono::{DateTime, Utc};
use pkd_core::model::{CertType, Certificate};
use uuid::Uuid;
use x509_parser::objects::{oid2sn, oid_registry};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

/// Extracted certificate metadata, prior to classification. The `der` field
/// holds the exact input bytes; `fingerprint` is computed over them.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Lowercase-hex SHA-256 of `der`.
    pub fingerprint: String,
    /// Subject DN as printed.
    pub subject_dn: String,
    /// Issuer DN as printed.
    pub issuer_dn: String,
    /// Serial number, lowercase hex.
    pub serial_number: String,
    /// Validity start.
    pub not_before: DateTime<Utc>,
    /// Validity end.
    pub not_after: DateTime<Utc>,
    /// Signature algorithm name.
    pub signature_algorithm: String,
    /// Public key algorithm.
    pub public_key_algorithm: String,
    /// Key size in bits.
    pub public_key_size: u32,
    /// Named curve for EC keys.
    pub public_key_curve: Option<String>,
    /// keyUsage bit names.
    pub key_usage: Vec<String>,
    /// extendedKeyUsage names.
    pub extended_key_usage: Vec<String>,
    /// basicConstraints CA flag.
    pub is_ca: bool,
    /// basicConstraints path length.
    pub path_len_constraint: Option<u32>,
    /// SKI, lowercase hex.
    pub subject_key_identifier: Option<String>,
    /// AKI keyIdentifier, lowercase hex.
    pub authority_key_identifier: Option<String>,
    /// CRL distribution point URIs.
    pub crl_distribution_points: Vec<String>,
    /// OCSP responder URI.
    pub ocsp_responder_url: Option<String>,
    /// Subject ≡ issuer under normalization and the self-signature verifies.
    pub is_self_signed: bool,
    /// Exact input bytes.
    pub der: Vec<u8>,
}

impl CertificateInfo {
    /// Country code for storage: subject first, issuer fallback, `XX` last.
    pub fn country_code(&self) -> String {
        dn::extract_country(&self.subject_dn)
            .or_else(|| dn::extract_country(&self.issuer_dn))
            .unwrap_or_else(|| "XX".to_string())
    }

    /// Promote to a storable [`Certificate`] once classified.
    pub fn into_certificate(self, cert_type: CertType, upload_id: Option<Uuid>) -> Certificate {
        let country_code = self.country_code();
        Certificate {
            id: Uuid::new_v4(),
            cert_type,
            fingerprint: self.fingerprint,
            country_code,
            subject_dn: self.subject_dn,
            issuer_dn: self.issuer_dn,
            serial_number: self.serial_number,
            not_before: self.not_before,
            not_after: self.not_after,
            signature_algorithm: self.signature_algorithm,
            public_key_algorithm: self.public_key_algorithm,
            public_key_size: self.public_key_size,
            public_key_curve: self.public_key_curve,
            key_usage: self.key_usage,
            extended_key_usage: self.extended_key_usage,
            is_ca: self.is_ca,
            path_len_constraint: self.path_len_constraint,
            subject_key_identifier: self.subject_key_identifier,
            authority_key_identifier: self.authority_key_identifier,
            crl_distribution_points: self.crl_distribution_points,
            ocsp_responder_url: self.ocsp_responder_url,
            is_self_signed: self.is_self_signed,
            der: self.der,
            stored_in_ldap: false,
            ldap_dn: None,
            upload_id,
            created_at: Utc::now(),
        }
    }
}

/// Parse a DER certificate and extract the full metadata set.
pub fn parse_certificate(der: &[u8]) -> Result<CertificateInfo, CodecError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let version = cert.version().0;
    if version > 2 {
        return Err(CodecError::UnsupportedVersion(version + 1));
    }

    let subject_dn = cert.subject().to_string();
    let issuer_dn = cert.issuer().to_string();

    let not_before = to_utc(cert.validity().not_before)?;
    let not_after = to_utc(cert.validity().not_after)?;

    let (public_key_algorithm, public_key_size, public_key_curve) = public_key_info(&cert)?;

    let mut info = CertificateInfo {
        fingerprint: digest::sha256_hex(der),
        subject_dn,
        issuer_dn,
        serial_number: hex::encode(cert.raw_serial()),
        not_before,
        not_after,
        signature_algorithm: oid_name(&cert.signature_algorithm.algorithm),
        public_key_algorithm,
        public_key_size,
        public_key_curve,
        key_usage: Vec::new(),
        extended_key_usage: Vec::new(),
        is_ca: false,
        path_len_constraint: None,
        subject_key_identifier: None,
        authority_key_identifier: None,
        crl_distribution_points: Vec::new(),
        ocsp_responder_url: None,
        is_self_signed: false,
        der: der.to_vec(),
    };

    for ext in cert.iter_extensions() {
        match ext.parsed_extension() {
            ParsedExtension::KeyUsage(ku) => info.key_usage = key_usage_names(ku),
            ParsedExtension::ExtendedKeyUsage(eku) => {
                info.extended_key_usage = extended_key_usage_names(eku);
            }
            ParsedExtension::BasicConstraints(bc) => {
                info.is_ca = bc.ca;
                info.path_len_constraint = bc.path_len_constraint;
            }
            ParsedExtension::SubjectKeyIdentifier(ski) => {
                info.subject_key_identifier = Some(hex::encode(ski.0));
            }
            ParsedExtension::AuthorityKeyIdentifier(aki) => {
                info.authority_key_identifier =
                    aki.key_identifier.as_ref().map(|ki| hex::encode(ki.0));
            }
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in points.iter() {
                    if let Some(DistributionPointName::FullName(names)) =
                        &point.distribution_point
                    {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                info.crl_distribution_points.push((*uri).to_string());
                            }
                        }
                    }
                }
            }
            ParsedExtension::AuthorityInfoAccess(aia) => {
                for desc in &aia.accessdescs {
                    if desc.access_method == x509_parser::oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP {
                        if let GeneralName::URI(uri) = &desc.access_location {
                            info.ocsp_responder_url = Some((*uri).to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    info.is_self_signed = dn::equivalent(&info.subject_dn, &info.issuer_dn)
        && cert.verify_signature(None).is_ok();

    Ok(info)
}

/// Verify `cert`'s signature against `issuer`'s public key. Both arguments are
/// DER. A certificate whose subject equals its issuer but does not verify
/// under its own key is simply a failed verification here, not an error.
pub fn verify_signature(cert_der: &[u8], issuer_der: &[u8]) -> Result<bool, CodecError> {
    let (_, cert) =
        X509Certificate::from_der(cert_der).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let (_, issuer) =
        X509Certificate::from_der(issuer_der).map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(cert.verify_signature(Some(issuer.public_key())).is_ok())
}

fn to_utc(t: ASN1Time) -> Result<DateTime<Utc>, CodecError> {
    DateTime::<Utc>::from_timestamp(t.timestamp(), 0)
        .ok_or_else(|| CodecError::Malformed("validity instant out of range".into()))
}

fn oid_name(oid: &x509_parser::der_parser::Oid) -> String {
    oid2sn(oid, oid_registry()).map_or_else(|_| oid.to_id_string(), str::to_string)
}

fn public_key_info(
    cert: &X509Certificate<'_>,
) -> Result<(String, u32, Option<String>), CodecError> {
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => {
            Ok(("RSA".to_string(), rsa_bit_size(rsa.modulus), None))
        }
        Ok(PublicKey::EC(point)) => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|o| oid_name(&o));
            // Uncompressed SEC1 point: 0x04 || X || Y
            let bits = (point.data().len().saturating_sub(1) / 2 * 8) as u32;
            Ok(("EC".to_string(), bits, curve))
        }
        Ok(_) => Ok((oid_name(&spki.algorithm.algorithm), 0, None)),
        Err(e) => Err(CodecError::Malformed(format!("public key: {e}"))),
    }
}

fn rsa_bit_size(modulus: &[u8]) -> u32 {
    let mut m = modulus;
    while let [0, rest @ ..] = m {
        m = rest;
    }
    match m.first() {
        None => 0,
        Some(first) => (m.len() as u32) * 8 - first.leading_zeros(),
    }
}

fn key_usage_names(ku: &KeyUsage) -> Vec<String> {
    let mut names = Vec::new();
    if ku.digital_signature() {
        names.push("digitalSignature".to_string());
    }
    if ku.non_repudiation() {
        names.push("nonRepudiation".to_string());
    }
    if ku.key_encipherment() {
        names.push("keyEncipherment".to_string());
    }
    if ku.data_encipherment() {
        names.push("dataEncipherment".to_string());
    }
    if ku.key_agreement() {
        names.push("keyAgreement".to_string());
    }
    if ku.key_cert_sign() {
        names.push("keyCertSign".to_string());
    }
    if ku.crl_sign() {
        names.push("cRLSign".to_string());
    }
    if ku.encipher_only() {
        names.push("encipherOnly".to_string());
    }
    if ku.decipher_only() {
        names.push("decipherOnly".to_string());
    }
    names
}

fn extended_key_usage_names(eku: &ExtendedKeyUsage<'_>) -> Vec<String> {
    let mut names = Vec::new();
    if eku.any {
        names.push("anyExtendedKeyUsage".to_string());
    }
    if eku.server_auth {
        names.push("serverAuth".to_string());
    }
    if eku.client_auth {
        names.push("clientAuth".to_string());
    }
    if eku.code_signing {
        names.push("codeSigning".to_string());
    }
    if eku.email_protection {
        names.push("emailProtection".to_string());
    }
    if eku.time_stamping {
        names.push("timeStamping".to_string());
    }
    if eku.ocsp_signing {
        names.push("ocspSigning".to_string());
    }
    for oid in &eku.other {
        names.push(oid.to_id_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_bit_size_ignores_leading_zero() {
        // DER INTEGER for a 2048-bit modulus carries a 0x00 pad byte.
        let mut modulus = vec![0x00, 0x80];
        modulus.extend(std::iter::repeat(0xff).take(255));
        assert_eq!(rsa_bit_size(&modulus), 2048);
        assert_eq!(rsa_bit_size(&[0x01, 0x00]), 9);
        assert_eq!(rsa_bit_size(&[]), 0);
    }

    #[test]
    fn truncated_der_is_malformed() {
        let err = parse_certificate(&[0x30, 0x82, 0xff, 0xff, 0x00]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
