//! Metadata extraction against generated certificates.

use codec::x509::{parse_certificate, verify_signature};
use codec::{digest, CodecError};
use rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};

fn ca_params(cn: &str, country: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CountryName, country);
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(2035, 1, 1);
    params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    params.key_usages.push(KeyUsagePurpose::CrlSign);
    params
}

fn leaf_params(cn: &str, country: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.distinguished_name.push(DnType::CountryName, country);
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = date_time_ymd(2024, 1, 1);
    params.not_after = date_time_ymd(2027, 1, 1);
    params.key_usages.push(KeyUsagePurpose::DigitalSignature);
    params
}

#[test]
fn self_signed_csca_extraction() {
    let key = KeyPair::generate().unwrap();
    let der = ca_params("CSCA-KOREA", "KR").self_signed(&key).unwrap().der().to_vec();

    let info = parse_certificate(&der).unwrap();
    assert!(info.subject_dn.contains("CSCA-KOREA"));
    assert!(info.is_self_signed);
    assert!(info.is_ca);
    assert_eq!(info.fingerprint, digest::sha256_hex(&der));
    assert_eq!(info.fingerprint.len(), 64);
    assert_eq!(info.country_code(), "KR");
    assert_eq!(info.public_key_algorithm, "EC");
    assert_eq!(info.public_key_size, 256);
    assert!(info.public_key_curve.is_some());
    assert!(info.key_usage.contains(&"keyCertSign".to_string()));
    assert_eq!(info.not_before.format("%Y-%m-%d").to_string(), "2020-01-01");
    assert_eq!(info.not_after.format("%Y-%m-%d").to_string(), "2035-01-01");
    assert_eq!(info.der, der);
}

#[test]
fn issued_leaf_is_not_self_signed_and_verifies_under_issuer() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-KOREA", "KR");
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);

    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der =
        leaf_params("Document Signer 1", "KR").signed_by(&dsc_key, &issuer).unwrap().der().to_vec();

    let info = parse_certificate(&dsc_der).unwrap();
    assert!(!info.is_self_signed);
    assert!(!info.is_ca);
    assert!(info.subject_dn.contains("Document Signer 1"));
    assert!(info.issuer_dn.contains("CSCA-KOREA"));
    assert!(!info.serial_number.is_empty());

    assert!(verify_signature(&dsc_der, &ca_der).unwrap());
    // A leaf does not verify under its own key.
    assert!(!verify_signature(&dsc_der, &dsc_der).unwrap());
}

#[test]
fn country_falls_back_to_issuer_then_xx() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-NOWHERE", "DE");
    let issuer = Issuer::new(ca, ca_key);

    // Leaf with no country RDN at all.
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, "Stateless Signer");
    params.not_before = date_time_ymd(2024, 1, 1);
    params.not_after = date_time_ymd(2027, 1, 1);
    let der = params.signed_by(&key, &issuer).unwrap().der().to_vec();

    let info = parse_certificate(&der).unwrap();
    assert_eq!(info.country_code(), "DE");

    // Fully self-signed without a country anywhere lands in XX.
    let orphan_key = KeyPair::generate().unwrap();
    let mut orphan = CertificateParams::new(Vec::new()).unwrap();
    orphan.distinguished_name.push(DnType::CommonName, "No Country");
    orphan.not_before = date_time_ymd(2024, 1, 1);
    orphan.not_after = date_time_ymd(2027, 1, 1);
    let orphan_der = orphan.self_signed(&orphan_key).unwrap().der().to_vec();
    assert_eq!(parse_certificate(&orphan_der).unwrap().country_code(), "XX");
}

#[test]
fn malformed_der_is_rejected() {
    assert!(matches!(parse_certificate(b"not a certificate"), Err(CodecError::Malformed(_))));
    assert!(matches!(parse_certificate(&[]), Err(CodecError::Malformed(_))));
}
