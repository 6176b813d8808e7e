//! Directory contract tests over the in-memory implementation.

use chrono::{TimeZone, Utc};
use directory::{Directory, DitLayout, MemDirectory, Slot};
use pkd_core::model::{CertType, Certificate, Crl};
use uuid::Uuid;

fn cert(t: CertType, country: &str, fingerprint: &str, link: bool) -> Certificate {
    Certificate {
        id: Uuid::new_v4(),
        cert_type: t,
        fingerprint: fingerprint.to_string(),
        country_code: country.to_string(),
        subject_dn: "CN=Subject,C=KR".into(),
        issuer_dn: if link { "CN=Other,C=KR".into() } else { "CN=Subject,C=KR".into() },
        serial_number: "1f".into(),
        not_before: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        not_after: Utc.with_ymd_and_hms(2035, 1, 1, 0, 0, 0).unwrap(),
        signature_algorithm: "ecdsa-with-SHA256".into(),
        public_key_algorithm: "EC".into(),
        public_key_size: 256,
        public_key_curve: Some("prime256v1".into()),
        key_usage: vec![],
        extended_key_usage: vec![],
        is_ca: t == CertType::Csca,
        path_len_constraint: None,
        subject_key_identifier: None,
        authority_key_identifier: None,
        crl_distribution_points: vec![],
        ocsp_responder_url: None,
        is_self_signed: t == CertType::Csca && !link,
        der: vec![0x30, 0x03],
        stored_in_ldap: false,
        ldap_dn: None,
        upload_id: None,
        created_at: Utc::now(),
    }
}

fn dir() -> MemDirectory {
    MemDirectory::new(DitLayout::new("dc=pkd,dc=example", false))
}

#[tokio::test]
async fn leaf_write_is_idempotent_and_visible() {
    let d = dir();
    let c = cert(CertType::Dsc, "KR", &"30".repeat(32), false);
    d.ensure_container(Slot::Dsc, "KR").await.unwrap();
    let dn = d.write_certificate(&c).await.unwrap();
    assert_eq!(dn, d.certificate_dn(&c));
    assert!(d.entry_exists(&dn).await.unwrap());

    // Re-writing replaces the binary and still succeeds.
    let before = d.len();
    d.write_certificate(&c).await.unwrap();
    assert_eq!(d.len(), before);

    d.delete_leaf(&dn).await.unwrap();
    assert!(!d.entry_exists(&dn).await.unwrap());
}

#[tokio::test]
async fn link_certificates_project_under_lc() {
    let d = dir();
    let link = cert(CertType::Csca, "KR", &"31".repeat(32), true);
    assert!(link.is_link_certificate());
    d.ensure_container(Slot::for_certificate(&link), "KR").await.unwrap();
    let dn = d.write_certificate(&link).await.unwrap();
    assert!(dn.contains(",o=lc,"));
    assert!(dn.contains(",dc=data,"));
}

#[tokio::test]
async fn nc_container_is_separate() {
    let d = dir();
    let nc = cert(CertType::DscNc, "SG", &"32".repeat(32), false);
    d.ensure_container(Slot::for_certificate(&nc), "SG").await.unwrap();
    let dn = d.write_certificate(&nc).await.unwrap();
    assert!(dn.contains(",o=dsc,"));
    assert!(dn.contains(",dc=nc-data,"));
}

#[tokio::test]
async fn counts_classify_by_placement() {
    let d = dir();
    let csca = cert(CertType::Csca, "KR", &"33".repeat(32), false);
    let link = cert(CertType::Csca, "KR", &"34".repeat(32), true);
    let dsc = cert(CertType::Dsc, "KR", &"35".repeat(32), false);
    for c in [&csca, &link, &dsc] {
        d.ensure_container(Slot::for_certificate(c), "KR").await.unwrap();
        d.write_certificate(c).await.unwrap();
    }
    let crl = Crl {
        id: Uuid::new_v4(),
        fingerprint: "36".repeat(32),
        country_code: "KR".into(),
        issuer_dn: "CN=Subject,C=KR".into(),
        this_update: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        next_update: None,
        crl_number: None,
        revoked: vec![],
        der: vec![0x30, 0x04],
        stored_in_ldap: false,
        ldap_dn: None,
        upload_id: None,
        created_at: Utc::now(),
    };
    d.ensure_container(Slot::Crl, "KR").await.unwrap();
    d.write_crl(&crl).await.unwrap();

    let counts = d.count_by_type().await.unwrap();
    // Link certificates count toward the CSCA type.
    assert_eq!(counts.csca, 2);
    assert_eq!(counts.dsc, 1);
    assert_eq!(counts.crl, 1);
}
