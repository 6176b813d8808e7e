//! Trust chain scenarios over generated certificates and the in-memory
//! repository.

use cert_store::{MemStore, Store};
use chrono::{TimeZone, Utc};
use codec::x509::parse_certificate;
use pkd_core::clock::ManualClock;
use pkd_core::model::{CertType, Certificate, Crl, RevokedEntry, ValidationStatus};
use rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, CrlDistributionPoint, DnType, IsCa,
    Issuer, KeyPair,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::TrustValidator;

fn ca_params(cn: &str, country: &str, not_after: (i32, u8, u8)) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CountryName, country);
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = date_time_ymd(2019, 1, 1);
    params.not_after = date_time_ymd(not_after.0, not_after.1, not_after.2);
    params
}

fn dsc_params(cn: &str, country: &str, window: ((i32, u8, u8), (i32, u8, u8))) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.distinguished_name.push(DnType::CountryName, country);
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = date_time_ymd(window.0 .0, window.0 .1, window.0 .2);
    params.not_after = date_time_ymd(window.1 .0, window.1 .1, window.1 .2);
    params
}

fn as_cert(der: &[u8], t: CertType) -> Certificate {
    parse_certificate(der).unwrap().into_certificate(t, None)
}

fn clock_2026() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()))
}

async fn validator_over(certs: Vec<Certificate>, clock: Arc<ManualClock>) -> (Arc<MemStore>, TrustValidator) {
    let store = Arc::new(MemStore::new());
    for c in &certs {
        store.upsert_certificate(c).await.unwrap();
    }
    let v = TrustValidator::new(store.clone(), clock, true);
    (store, v)
}

#[tokio::test]
async fn korean_dsc_builds_a_valid_two_step_chain() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-KOREA", "KR", (2035, 1, 1));
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);

    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Document Signer 1", "KR", ((2024, 1, 1), (2027, 1, 1)))
        .signed_by(&dsc_key, &issuer)
        .unwrap()
        .der()
        .to_vec();

    let csca = as_cert(&ca_der, CertType::Csca);
    let dsc = as_cert(&dsc_der, CertType::Dsc);
    let (store, validator) = validator_over(vec![csca.clone()], clock_2026()).await;

    let result = validator.validate(&dsc).await;
    assert_eq!(result.validation_status, ValidationStatus::Valid);
    assert!(result.trust_chain_valid);
    assert!(result.signature_valid);
    assert_eq!(result.chain_path_string(), "Document Signer 1 → CSCA-KOREA");
    assert_eq!(result.csca_fingerprint.as_deref(), Some(csca.fingerprint.as_str()));
    assert!(!result.crl_checked);

    // The result is persisted and overwritten on re-validation.
    let stored = store.find_validation_result(&dsc.fingerprint).await.unwrap().unwrap();
    assert_eq!(stored.validation_status, ValidationStatus::Valid);
}

#[tokio::test]
async fn link_certificate_bridges_to_the_older_root() {
    // Rollover: self-signed 001, self-signed 003, and a link 003←001 whose
    // remaining validity exceeds the self-signed 003.
    let key_001 = KeyPair::generate().unwrap();
    let params_001 = ca_params("CSCA Latvia 001", "LV", (2035, 1, 1));
    let der_001 = params_001.self_signed(&key_001).unwrap().der().to_vec();
    let issuer_001 = Issuer::new(params_001, key_001);

    let key_003 = KeyPair::generate().unwrap();
    let params_003_self = ca_params("CSCA Latvia 003", "LV", (2030, 1, 1));
    let der_003_self = params_003_self.self_signed(&key_003).unwrap().der().to_vec();

    let der_link = ca_params("CSCA Latvia 003", "LV", (2033, 1, 1))
        .signed_by(&key_003, &issuer_001)
        .unwrap()
        .der()
        .to_vec();

    let issuer_003 = Issuer::new(ca_params("CSCA Latvia 003", "LV", (2030, 1, 1)), key_003);
    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Document Signer LV", "LV", ((2024, 1, 1), (2027, 1, 1)))
        .signed_by(&dsc_key, &issuer_003)
        .unwrap()
        .der()
        .to_vec();

    let certs = vec![
        as_cert(&der_001, CertType::Csca),
        as_cert(&der_003_self, CertType::Csca),
        as_cert(&der_link, CertType::Csca),
    ];
    assert!(certs[2].is_link_certificate());

    let (_, validator) = validator_over(certs.clone(), clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;

    assert_eq!(result.validation_status, ValidationStatus::Valid);
    assert_eq!(result.trust_chain_path.len(), 3);
    assert_eq!(
        result.chain_path_string(),
        "Document Signer LV → CSCA Latvia 003 → CSCA Latvia 001"
    );
    assert_eq!(result.csca_fingerprint.as_deref(), Some(certs[0].fingerprint.as_str()));
}

#[tokio::test]
async fn self_signed_csca_terminates_without_circular_reference() {
    let key = KeyPair::generate().unwrap();
    let der = ca_params("CSCA-SOLO", "NL", (2035, 1, 1)).self_signed(&key).unwrap().der().to_vec();
    let csca = as_cert(&der, CertType::Csca);
    assert!(csca.is_self_signed);

    let (_, validator) = validator_over(vec![csca.clone()], clock_2026()).await;
    let result = validator.validate(&csca).await;
    assert_eq!(result.validation_status, ValidationStatus::Valid);
    assert!(result.trust_chain_valid);
    assert_eq!(result.trust_chain_path, vec!["CSCA-SOLO".to_string()]);
    assert_ne!(result.trust_chain_message.as_deref(), Some("CIRCULAR_REFERENCE"));
}

#[tokio::test]
async fn unknown_issuer_is_csca_not_found() {
    let ca_key = KeyPair::generate().unwrap();
    let issuer = Issuer::new(ca_params("CSCA-GHOST", "SE", (2035, 1, 1)), ca_key);
    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Orphan Signer", "SE", ((2024, 1, 1), (2027, 1, 1)))
        .signed_by(&dsc_key, &issuer)
        .unwrap()
        .der()
        .to_vec();

    let (_, validator) = validator_over(Vec::new(), clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;
    assert_eq!(result.validation_status, ValidationStatus::Invalid);
    assert!(!result.trust_chain_valid);
    assert_eq!(result.trust_chain_message.as_deref(), Some("CSCA_NOT_FOUND"));
    assert!(result.trust_chain_path.is_empty());
}

#[tokio::test]
async fn same_subject_roots_are_disambiguated_by_signature() {
    // Two distinct roots share one subject DN; only the actual signer wins.
    let key_a = KeyPair::generate().unwrap();
    let params_a = ca_params("CSCA-DUP", "PL", (2034, 1, 1));
    let der_a = params_a.self_signed(&key_a).unwrap().der().to_vec();
    let issuer_a = Issuer::new(params_a, key_a);

    let key_b = KeyPair::generate().unwrap();
    let der_b =
        ca_params("CSCA-DUP", "PL", (2036, 1, 1)).self_signed(&key_b).unwrap().der().to_vec();

    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Signer PL", "PL", ((2024, 1, 1), (2027, 1, 1)))
        .signed_by(&dsc_key, &issuer_a)
        .unwrap()
        .der()
        .to_vec();

    let a = as_cert(&der_a, CertType::Csca);
    let b = as_cert(&der_b, CertType::Csca);
    // b sorts first (later notAfter) but fails signature; a must be chosen.
    let (_, validator) = validator_over(vec![a.clone(), b], clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;
    assert_eq!(result.validation_status, ValidationStatus::Valid);
    assert_eq!(result.csca_fingerprint.as_deref(), Some(a.fingerprint.as_str()));
}

#[tokio::test]
async fn signature_mismatch_with_known_subject_is_signature_invalid() {
    let key_real = KeyPair::generate().unwrap();
    let issuer_real = Issuer::new(ca_params("CSCA-MISMATCH", "FI", (2035, 1, 1)), key_real);

    let key_wrong = KeyPair::generate().unwrap();
    let der_wrong = ca_params("CSCA-MISMATCH", "FI", (2035, 1, 1))
        .self_signed(&key_wrong)
        .unwrap()
        .der()
        .to_vec();

    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Signer FI", "FI", ((2024, 1, 1), (2027, 1, 1)))
        .signed_by(&dsc_key, &issuer_real)
        .unwrap()
        .der()
        .to_vec();

    // Only the wrong-key root is stored.
    let (_, validator) = validator_over(vec![as_cert(&der_wrong, CertType::Csca)], clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;
    assert_eq!(result.trust_chain_message.as_deref(), Some("SIGNATURE_INVALID"));
    assert_eq!(result.validation_status, ValidationStatus::Invalid);
}

#[tokio::test]
async fn expired_leaf_over_valid_chain_is_expired_valid() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-OLD", "IT", (2026, 6, 1));
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);
    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Signer IT", "IT", ((2018, 1, 1), (2021, 1, 1)))
        .signed_by(&dsc_key, &issuer)
        .unwrap()
        .der()
        .to_vec();

    let (_, validator) = validator_over(vec![as_cert(&ca_der, CertType::Csca)], clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;
    assert_eq!(result.validation_status, ValidationStatus::ExpiredValid);
    assert!(result.trust_chain_valid);
    assert!(result.signature_valid);
}

#[tokio::test]
async fn expired_csca_does_not_break_an_unexpired_leaf() {
    // Signatures over an expired CA are still cryptographically valid.
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-RETIRED", "ES", (2025, 1, 1));
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);
    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Signer ES", "ES", ((2024, 1, 1), (2027, 6, 1)))
        .signed_by(&dsc_key, &issuer)
        .unwrap()
        .der()
        .to_vec();

    let (_, validator) = validator_over(vec![as_cert(&ca_der, CertType::Csca)], clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;
    assert_eq!(result.validation_status, ValidationStatus::Valid);
}

#[tokio::test]
async fn future_leaf_is_pending() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-SOON", "PT", (2040, 1, 1));
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);
    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Signer PT", "PT", ((2030, 1, 1), (2033, 1, 1)))
        .signed_by(&dsc_key, &issuer)
        .unwrap()
        .der()
        .to_vec();

    let (_, validator) = validator_over(vec![as_cert(&ca_der, CertType::Csca)], clock_2026()).await;
    let result = validator.validate(&as_cert(&dsc_der, CertType::Dsc)).await;
    assert_eq!(result.validation_status, ValidationStatus::Pending);
}

#[tokio::test]
async fn revoked_serial_forces_invalid() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-REVOKER", "GR", (2035, 1, 1));
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);

    let dsc_key = KeyPair::generate().unwrap();
    let mut params = dsc_params("Signer GR", "GR", ((2024, 1, 1), (2027, 1, 1)));
    params.crl_distribution_points =
        vec![CrlDistributionPoint { uris: vec!["http://pkd.example/gr.crl".into()] }];
    let dsc_der = params.signed_by(&dsc_key, &issuer).unwrap().der().to_vec();
    let dsc = as_cert(&dsc_der, CertType::Dsc);
    assert!(!dsc.crl_distribution_points.is_empty());

    let (store, validator) = validator_over(vec![as_cert(&ca_der, CertType::Csca)], clock_2026()).await;
    store
        .upsert_crl(&Crl {
            id: Uuid::new_v4(),
            fingerprint: "aa".repeat(32),
            country_code: "GR".into(),
            issuer_dn: dsc.issuer_dn.clone(),
            this_update: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            next_update: None,
            crl_number: Some("7".into()),
            revoked: vec![RevokedEntry {
                serial_number: dsc.serial_number.clone(),
                revocation_date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
                reason_code: "keyCompromise".into(),
            }],
            der: vec![0x30],
            stored_in_ldap: false,
            ldap_dn: None,
            upload_id: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let result = validator.validate(&dsc).await;
    assert!(result.crl_checked);
    assert!(result.revoked);
    assert_eq!(result.validation_status, ValidationStatus::Invalid);
    // The chain itself was fine; revocation is what kills it.
    assert!(result.trust_chain_valid);
}

#[tokio::test]
async fn cache_refreshes_only_after_invalidation() {
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params("CSCA-LATE", "CZ", (2035, 1, 1));
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);
    let dsc_key = KeyPair::generate().unwrap();
    let dsc_der = dsc_params("Signer CZ", "CZ", ((2024, 1, 1), (2027, 1, 1)))
        .signed_by(&dsc_key, &issuer)
        .unwrap()
        .der()
        .to_vec();
    let dsc = as_cert(&dsc_der, CertType::Dsc);

    let (store, validator) = validator_over(Vec::new(), clock_2026()).await;
    assert_eq!(
        validator.validate(&dsc).await.trust_chain_message.as_deref(),
        Some("CSCA_NOT_FOUND")
    );

    // CSCA arrives after the cache warmed up empty.
    store.upsert_certificate(&as_cert(&ca_der, CertType::Csca)).await.unwrap();
    assert_eq!(validator.validate(&dsc).await.validation_status, ValidationStatus::Invalid);

    validator.invalidate_cache();
    assert_eq!(validator.validate(&dsc).await.validation_status, ValidationStatus::Valid);
}
