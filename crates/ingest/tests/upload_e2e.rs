//! End-to-end upload scenarios over the in-memory store and directory.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cert_store::{MemStore, Store};
use chrono::{TimeZone, Utc};
use codec::digest;
use directory::{DitLayout, MemDirectory};
use event_stream::UploadEventBroker;
use ingest::{Ingest, UploadOrchestrator, UploadOutcome};
use pkd_core::clock::ManualClock;
use pkd_core::event::EventName;
use pkd_core::model::{CertType, Upload, UploadFormat, UploadStatus, ValidationStatus};
use rcgen::{date_time_ymd, BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::TrustValidator;

struct Harness {
    store: Arc<MemStore>,
    directory: Arc<MemDirectory>,
    broker: Arc<UploadEventBroker>,
    orchestrator: UploadOrchestrator,
}

fn harness() -> Harness {
    // Only the first harness in the process wins the subscriber slot.
    let _ = telemetry::init_plain_logging();
    let store: Arc<MemStore> = Arc::new(MemStore::new());
    let directory = Arc::new(MemDirectory::new(DitLayout::new("dc=pkd,dc=example", false)));
    let broker = Arc::new(UploadEventBroker::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let validator =
        Arc::new(TrustValidator::new(store.clone() as Arc<dyn Store>, clock.clone(), true));
    let ingest = Arc::new(Ingest::new(
        store.clone(),
        directory.clone(),
        broker.clone(),
        validator,
        clock,
    ));
    Harness {
        store,
        directory,
        broker,
        orchestrator: UploadOrchestrator::new(ingest, 30_000),
    }
}

fn korea_ldif() -> (Vec<u8>, Vec<u8>, String) {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca = CertificateParams::new(Vec::new()).unwrap();
    ca.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca.distinguished_name.push(DnType::CountryName, "KR");
    ca.distinguished_name.push(DnType::CommonName, "CSCA-KOREA");
    ca.not_before = date_time_ymd(2019, 1, 1);
    ca.not_after = date_time_ymd(2035, 1, 1);
    let ca_der = ca.self_signed(&ca_key).unwrap().der().to_vec();
    let issuer = Issuer::new(ca, ca_key);

    let dsc_key = KeyPair::generate().unwrap();
    let mut dsc = CertificateParams::new(Vec::new()).unwrap();
    dsc.distinguished_name.push(DnType::CountryName, "KR");
    dsc.distinguished_name.push(DnType::CommonName, "Document Signer 1");
    dsc.not_before = date_time_ymd(2024, 1, 1);
    dsc.not_after = date_time_ymd(2027, 1, 1);
    let dsc_der = dsc.signed_by(&dsc_key, &issuer).unwrap().der().to_vec();

    let ldif = format!(
        "version: 1\n\
         # ICAO PKD extract\n\
         dn: cn=csca,o=csca,c=KR,dc=data,dc=download,dc=pkd,dc=example\n\
         cACertificate;binary:: {}\n\
         \n\
         dn: cn=dsc,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=example\n\
         userCertificate;binary:: {}\n",
        STANDARD.encode(&ca_der),
        STANDARD.encode(&dsc_der),
    );
    (ca_der, dsc_der, ldif)
}

async fn wait_done(store: &MemStore, id: Uuid) -> Upload {
    for _ in 0..500 {
        if let Some(u) = store.find_upload(id).await.unwrap() {
            if u.status != UploadStatus::Processing {
                return u;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("upload {id} never left PROCESSING");
}

#[tokio::test(flavor = "multi_thread")]
async fn ldif_with_csca_and_dsc_completes_and_validates() {
    let h = harness();
    let (ca_der, dsc_der, ldif) = korea_ldif();

    let outcome = h
        .orchestrator
        .upload_file("kr.ldif", ldif.clone().into_bytes(), UploadFormat::Ldif)
        .await
        .unwrap();
    let UploadOutcome::Started(id) = outcome else { panic!("expected a fresh upload") };
    let upload = wait_done(&h.store, id).await;

    assert_eq!(upload.status, UploadStatus::Completed);
    assert_eq!(upload.total_entries, 2);
    assert_eq!(upload.successful_count, 2);
    assert_eq!(upload.duplicate_count, 0);
    assert_eq!(upload.error_count, 0);
    assert_eq!(upload.inserted.csca, 1);
    assert_eq!(upload.inserted.dsc, 1);

    // The DSC chains to the CSCA uploaded in the same file.
    let dsc_fp = digest::sha256_hex(&dsc_der);
    let result = h.store.find_validation_result(&dsc_fp).await.unwrap().unwrap();
    assert_eq!(result.validation_status, ValidationStatus::Valid);
    assert_eq!(result.chain_path_string(), "Document Signer 1 → CSCA-KOREA");

    // Both leaves were projected and flagged.
    let csca = h
        .store
        .find_certificate(CertType::Csca, &digest::sha256_hex(&ca_der))
        .await
        .unwrap()
        .unwrap();
    assert!(csca.stored_in_ldap);
    assert!(h.directory.contains(csca.ldap_dn.as_deref().unwrap()));

    // Event stream saw the lifecycle in order, ending with completion.
    let events = h.broker.recent(id);
    assert_eq!(events.first().unwrap().event_name, EventName::ParsingInProgress);
    assert_eq!(events.last().unwrap().event_name, EventName::UploadCompleted);
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_file_is_deduplicated_and_nothing_changes() {
    let h = harness();
    let (_, _, ldif) = korea_ldif();
    let bytes = ldif.into_bytes();

    let first = h
        .orchestrator
        .upload_file("kr.ldif", bytes.clone(), UploadFormat::Ldif)
        .await
        .unwrap();
    let id = first.upload_id();
    wait_done(&h.store, id).await;
    let counts_before = h.store.count_by_type().await.unwrap();

    let second =
        h.orchestrator.upload_file("kr-again.ldif", bytes, UploadFormat::Ldif).await.unwrap();
    assert_eq!(second, UploadOutcome::Deduplicated(id));
    assert_eq!(h.store.count_by_type().await.unwrap(), counts_before);
}

#[tokio::test(flavor = "multi_thread")]
async fn nc_data_entries_classify_as_dsc_nc() {
    let h = harness();
    let ca_key = KeyPair::generate().unwrap();
    let mut ca = CertificateParams::new(Vec::new()).unwrap();
    ca.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca.distinguished_name.push(DnType::CountryName, "SG");
    ca.distinguished_name.push(DnType::CommonName, "CSCA-SG");
    ca.not_before = date_time_ymd(2019, 1, 1);
    ca.not_after = date_time_ymd(2035, 1, 1);
    let issuer = Issuer::new(ca, ca_key);
    let key = KeyPair::generate().unwrap();
    let mut nc = CertificateParams::new(Vec::new()).unwrap();
    nc.distinguished_name.push(DnType::CountryName, "SG");
    nc.distinguished_name.push(DnType::CommonName, "Legacy Signer");
    nc.not_before = date_time_ymd(2024, 1, 1);
    nc.not_after = date_time_ymd(2027, 1, 1);
    let nc_der = nc.signed_by(&key, &issuer).unwrap().der().to_vec();

    let ldif = format!(
        "dn: cn=legacy,o=dsc,c=SG,dc=nc-data,dc=download,dc=pkd,dc=example\n\
         userCertificate;binary:: {}\n",
        STANDARD.encode(&nc_der)
    );
    let id = h
        .orchestrator
        .upload_file("nc.ldif", ldif.into_bytes(), UploadFormat::Ldif)
        .await
        .unwrap()
        .upload_id();
    let upload = wait_done(&h.store, id).await;

    assert_eq!(upload.inserted.dsc_nc, 1);
    let cert = h
        .store
        .find_certificate(CertType::DscNc, &digest::sha256_hex(&nc_der))
        .await
        .unwrap()
        .unwrap();
    // Projected under the non-conformant data container.
    assert!(cert.ldap_dn.unwrap().contains("dc=nc-data"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unrecognized_entries_are_skipped_and_bad_values_counted() {
    let h = harness();
    let ldif = "\
dn: c=KR,dc=data,dc=download,dc=pkd,dc=example
objectClass: country

dn: cn=broken,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=example
userCertificate;binary:: aGVsbG8gd29ybGQ=
";
    let id = h
        .orchestrator
        .upload_file("mixed.ldif", ldif.as_bytes().to_vec(), UploadFormat::Ldif)
        .await
        .unwrap()
        .upload_id();
    let upload = wait_done(&h.store, id).await;

    // The container entry is skipped (not an error); the garbage certificate
    // is a local failure. The upload itself still completes.
    assert_eq!(upload.status, UploadStatus::Completed);
    assert_eq!(upload.total_entries, 1);
    assert_eq!(upload.error_count, 1);
    assert_eq!(upload.successful_count, 0);
    assert!(h
        .broker
        .recent(id)
        .iter()
        .any(|e| e.event_name == EventName::ParsingFailed));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_certificate_upload_accepts_pem() {
    let h = harness();
    let key = KeyPair::generate().unwrap();
    let mut ca = CertificateParams::new(Vec::new()).unwrap();
    ca.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca.distinguished_name.push(DnType::CountryName, "JP");
    ca.distinguished_name.push(DnType::CommonName, "CSCA-JAPAN");
    ca.not_before = date_time_ymd(2019, 1, 1);
    ca.not_after = date_time_ymd(2035, 1, 1);
    let cert = ca.self_signed(&key).unwrap();
    let der = cert.der().to_vec();
    let pem = cert.pem();

    let id = h
        .orchestrator
        .upload_file("csca-jp.pem", pem.into_bytes(), UploadFormat::Cert)
        .await
        .unwrap()
        .upload_id();
    let upload = wait_done(&h.store, id).await;
    assert_eq!(upload.successful_count, 1);

    // Fingerprint is over the DER, not the PEM wrapper.
    let fp = digest::sha256_hex(&der);
    assert!(h.store.find_certificate(CertType::Csca, &fp).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_an_upload_cascades_to_its_leaves() {
    let h = harness();
    let (ca_der, dsc_der, ldif) = korea_ldif();
    let id = h
        .orchestrator
        .upload_file("kr.ldif", ldif.into_bytes(), UploadFormat::Ldif)
        .await
        .unwrap()
        .upload_id();
    wait_done(&h.store, id).await;

    let csca_fp = digest::sha256_hex(&ca_der);
    let leaf_dn = h
        .store
        .find_certificate(CertType::Csca, &csca_fp)
        .await
        .unwrap()
        .unwrap()
        .ldap_dn
        .unwrap();
    assert!(h.directory.contains(&leaf_dn));

    let removed = h.orchestrator.delete_upload(id).await.unwrap();
    assert_eq!(removed, 2);
    assert!(h.store.find_certificate(CertType::Csca, &csca_fp).await.unwrap().is_none());
    assert!(h
        .store
        .find_certificate(CertType::Dsc, &digest::sha256_hex(&dsc_der))
        .await
        .unwrap()
        .is_none());
    assert!(!h.directory.contains(&leaf_dn));
    assert!(h.store.find_upload(id).await.unwrap().is_none());
}
