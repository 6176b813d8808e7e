//! Per-entry ingestion pipeline.
//!
//! decode → fingerprint → parse → classify → repository upsert → directory
//! write → mark → queue validation → audit event. Exactly one repository
//! insertion attempt and at most one directory insertion attempt per entry.

use crate::classify::{classify, ClassifyContext};
use crate::counters::UploadCounters;
use cert_store::Store;
use codec::x509::parse_certificate;
use directory::{Directory, Slot};
use event_stream::UploadEventBroker;
use pkd_core::clock::Clock;
use pkd_core::event::{EventName, EventStatus};
use pkd_core::model::{CertType, Certificate};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::TrustValidator;

/// Shared ingestion context.
pub struct Ingest {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) broker: Arc<UploadEventBroker>,
    pub(crate) validator: Arc<TrustValidator>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Ingest {
    /// Wire the pipeline to its collaborators.
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn Directory>,
        broker: Arc<UploadEventBroker>,
        validator: Arc<TrustValidator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, directory, broker, validator, clock }
    }

    /// The repository in use.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The event broker in use.
    pub fn broker(&self) -> &Arc<UploadEventBroker> {
        &self.broker
    }

    /// The validator in use.
    pub fn validator(&self) -> &Arc<TrustValidator> {
        &self.validator
    }

    pub(crate) fn emit(
        &self,
        upload_id: Uuid,
        name: EventName,
        status: EventStatus,
        detail: impl Into<String>,
        counters: &UploadCounters,
    ) {
        self.broker.publish(upload_id, name, status, detail, Some(counters.totals()));
    }

    /// Ingest one certificate blob. Returns the stored certificate when it
    /// was newly inserted and should be queued for validation.
    pub async fn ingest_certificate_bytes(
        &self,
        upload_id: Uuid,
        der: &[u8],
        ctx: ClassifyContext,
        counters: &UploadCounters,
    ) -> Option<Certificate> {
        counters.begin_entry();
        self.emit(
            upload_id,
            EventName::ParsingInProgress,
            EventStatus::Info,
            format!("certificate, {} bytes", der.len()),
            counters,
        );

        let info = match parse_certificate(der) {
            Ok(info) => info,
            Err(e) => {
                counters.error();
                self.emit(
                    upload_id,
                    EventName::ParsingFailed,
                    EventStatus::Fail,
                    e.to_string(),
                    counters,
                );
                return None;
            }
        };
        let cert_type = classify(&info, ctx);
        let cert = info.into_certificate(cert_type, Some(upload_id));
        self.emit(
            upload_id,
            EventName::ParsingCompleted,
            EventStatus::Success,
            format!("{} {}", cert_type, cert.subject_dn),
            counters,
        );

        if cert.country_code == "XX" {
            // Neither subject nor issuer carried a country; stored under XX
            // for operator review.
            warn!(fingerprint = %cert.fingerprint, "country code unresolved, storing under XX");
        }
        if cert.is_link_certificate() {
            self.check_link_invariant(&cert, counters).await;
        }

        self.emit(
            upload_id,
            EventName::DbSavingInProgress,
            EventStatus::Info,
            cert.fingerprint.clone(),
            counters,
        );
        let insertion = match self.store.upsert_certificate(&cert).await {
            Ok(insertion) => insertion,
            Err(e) => {
                counters.error();
                warn!(error = %e, fingerprint = %cert.fingerprint, "repository insert failed");
                self.emit(
                    upload_id,
                    EventName::DbSavingCompleted,
                    EventStatus::Fail,
                    e.to_string(),
                    counters,
                );
                return None;
            }
        };

        if !insertion.is_inserted() {
            counters.duplicate(cert_type);
            self.emit(
                upload_id,
                EventName::DuplicateDetected,
                EventStatus::Warning,
                cert.fingerprint.clone(),
                counters,
            );
            return None;
        }
        counters.inserted(cert_type);
        self.emit(
            upload_id,
            EventName::DbSavingCompleted,
            EventStatus::Success,
            cert.fingerprint.clone(),
            counters,
        );
        if cert_type == CertType::Csca {
            self.validator.invalidate_cache();
        }

        self.project_certificate(upload_id, &cert, counters).await;
        Some(cert)
    }

    /// Directory projection; failures leave `stored_in_ldap = false` for
    /// reconciliation and never fail the entry.
    async fn project_certificate(
        &self,
        upload_id: Uuid,
        cert: &Certificate,
        counters: &UploadCounters,
    ) {
        let slot = Slot::for_certificate(cert);
        let write = async {
            self.directory.ensure_container(slot, &cert.country_code).await?;
            self.directory.write_certificate(cert).await
        };
        match write.await {
            Ok(dn) => {
                if let Err(e) = self.store.mark_certificate_stored(cert.id, &dn).await {
                    warn!(error = %e, "failed to record directory dn");
                    return;
                }
                self.emit(
                    upload_id,
                    EventName::LdapSavingCompleted,
                    EventStatus::Success,
                    dn,
                    counters,
                );
            }
            Err(e) => {
                warn!(error = %e, fingerprint = %cert.fingerprint, "directory write deferred");
                self.emit(
                    upload_id,
                    EventName::LdapSavingCompleted,
                    EventStatus::Warning,
                    format!("deferred to reconciliation: {e}"),
                    counters,
                );
            }
        }
    }

    /// Ingest one CRL blob.
    pub async fn ingest_crl_bytes(
        &self,
        upload_id: Uuid,
        der: &[u8],
        counters: &UploadCounters,
    ) {
        counters.begin_entry();
        self.emit(
            upload_id,
            EventName::ParsingInProgress,
            EventStatus::Info,
            format!("crl, {} bytes", der.len()),
            counters,
        );
        let crl = match codec::crl::parse_crl(der, Some(upload_id)) {
            Ok(crl) => crl,
            Err(e) => {
                counters.error();
                self.emit(
                    upload_id,
                    EventName::ParsingFailed,
                    EventStatus::Fail,
                    e.to_string(),
                    counters,
                );
                return;
            }
        };
        self.emit(
            upload_id,
            EventName::ParsingCompleted,
            EventStatus::Success,
            format!("CRL {}", crl.issuer_dn),
            counters,
        );

        let insertion = match self.store.upsert_crl(&crl).await {
            Ok(insertion) => insertion,
            Err(e) => {
                counters.error();
                warn!(error = %e, "crl insert failed");
                self.emit(
                    upload_id,
                    EventName::DbSavingCompleted,
                    EventStatus::Fail,
                    e.to_string(),
                    counters,
                );
                return;
            }
        };
        if !insertion.is_inserted() {
            counters.duplicate_crl();
            self.emit(
                upload_id,
                EventName::DuplicateDetected,
                EventStatus::Warning,
                crl.fingerprint.clone(),
                counters,
            );
            return;
        }
        counters.inserted_crl();
        self.emit(
            upload_id,
            EventName::DbSavingCompleted,
            EventStatus::Success,
            crl.fingerprint.clone(),
            counters,
        );

        let write = async {
            self.directory.ensure_container(Slot::Crl, &crl.country_code).await?;
            self.directory.write_crl(&crl).await
        };
        match write.await {
            Ok(dn) => {
                if let Err(e) = self.store.mark_crl_stored(crl.id, &dn).await {
                    warn!(error = %e, "failed to record crl directory dn");
                    return;
                }
                self.emit(
                    upload_id,
                    EventName::LdapSavingCompleted,
                    EventStatus::Success,
                    dn,
                    counters,
                );
            }
            Err(e) => {
                warn!(error = %e, "crl directory write deferred");
                self.emit(
                    upload_id,
                    EventName::LdapSavingCompleted,
                    EventStatus::Warning,
                    format!("deferred to reconciliation: {e}"),
                    counters,
                );
            }
        }
    }

    /// Link-certificate invariant: both endpoints of the bridge should exist
    /// as self-signed CSCAs. Violations are recorded, never rejected.
    async fn check_link_invariant(&self, cert: &Certificate, counters: &UploadCounters) {
        let issuer_ok = match self.store.find_all_cscas_by_subject_dn(&cert.issuer_dn).await {
            Ok(list) => list.iter().any(|c| c.is_self_signed),
            Err(_) => false,
        };
        let subject_ok = match self.store.find_all_cscas_by_subject_dn(&cert.subject_dn).await {
            Ok(list) => list.iter().any(|c| c.is_self_signed),
            Err(_) => false,
        };
        if !issuer_ok || !subject_ok {
            counters.compliance_violation();
            debug!(
                fingerprint = %cert.fingerprint,
                issuer_ok, subject_ok,
                "link certificate endpoints not (yet) self-signed CSCAs in store"
            );
        }
    }

    /// Batched validation of newly inserted signers. Runs after bulk
    /// ingestion so the CSCA cache fills once. MLSCs are not chain-validated.
    pub async fn validate_pending(
        &self,
        upload_id: Uuid,
        pending: &[Certificate],
        counters: &UploadCounters,
    ) {
        let pending: Vec<&Certificate> =
            pending.iter().filter(|c| c.cert_type != CertType::Mlsc).collect();
        for (i, cert) in pending.iter().enumerate() {
            let result = self.validator.validate(cert).await;
            counters.validation(result.validation_status);
            self.emit(
                upload_id,
                EventName::ValidationProgress,
                match result.validation_status {
                    pkd_core::model::ValidationStatus::Valid => EventStatus::Success,
                    pkd_core::model::ValidationStatus::Pending => EventStatus::Info,
                    _ => EventStatus::Warning,
                },
                format!(
                    "{}/{} {} {}",
                    i + 1,
                    pending.len(),
                    cert.fingerprint,
                    result.validation_status
                ),
                counters,
            );
        }
    }

    /// The clock used for upload bookkeeping.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
