//! Deviation List ingestion: the container is stored verbatim, only signer
//! identity is extracted.

use crate::counters::UploadCounters;
use crate::pipeline::Ingest;
use crate::IngestError;
use cert_store::Store;
use chrono::Utc;
use codec::cms_container::parse_deviation_list;
use codec::{digest, dn, x509};
use pkd_core::event::{EventName, EventStatus};
use pkd_core::model::DeviationListRecord;
use tracing::instrument;
use uuid::Uuid;

impl Ingest {
    /// Process one CMS Deviation List container.
    #[instrument(skip_all, fields(upload = %upload_id))]
    pub async fn process_deviation_list(
        &self,
        upload_id: Uuid,
        bytes: &[u8],
        counters: &UploadCounters,
    ) -> Result<(), IngestError> {
        counters.begin_entry();
        let content = match parse_deviation_list(bytes) {
            Ok(content) => content,
            Err(e) => {
                counters.error();
                self.emit(
                    upload_id,
                    EventName::ParsingFailed,
                    EventStatus::Fail,
                    e.to_string(),
                    counters,
                );
                return Ok(());
            }
        };

        let signer_subject = content
            .signer_certs
            .first()
            .and_then(|der| x509::parse_certificate(der).ok())
            .map(|info| info.subject_dn)
            .unwrap_or_default();
        let record = DeviationListRecord {
            id: Uuid::new_v4(),
            country_code: dn::extract_country(&signer_subject).unwrap_or_else(|| "XX".to_string()),
            signer_subject_dn: signer_subject,
            fingerprint: digest::sha256_hex(bytes),
            der: bytes.to_vec(),
            upload_id: Some(upload_id),
            created_at: Utc::now(),
        };
        let insertion = self.store.insert_deviation_list(&record).await?;
        if insertion.is_inserted() {
            counters.inserted_other();
            self.emit(
                upload_id,
                EventName::DbSavingCompleted,
                EventStatus::Success,
                record.fingerprint.clone(),
                counters,
            );
        } else {
            counters.duplicate_other();
            self.emit(
                upload_id,
                EventName::DuplicateDetected,
                EventStatus::Warning,
                record.fingerprint.clone(),
                counters,
            );
        }
        Ok(())
    }
}
