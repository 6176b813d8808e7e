//! Master List ingestion: CMS signers become MLSC, embedded certificates
//! become CSCA or link certificates.

use crate::classify::ClassifyContext;
use crate::counters::UploadCounters;
use crate::pipeline::Ingest;
use crate::IngestError;
use cert_store::Store;
use chrono::Utc;
use codec::cms_container::parse_master_list;
use codec::{digest, dn, x509};
use pkd_core::event::{EventName, EventStatus};
use pkd_core::model::{Certificate, MasterListRecord};
use tracing::instrument;
use uuid::Uuid;

impl Ingest {
    /// Process one CMS Master List container.
    #[instrument(skip_all, fields(upload = %upload_id))]
    pub async fn process_master_list(
        &self,
        upload_id: Uuid,
        bytes: &[u8],
        counters: &UploadCounters,
    ) -> Result<Vec<Certificate>, IngestError> {
        let content = match parse_master_list(bytes) {
            Ok(content) => content,
            Err(e) => {
                counters.begin_entry();
                counters.error();
                self.emit(
                    upload_id,
                    EventName::ParsingFailed,
                    EventStatus::Fail,
                    e.to_string(),
                    counters,
                );
                return Ok(Vec::new());
            }
        };

        // Signer identity for the audit row, taken from the first signer.
        let signer_subject = content
            .signer_certs
            .first()
            .and_then(|der| x509::parse_certificate(der).ok())
            .map(|info| info.subject_dn)
            .unwrap_or_default();
        let country = dn::extract_country(&signer_subject).unwrap_or_else(|| "XX".to_string());

        let record = MasterListRecord {
            id: Uuid::new_v4(),
            country_code: country,
            signer_subject_dn: signer_subject,
            cert_count: content.csca_certs.len() as u64,
            fingerprint: digest::sha256_hex(bytes),
            upload_id: Some(upload_id),
            created_at: Utc::now(),
        };
        self.store.insert_master_list(&record).await?;

        let mut pending = Vec::new();
        for der in &content.signer_certs {
            if let Some(cert) = self
                .ingest_certificate_bytes(
                    upload_id,
                    der,
                    ClassifyContext::master_list_signer(),
                    counters,
                )
                .await
            {
                pending.push(cert);
            }
        }
        for der in &content.csca_certs {
            if let Some(cert) = self
                .ingest_certificate_bytes(upload_id, der, ClassifyContext::default(), counters)
                .await
            {
                pending.push(cert);
            }
        }
        Ok(pending)
    }
}
