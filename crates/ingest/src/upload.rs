//! Upload orchestration: file dedup, one background task per upload, a
//! processing deadline, batched validation, terminal status write-back.

use crate::counters::UploadCounters;
use crate::pipeline::Ingest;
use crate::{ClassifyContext, IngestError};
use cert_store::Store;
use codec::{digest, maybe_pem_to_der};
use directory::Directory;
use pkd_core::event::{EventName, EventStatus};
use pkd_core::model::{Upload, UploadFormat, UploadStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Outcome of an upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A new upload row exists and background processing started.
    Started(Uuid),
    /// A prior upload with the same content hash exists; nothing was
    /// re-processed (the HTTP surface maps this to 409).
    Deduplicated(Uuid),
}

impl UploadOutcome {
    /// The referenced upload id.
    pub fn upload_id(self) -> Uuid {
        match self {
            UploadOutcome::Started(id) | UploadOutcome::Deduplicated(id) => id,
        }
    }
}

/// Accepts files and drives their background processing.
pub struct UploadOrchestrator {
    ingest: Arc<Ingest>,
    timeout_ms: u64,
}

impl UploadOrchestrator {
    /// `timeout_ms` mirrors `UPLOAD_TIMEOUT_MS`.
    pub fn new(ingest: Arc<Ingest>, timeout_ms: u64) -> Self {
        Self { ingest, timeout_ms }
    }

    /// Accept a file, dedupe by content hash, schedule background
    /// processing.
    #[instrument(skip_all, fields(file = %file_name))]
    pub async fn upload_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        format: UploadFormat,
    ) -> Result<UploadOutcome, IngestError> {
        let file_hash = digest::sha256_hex(&bytes);
        if let Some(prior) = self.ingest.store().find_upload_by_hash(&file_hash).await? {
            info!(prior = %prior.id, "duplicate file upload");
            return Ok(UploadOutcome::Deduplicated(prior.id));
        }

        let upload = Upload {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            file_hash,
            file_size: bytes.len() as u64,
            format,
            status: UploadStatus::Processing,
            created_at: self.ingest.now(),
            completed_at: None,
            total_entries: 0,
            successful_count: 0,
            duplicate_count: 0,
            error_count: 0,
            inserted: Default::default(),
            duplicates: Default::default(),
            error_message: None,
        };
        self.ingest.store().create_upload(&upload).await?;

        let ingest = Arc::clone(&self.ingest);
        let timeout = Duration::from_millis(self.timeout_ms);
        let id = upload.id;
        tokio::spawn(async move {
            run_upload(ingest, upload, bytes, timeout).await;
        });
        Ok(UploadOutcome::Started(id))
    }

    /// Operator-initiated removal: delete the upload and exactly the
    /// certificates it contributed, dropping their directory leaves too.
    /// Returns the number of certificates removed.
    #[instrument(skip(self))]
    pub async fn delete_upload(&self, upload_id: Uuid) -> Result<u64, IngestError> {
        let removed = self.ingest.store().delete_certificates_for_upload(upload_id).await?;
        let mut dropped_csca = false;
        for cert in &removed {
            dropped_csca |= cert.cert_type == pkd_core::model::CertType::Csca;
            if let Some(dn) = &cert.ldap_dn {
                if let Err(e) = self.ingest.directory.delete_leaf(dn).await {
                    // The repository row is gone; a stale leaf is harmless
                    // and operator-visible, so keep going.
                    tracing::warn!(error = %e, dn, "failed to drop directory leaf");
                }
            }
        }
        self.ingest.store().delete_upload(upload_id).await?;
        if dropped_csca {
            self.ingest.validator().invalidate_cache();
        }
        Ok(removed.len() as u64)
    }

    /// Fail uploads stuck in PROCESSING beyond the deadline (startup sweep
    /// and periodic hygiene). Returns the number transitioned.
    pub async fn expire_stale_uploads(&self) -> Result<u64, IngestError> {
        let deadline = self.ingest.now()
            - chrono::Duration::milliseconds(self.timeout_ms as i64);
        Ok(self
            .ingest
            .store()
            .fail_stale_uploads(deadline, "processing deadline exceeded")
            .await?)
    }
}

async fn run_upload(ingest: Arc<Ingest>, mut upload: Upload, bytes: Vec<u8>, deadline: Duration) {
    let counters = UploadCounters::new();
    let outcome =
        tokio::time::timeout(deadline, process(&ingest, &upload, &bytes, &counters)).await;

    match outcome {
        Ok(Ok(())) => {
            counters.apply_to(&mut upload);
            upload.status = UploadStatus::Completed;
            upload.completed_at = Some(ingest.now());
            if let Err(e) = ingest.store().update_upload(&upload).await {
                error!(error = %e, upload = %upload.id, "failed to finalize upload");
                return;
            }
            ingest.broker().publish(
                upload.id,
                EventName::UploadCompleted,
                EventStatus::Success,
                format!(
                    "{} entries, {} inserted, {} duplicates, {} errors",
                    upload.total_entries,
                    upload.successful_count,
                    upload.duplicate_count,
                    upload.error_count
                ),
                Some(counters.totals()),
            );
        }
        Ok(Err(e)) => {
            fail_upload(&ingest, &mut upload, &counters, e.to_string()).await;
        }
        Err(_) => {
            // Partial repository inserts remain authoritative.
            fail_upload(&ingest, &mut upload, &counters, IngestError::Timeout.to_string()).await;
        }
    }
}

async fn fail_upload(ingest: &Ingest, upload: &mut Upload, counters: &UploadCounters, reason: String) {
    error!(upload = %upload.id, reason = %reason, "upload failed");
    counters.apply_to(upload);
    upload.status = UploadStatus::Failed;
    upload.completed_at = Some(ingest.now());
    upload.error_message = Some(reason.clone());
    if let Err(e) = ingest.store().update_upload(upload).await {
        error!(error = %e, upload = %upload.id, "failed to record upload failure");
    }
    ingest.broker().publish(
        upload.id,
        EventName::UploadFailed,
        EventStatus::Fail,
        reason,
        Some(counters.totals()),
    );
}

async fn process(
    ingest: &Ingest,
    upload: &Upload,
    bytes: &[u8],
    counters: &UploadCounters,
) -> Result<(), IngestError> {
    let pending = match upload.format {
        UploadFormat::Ldif => ingest.process_ldif(upload.id, bytes, counters).await?,
        UploadFormat::Ml => ingest.process_master_list(upload.id, bytes, counters).await?,
        UploadFormat::Cert => {
            let der = maybe_pem_to_der(bytes)?;
            match ingest
                .ingest_certificate_bytes(upload.id, &der, ClassifyContext::default(), counters)
                .await
            {
                Some(cert) => vec![cert],
                None => Vec::new(),
            }
        }
        UploadFormat::Crl => {
            ingest.ingest_crl_bytes(upload.id, bytes, counters).await;
            Vec::new()
        }
        UploadFormat::Dl => {
            ingest.process_deviation_list(upload.id, bytes, counters).await?;
            Vec::new()
        }
    };
    ingest.validate_pending(upload.id, &pending, counters).await;
    Ok(())
}
