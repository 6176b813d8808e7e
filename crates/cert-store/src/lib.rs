//! Authoritative relational repository for PKD material.
//!
//! The repository is the source of truth; the directory is a projection. All
//! writes are idempotent on the natural key `(type, fingerprint)` — a
//! duplicate insert is an answer, never an error, and concurrent workers are
//! serialized by the underlying unique constraint.
//!
//! DN lookups widen the candidate set with a cheap raw pre-filter and then
//! post-filter by equality of normalized forms; the post-filter is
//! authoritative.

#![deny(unsafe_code)]

pub mod dialect;
pub mod mem;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkd_core::model::{
    Certificate, CertType, CountryCount, Crl, DeviationListRecord, MasterListRecord,
    ReconciliationLog, ReconciliationSummary, SyncStatus, TypeCounts, Upload, UploadStatus,
    ValidationResult,
};
use thiserror::Error;
use uuid::Uuid;

pub use mem::MemStore;
pub use pg::PgStore;

/// Repository errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver failure.
    #[error("db: {0}")]
    Db(#[from] sqlx::Error),
    /// A row did not decode into its domain type.
    #[error("row decode: {0}")]
    Decode(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new row was created.
    Inserted(Uuid),
    /// The natural key already existed; `id` is the prior row.
    Duplicate(Uuid),
}

impl Insertion {
    /// The row id in either case.
    pub fn id(self) -> Uuid {
        match self {
            Insertion::Inserted(id) | Insertion::Duplicate(id) => id,
        }
    }

    /// Whether a new row was created.
    pub fn is_inserted(self) -> bool {
        matches!(self, Insertion::Inserted(_))
    }
}

/// The repository seam. One object implements the whole surface; the
/// pipeline, validator and reconciliation engine each use their slice.
#[async_trait]
pub trait Store: Send + Sync {
    // Certificates -----------------------------------------------------------

    /// Idempotent insert on `(cert_type, fingerprint)`.
    async fn upsert_certificate(&self, cert: &Certificate) -> Result<Insertion>;

    /// Lookup by natural key.
    async fn find_certificate(&self, t: CertType, fingerprint: &str)
        -> Result<Option<Certificate>>;

    /// Every stored CSCA (link certificates included). Cache fill path.
    async fn all_cscas(&self) -> Result<Vec<Certificate>>;

    /// CSCAs whose subject DN equals `dn` under normalization.
    async fn find_all_cscas_by_subject_dn(&self, dn: &str) -> Result<Vec<Certificate>>;

    /// Best CSCA candidate for a child whose issuer DN is `dn`: latest
    /// notAfter wins.
    async fn find_csca_for_issuer(&self, dn: &str) -> Result<Option<Certificate>> {
        let mut all = self.find_all_cscas_by_subject_dn(dn).await?;
        all.sort_by_key(|c| std::cmp::Reverse(c.not_after));
        Ok(all.into_iter().next())
    }

    /// Certificates of `t` not yet projected to the directory, in ascending
    /// insertion order.
    async fn certificates_missing_in_directory(&self, t: CertType) -> Result<Vec<Certificate>>;

    /// Certificates of `t` flagged as projected, in ascending insertion
    /// order. Reconciliation verifies these against the directory so that
    /// `stored_in_ldap = true` keeps implying an existing entry.
    async fn certificates_flagged_in_directory(&self, t: CertType) -> Result<Vec<Certificate>>;

    /// Record a successful directory write.
    async fn mark_certificate_stored(&self, id: Uuid, dn: &str) -> Result<()>;

    /// Remove the certificates exclusively contributed by `upload_id`,
    /// returning them so the caller can drop their directory leaves.
    async fn delete_certificates_for_upload(&self, upload_id: Uuid) -> Result<Vec<Certificate>>;

    // CRLs -------------------------------------------------------------------

    /// Idempotent insert on fingerprint.
    async fn upsert_crl(&self, crl: &Crl) -> Result<Insertion>;

    /// CRLs not yet projected to the directory, ascending insertion order.
    async fn crls_missing_in_directory(&self) -> Result<Vec<Crl>>;

    /// CRLs flagged as projected, ascending insertion order.
    async fn crls_flagged_in_directory(&self) -> Result<Vec<Crl>>;

    /// Record a successful directory write.
    async fn mark_crl_stored(&self, id: Uuid, dn: &str) -> Result<()>;

    /// Most recent CRL (by thisUpdate) whose issuer equals `dn` under
    /// normalization.
    async fn current_crl_for_issuer(&self, dn: &str) -> Result<Option<Crl>>;

    // Uploads ----------------------------------------------------------------

    /// Persist a new upload row (status PROCESSING).
    async fn create_upload(&self, upload: &Upload) -> Result<()>;

    /// Lookup by id.
    async fn find_upload(&self, id: Uuid) -> Result<Option<Upload>>;

    /// Duplicate-file detection by content hash.
    async fn find_upload_by_hash(&self, file_hash: &str) -> Result<Option<Upload>>;

    /// Write back final status and aggregate counts.
    async fn update_upload(&self, upload: &Upload) -> Result<()>;

    /// Fail PROCESSING uploads created before `deadline`. Returns the number
    /// transitioned.
    async fn fail_stale_uploads(&self, deadline: DateTime<Utc>, reason: &str) -> Result<u64>;

    /// Remove an upload row. Certificate removal is the caller's job via
    /// [`Store::delete_certificates_for_upload`].
    async fn delete_upload(&self, id: Uuid) -> Result<()>;

    // Validation -------------------------------------------------------------

    /// Insert or overwrite the result for the certificate it references.
    async fn save_validation_result(&self, result: &ValidationResult) -> Result<()>;

    /// Latest result for a fingerprint.
    async fn find_validation_result(&self, fingerprint: &str) -> Result<Option<ValidationResult>>;

    // Statistics -------------------------------------------------------------

    /// Counts per type, CRLs included.
    async fn count_by_type(&self) -> Result<TypeCounts>;

    /// Counts per country, ordered by country code.
    async fn count_by_country(&self) -> Result<Vec<CountryCount>>;

    // Containers -------------------------------------------------------------

    /// Idempotent insert of a Master List audit row (keyed by fingerprint).
    async fn insert_master_list(&self, record: &MasterListRecord) -> Result<Insertion>;

    /// Idempotent insert of a verbatim Deviation List (keyed by fingerprint).
    async fn insert_deviation_list(&self, record: &DeviationListRecord) -> Result<Insertion>;

    // Reconciliation audit ---------------------------------------------------

    /// Persist a run summary.
    async fn insert_reconciliation_summary(&self, summary: &ReconciliationSummary) -> Result<()>;

    /// Persist per-operation rows.
    async fn insert_reconciliation_logs(&self, logs: &[ReconciliationLog]) -> Result<()>;

    /// Persist a sync snapshot.
    async fn insert_sync_status(&self, status: &SyncStatus) -> Result<()>;

    /// Most recent sync snapshot.
    async fn latest_sync_status(&self) -> Result<Option<SyncStatus>>;
}

/// Shared helper: does `upload` still count as stale PROCESSING?
pub(crate) fn is_stale(upload: &Upload, deadline: DateTime<Utc>) -> bool {
    upload.status == UploadStatus::Processing && upload.created_at < deadline
}
