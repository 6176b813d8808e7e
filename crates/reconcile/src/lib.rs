//! Reconciliation engine: converge the directory onto the repository.
//!
//! At most one run at a time; scheduled triggers that arrive mid-run
//! coalesce. Items are processed in ascending insertion order and failures
//! never abort the run. Dry-run records every operation without writing.
//! DSC_NC is excluded from reconciliation by policy.

#![deny(unsafe_code)]

use cert_store::{Store, StoreError};
use chrono::Utc;
use directory::{Directory, DirectoryError, Slot};
use pkd_core::config::ReconScope;
use pkd_core::model::{
    CertType, Certificate, Crl, OpStatus, ReconcileOp, ReconciliationLog, ReconciliationSummary,
    RunStatus, SyncStatus,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Engine-level failures. Per-item failures are recorded in logs instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A run is already in flight; this trigger coalesced.
    #[error("reconciliation already running")]
    AlreadyRunning,
    /// Repository failure outside the per-item path.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Directory failure outside the per-item path.
    #[error("directory: {0}")]
    Directory(#[from] DirectoryError),
}

/// One item the run looked at.
enum Item {
    Cert(Certificate),
    Crl(Crl),
}

/// Reconciliation engine.
pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
    directory: Arc<dyn Directory>,
    scope: Vec<ReconScope>,
    lock: Mutex<()>,
}

impl ReconciliationEngine {
    /// Engine over the given stores with the configured scope.
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn Directory>,
        scope: Vec<ReconScope>,
    ) -> Self {
        Self { store, directory, scope, lock: Mutex::new(()) }
    }

    /// Snapshot counts in both stores and persist the result.
    pub async fn snapshot_sync_status(&self) -> Result<SyncStatus, ReconcileError> {
        let status = SyncStatus {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            db_counts: self.store.count_by_type().await?,
            ldap_counts: self.directory.count_by_type().await?,
        };
        self.store.insert_sync_status(&status).await?;
        Ok(status)
    }

    /// Run one reconciliation pass. `dry_run` records what would happen
    /// without writing to the directory or flipping repository flags.
    #[instrument(skip_all, fields(dry_run = dry_run))]
    pub async fn run(&self, dry_run: bool) -> Result<ReconciliationSummary, ReconcileError> {
        let _guard = self.lock.try_lock().map_err(|_| ReconcileError::AlreadyRunning)?;
        let started_at = Utc::now();
        let stopwatch = Instant::now();

        self.snapshot_sync_status().await?;

        // Unprojected rows always need an add. Rows flagged as projected are
        // verified against the directory so a unilateral leaf deletion is
        // repaired too (the flag must keep implying an existing entry); only
        // those whose entry is actually gone become work items.
        let mut items: Vec<Item> = Vec::new();
        for scope in &self.scope {
            match scope {
                ReconScope::Csca => {
                    self.collect_certificates(CertType::Csca, &mut items).await?;
                }
                ReconScope::Dsc => {
                    self.collect_certificates(CertType::Dsc, &mut items).await?;
                }
                ReconScope::Crl => {
                    for crl in self.store.crls_missing_in_directory().await? {
                        items.push(Item::Crl(crl));
                    }
                    for crl in self.store.crls_flagged_in_directory().await? {
                        if !self.directory.entry_exists(&self.directory.crl_dn(&crl)).await? {
                            items.push(Item::Crl(crl));
                        }
                    }
                }
            }
        }

        let summary_id = Uuid::new_v4();
        let mut logs: Vec<ReconciliationLog> = Vec::new();
        let mut summary = ReconciliationSummary {
            id: summary_id,
            started_at,
            finished_at: started_at,
            dry_run,
            total_processed: items.len() as u64,
            success_count: 0,
            failed_count: 0,
            csca_added: 0,
            dsc_added: 0,
            dsc_nc_added: 0,
            crl_added: 0,
            csca_deleted: 0,
            dsc_deleted: 0,
            crl_deleted: 0,
            duration_ms: 0,
            status: RunStatus::Completed,
        };

        for item in items {
            let op_watch = Instant::now();
            let outcome = match &item {
                Item::Cert(cert) => self.repair_certificate(cert, dry_run).await,
                Item::Crl(crl) => self.repair_crl(crl, dry_run).await,
            };
            let (cert_type, country, subject, fingerprint) = match &item {
                Item::Cert(c) => (
                    c.cert_type.as_str().to_string(),
                    c.country_code.clone(),
                    c.subject_dn.clone(),
                    c.fingerprint.clone(),
                ),
                Item::Crl(c) => (
                    "CRL".to_string(),
                    c.country_code.clone(),
                    c.issuer_dn.clone(),
                    c.fingerprint.clone(),
                ),
            };
            match outcome {
                Ok(()) => {
                    summary.success_count += 1;
                    match &item {
                        Item::Cert(c) => match c.cert_type {
                            CertType::Csca => summary.csca_added += 1,
                            CertType::Dsc => summary.dsc_added += 1,
                            // Unreachable by scope construction; counted for
                            // the record if it ever appears.
                            CertType::DscNc => summary.dsc_nc_added += 1,
                            CertType::Mlsc => {}
                        },
                        Item::Crl(_) => summary.crl_added += 1,
                    }
                    logs.push(ReconciliationLog {
                        id: Uuid::new_v4(),
                        summary_id,
                        operation: ReconcileOp::Add,
                        cert_type,
                        country_code: country,
                        subject,
                        fingerprint,
                        status: OpStatus::Success,
                        duration_ms: op_watch.elapsed().as_millis() as u64,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(error = %e, fingerprint = %fingerprint, "reconciliation item failed");
                    summary.failed_count += 1;
                    logs.push(ReconciliationLog {
                        id: Uuid::new_v4(),
                        summary_id,
                        operation: ReconcileOp::Add,
                        cert_type,
                        country_code: country,
                        subject,
                        fingerprint,
                        status: OpStatus::Failed,
                        duration_ms: op_watch.elapsed().as_millis() as u64,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        summary.finished_at = Utc::now();
        summary.duration_ms = stopwatch.elapsed().as_millis() as u64;
        summary.status = if summary.failed_count == 0 {
            RunStatus::Completed
        } else if summary.success_count == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };

        self.store.insert_reconciliation_summary(&summary).await?;
        self.store.insert_reconciliation_logs(&logs).await?;
        info!(
            total = summary.total_processed,
            ok = summary.success_count,
            failed = summary.failed_count,
            status = summary.status.as_str(),
            "reconciliation finished"
        );
        Ok(summary)
    }

    async fn collect_certificates(
        &self,
        t: CertType,
        items: &mut Vec<Item>,
    ) -> Result<(), ReconcileError> {
        for c in self.store.certificates_missing_in_directory(t).await? {
            items.push(Item::Cert(c));
        }
        for c in self.store.certificates_flagged_in_directory(t).await? {
            if !self.directory.entry_exists(&self.directory.certificate_dn(&c)).await? {
                items.push(Item::Cert(c));
            }
        }
        Ok(())
    }

    async fn repair_certificate(
        &self,
        cert: &Certificate,
        dry_run: bool,
    ) -> Result<(), DirectoryOrStore> {
        let dn = self.directory.certificate_dn(cert);
        if self.directory.entry_exists(&dn).await.map_err(DirectoryOrStore::Directory)? {
            // Leaf already present; converge the flag.
            if !dry_run {
                self.store
                    .mark_certificate_stored(cert.id, &dn)
                    .await
                    .map_err(DirectoryOrStore::Store)?;
            }
            return Ok(());
        }
        if dry_run {
            return Ok(());
        }
        let slot = Slot::for_certificate(cert);
        self.directory
            .ensure_container(slot, &cert.country_code)
            .await
            .map_err(DirectoryOrStore::Directory)?;
        let dn = self
            .directory
            .write_certificate(cert)
            .await
            .map_err(DirectoryOrStore::Directory)?;
        self.store.mark_certificate_stored(cert.id, &dn).await.map_err(DirectoryOrStore::Store)?;
        Ok(())
    }

    async fn repair_crl(&self, crl: &Crl, dry_run: bool) -> Result<(), DirectoryOrStore> {
        let dn = self.directory.crl_dn(crl);
        if self.directory.entry_exists(&dn).await.map_err(DirectoryOrStore::Directory)? {
            if !dry_run {
                self.store.mark_crl_stored(crl.id, &dn).await.map_err(DirectoryOrStore::Store)?;
            }
            return Ok(());
        }
        if dry_run {
            return Ok(());
        }
        self.directory
            .ensure_container(Slot::Crl, &crl.country_code)
            .await
            .map_err(DirectoryOrStore::Directory)?;
        let dn = self.directory.write_crl(crl).await.map_err(DirectoryOrStore::Directory)?;
        self.store.mark_crl_stored(crl.id, &dn).await.map_err(DirectoryOrStore::Store)?;
        Ok(())
    }
}

/// Per-item failure carrier.
#[derive(Debug, Error)]
enum DirectoryOrStore {
    #[error("{0}")]
    Directory(DirectoryError),
    #[error("{0}")]
    Store(StoreError),
}
