//! In-memory repository for tests and local development.
//!
//! Same contract as the SQL-backed store, including duplicate semantics and
//! insertion-order scans. Not intended for production data volumes.

use crate::{is_stale, Insertion, Result, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codec::dn;
use pkd_core::model::{
    CertType, Certificate, CountryCount, Crl, DeviationListRecord, MasterListRecord,
    ReconciliationLog, ReconciliationSummary, SyncStatus, TypeCounts, Upload, UploadStatus,
    ValidationResult,
};
use std::collections::BTreeMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    certs: Vec<Certificate>,
    crls: Vec<Crl>,
    uploads: Vec<Upload>,
    validations: Vec<ValidationResult>,
    master_lists: Vec<MasterListRecord>,
    deviation_lists: Vec<DeviationListRecord>,
    summaries: Vec<ReconciliationSummary>,
    logs: Vec<ReconciliationLog>,
    syncs: Vec<SyncStatus>,
}

/// In-memory store. Cheap to clone via `Arc`.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: flip `stored_in_ldap` directly.
    pub fn set_stored_in_ldap(&self, id: Uuid, stored: bool) {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(c) = g.certs.iter_mut().find(|c| c.id == id) {
            c.stored_in_ldap = stored;
        }
    }

    /// Test hook: recorded reconciliation log rows.
    pub fn reconciliation_logs(&self) -> Vec<ReconciliationLog> {
        self.inner.read().expect("store lock poisoned").logs.clone()
    }

    /// Test hook: recorded sync snapshots.
    pub fn sync_statuses(&self) -> Vec<SyncStatus> {
        self.inner.read().expect("store lock poisoned").syncs.clone()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn upsert_certificate(&self, cert: &Certificate) -> Result<Insertion> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(existing) = g
            .certs
            .iter()
            .find(|c| c.cert_type == cert.cert_type && c.fingerprint == cert.fingerprint)
        {
            return Ok(Insertion::Duplicate(existing.id));
        }
        g.certs.push(cert.clone());
        Ok(Insertion::Inserted(cert.id))
    }

    async fn find_certificate(
        &self,
        t: CertType,
        fingerprint: &str,
    ) -> Result<Option<Certificate>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.certs.iter().find(|c| c.cert_type == t && c.fingerprint == fingerprint).cloned())
    }

    async fn all_cscas(&self) -> Result<Vec<Certificate>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.certs.iter().filter(|c| c.cert_type == CertType::Csca).cloned().collect())
    }

    async fn find_all_cscas_by_subject_dn(&self, target: &str) -> Result<Vec<Certificate>> {
        let wanted = dn::normalize(target);
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.certs
            .iter()
            .filter(|c| c.cert_type == CertType::Csca && dn::normalize(&c.subject_dn) == wanted)
            .cloned()
            .collect())
    }

    async fn certificates_missing_in_directory(&self, t: CertType) -> Result<Vec<Certificate>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.certs.iter().filter(|c| c.cert_type == t && !c.stored_in_ldap).cloned().collect())
    }

    async fn certificates_flagged_in_directory(&self, t: CertType) -> Result<Vec<Certificate>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.certs.iter().filter(|c| c.cert_type == t && c.stored_in_ldap).cloned().collect())
    }

    async fn mark_certificate_stored(&self, id: Uuid, ldap_dn: &str) -> Result<()> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(c) = g.certs.iter_mut().find(|c| c.id == id) {
            c.stored_in_ldap = true;
            c.ldap_dn = Some(ldap_dn.to_string());
        }
        Ok(())
    }

    async fn delete_certificates_for_upload(&self, upload_id: Uuid) -> Result<Vec<Certificate>> {
        let mut g = self.inner.write().expect("store lock poisoned");
        let (removed, kept): (Vec<_>, Vec<_>) =
            g.certs.drain(..).partition(|c| c.upload_id == Some(upload_id));
        g.certs = kept;
        Ok(removed)
    }

    async fn upsert_crl(&self, crl: &Crl) -> Result<Insertion> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(existing) = g.crls.iter().find(|c| c.fingerprint == crl.fingerprint) {
            return Ok(Insertion::Duplicate(existing.id));
        }
        g.crls.push(crl.clone());
        Ok(Insertion::Inserted(crl.id))
    }

    async fn crls_missing_in_directory(&self) -> Result<Vec<Crl>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.crls.iter().filter(|c| !c.stored_in_ldap).cloned().collect())
    }

    async fn crls_flagged_in_directory(&self) -> Result<Vec<Crl>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.crls.iter().filter(|c| c.stored_in_ldap).cloned().collect())
    }

    async fn mark_crl_stored(&self, id: Uuid, ldap_dn: &str) -> Result<()> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(c) = g.crls.iter_mut().find(|c| c.id == id) {
            c.stored_in_ldap = true;
            c.ldap_dn = Some(ldap_dn.to_string());
        }
        Ok(())
    }

    async fn current_crl_for_issuer(&self, target: &str) -> Result<Option<Crl>> {
        let wanted = dn::normalize(target);
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.crls
            .iter()
            .filter(|c| dn::normalize(&c.issuer_dn) == wanted)
            .max_by_key(|c| c.this_update)
            .cloned())
    }

    async fn create_upload(&self, upload: &Upload) -> Result<()> {
        self.inner.write().expect("store lock poisoned").uploads.push(upload.clone());
        Ok(())
    }

    async fn find_upload(&self, id: Uuid) -> Result<Option<Upload>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.uploads.iter().find(|u| u.id == id).cloned())
    }

    async fn find_upload_by_hash(&self, file_hash: &str) -> Result<Option<Upload>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.uploads.iter().find(|u| u.file_hash == file_hash).cloned())
    }

    async fn update_upload(&self, upload: &Upload) -> Result<()> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(u) = g.uploads.iter_mut().find(|u| u.id == upload.id) {
            *u = upload.clone();
        }
        Ok(())
    }

    async fn fail_stale_uploads(&self, deadline: DateTime<Utc>, reason: &str) -> Result<u64> {
        let mut g = self.inner.write().expect("store lock poisoned");
        let mut n = 0;
        for u in g.uploads.iter_mut() {
            if is_stale(u, deadline) {
                u.status = UploadStatus::Failed;
                u.error_message = Some(reason.to_string());
                u.completed_at = Some(Utc::now());
                n += 1;
            }
        }
        Ok(n)
    }

    async fn delete_upload(&self, id: Uuid) -> Result<()> {
        self.inner.write().expect("store lock poisoned").uploads.retain(|u| u.id != id);
        Ok(())
    }

    async fn save_validation_result(&self, result: &ValidationResult) -> Result<()> {
        let mut g = self.inner.write().expect("store lock poisoned");
        g.validations
            .retain(|r| r.certificate_fingerprint != result.certificate_fingerprint);
        g.validations.push(result.clone());
        Ok(())
    }

    async fn find_validation_result(&self, fingerprint: &str) -> Result<Option<ValidationResult>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.validations.iter().find(|r| r.certificate_fingerprint == fingerprint).cloned())
    }

    async fn count_by_type(&self) -> Result<TypeCounts> {
        let g = self.inner.read().expect("store lock poisoned");
        let mut counts = TypeCounts::default();
        for c in &g.certs {
            counts.add(c.cert_type);
        }
        counts.crl = g.crls.len() as u64;
        Ok(counts)
    }

    async fn count_by_country(&self) -> Result<Vec<CountryCount>> {
        let g = self.inner.read().expect("store lock poisoned");
        let mut by_country: BTreeMap<String, TypeCounts> = BTreeMap::new();
        for c in &g.certs {
            by_country.entry(c.country_code.clone()).or_default().add(c.cert_type);
        }
        for crl in &g.crls {
            by_country.entry(crl.country_code.clone()).or_default().crl += 1;
        }
        Ok(by_country
            .into_iter()
            .map(|(country_code, counts)| CountryCount { country_code, counts })
            .collect())
    }

    async fn insert_master_list(&self, record: &MasterListRecord) -> Result<Insertion> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(existing) = g.master_lists.iter().find(|m| m.fingerprint == record.fingerprint)
        {
            return Ok(Insertion::Duplicate(existing.id));
        }
        g.master_lists.push(record.clone());
        Ok(Insertion::Inserted(record.id))
    }

    async fn insert_deviation_list(&self, record: &DeviationListRecord) -> Result<Insertion> {
        let mut g = self.inner.write().expect("store lock poisoned");
        if let Some(existing) =
            g.deviation_lists.iter().find(|d| d.fingerprint == record.fingerprint)
        {
            return Ok(Insertion::Duplicate(existing.id));
        }
        g.deviation_lists.push(record.clone());
        Ok(Insertion::Inserted(record.id))
    }

    async fn insert_reconciliation_summary(&self, summary: &ReconciliationSummary) -> Result<()> {
        self.inner.write().expect("store lock poisoned").summaries.push(summary.clone());
        Ok(())
    }

    async fn insert_reconciliation_logs(&self, logs: &[ReconciliationLog]) -> Result<()> {
        self.inner.write().expect("store lock poisoned").logs.extend_from_slice(logs);
        Ok(())
    }

    async fn insert_sync_status(&self, status: &SyncStatus) -> Result<()> {
        self.inner.write().expect("store lock poisoned").syncs.push(status.clone());
        Ok(())
    }

    async fn latest_sync_status(&self) -> Result<Option<SyncStatus>> {
        let g = self.inner.read().expect("store lock poisoned");
        Ok(g.syncs.last().cloned())
    }
}
