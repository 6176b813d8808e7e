//! Per-upload running counters.
//!
//! Atomic so the ingesting task can tally while event snapshots are taken
//! concurrently. The invariant `errors + success + duplicates == total` holds
//! over attempted entries; unrecognized-but-well-formed entries are tracked
//! separately as skips.

use pkd_core::event::ProgressTotals;
use pkd_core::model::{CertType, TypeCounts, Upload, ValidationStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counter set for one upload.
#[derive(Debug, Default)]
pub struct UploadCounters {
    total: AtomicU64,
    success: AtomicU64,
    duplicates: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    valid: AtomicU64,
    invalid: AtomicU64,
    pending: AtomicU64,
    compliance_violations: AtomicU64,
    inserted: Mutex<TypeCounts>,
    duplicate_types: Mutex<TypeCounts>,
}

impl UploadCounters {
    /// Fresh counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry yielded an insertion attempt.
    pub fn begin_entry(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Entry inserted as `t`.
    pub fn inserted(&self, t: CertType) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.inserted.lock().expect("counters poisoned").add(t);
    }

    /// A CRL was inserted.
    pub fn inserted_crl(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.inserted.lock().expect("counters poisoned").crl += 1;
    }

    /// A non-certificate item (deviation list) was inserted.
    pub fn inserted_other(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    /// Entry recognized as a duplicate of `t`.
    pub fn duplicate(&self, t: CertType) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
        self.duplicate_types.lock().expect("counters poisoned").add(t);
    }

    /// Duplicate CRL.
    pub fn duplicate_crl(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
        self.duplicate_types.lock().expect("counters poisoned").crl += 1;
    }

    /// Duplicate non-certificate item.
    pub fn duplicate_other(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Entry failed locally.
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Well-formed entry with nothing to ingest.
    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Link-certificate invariant violation observed.
    pub fn compliance_violation(&self) {
        self.compliance_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Tally one validation outcome.
    pub fn validation(&self, status: ValidationStatus) {
        match status {
            ValidationStatus::Valid | ValidationStatus::ExpiredValid => {
                self.valid.fetch_add(1, Ordering::Relaxed);
            }
            ValidationStatus::Pending => {
                self.pending.fetch_add(1, Ordering::Relaxed);
            }
            ValidationStatus::Invalid | ValidationStatus::Error => {
                self.invalid.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Snapshot for progress events.
    pub fn totals(&self) -> ProgressTotals {
        let success = self.success.load(Ordering::Relaxed);
        let duplicates = self.duplicates.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        ProgressTotals {
            total: self.total.load(Ordering::Relaxed),
            processed: success + duplicates + errors,
            valid: self.valid.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            duplicates,
            errors,
            by_type: *self.inserted.lock().expect("counters poisoned"),
            compliance_violations: self.compliance_violations.load(Ordering::Relaxed),
        }
    }

    /// Write the final aggregates into the upload row.
    pub fn apply_to(&self, upload: &mut Upload) {
        upload.total_entries = self.total.load(Ordering::Relaxed);
        upload.successful_count = self.success.load(Ordering::Relaxed);
        upload.duplicate_count = self.duplicates.load(Ordering::Relaxed);
        upload.error_count = self.errors.load(Ordering::Relaxed);
        upload.inserted = *self.inserted.lock().expect("counters poisoned");
        upload.duplicates = *self.duplicate_types.lock().expect("counters poisoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_over_attempted_entries() {
        let c = UploadCounters::new();
        for _ in 0..5 {
            c.begin_entry();
        }
        c.inserted(CertType::Csca);
        c.inserted(CertType::Dsc);
        c.duplicate(CertType::Dsc);
        c.error();
        c.inserted_crl();
        let t = c.totals();
        assert_eq!(t.total, 5);
        assert_eq!(t.errors + t.duplicates + (t.by_type.total()), 5);
        assert_eq!(t.processed, t.total);
    }

    #[test]
    fn validation_tallies() {
        let c = UploadCounters::new();
        c.validation(ValidationStatus::Valid);
        c.validation(ValidationStatus::ExpiredValid);
        c.validation(ValidationStatus::Pending);
        c.validation(ValidationStatus::Invalid);
        c.validation(ValidationStatus::Error);
        let t = c.totals();
        assert_eq!((t.valid, t.pending, t.invalid), (2, 1, 2));
    }
}
