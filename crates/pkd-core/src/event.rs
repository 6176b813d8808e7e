//! Per-upload progress event vocabulary.

use crate::model::TypeCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event names published on an upload's progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    /// Entry decode started.
    ParsingInProgress,
    /// Entry decode finished.
    ParsingCompleted,
    /// Entry decode failed (entry skipped, upload continues).
    ParsingFailed,
    /// Repository write started.
    DbSavingInProgress,
    /// Repository write finished.
    DbSavingCompleted,
    /// Directory write finished.
    LdapSavingCompleted,
    /// Batched validation progressing.
    ValidationProgress,
    /// Duplicate `(type, fingerprint)` recognized.
    DuplicateDetected,
    /// Upload finished with aggregates recorded.
    UploadCompleted,
    /// Upload failed.
    UploadFailed,
}

/// Severity tag carried with each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Informational.
    Info,
    /// Step succeeded.
    Success,
    /// Step failed.
    Fail,
    /// Degraded (e.g. directory write deferred to reconciliation).
    Warning,
}

/// One progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEvent {
    /// Monotonic per-upload id.
    pub id: u64,
    /// Emission instant.
    pub timestamp: DateTime<Utc>,
    /// Event name.
    pub event_name: EventName,
    /// Free-form detail (entry DN, fingerprint, error text).
    pub detail: String,
    /// Severity.
    pub status: EventStatus,
    /// Running totals at emission time, when applicable.
    pub totals: Option<ProgressTotals>,
}

/// Running totals carried with progress events.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProgressTotals {
    /// Entries seen so far.
    pub total: u64,
    /// Entries fully processed.
    pub processed: u64,
    /// Validations that ended VALID.
    pub valid: u64,
    /// Validations that ended INVALID or ERROR.
    pub invalid: u64,
    /// Validations that ended PENDING.
    pub pending: u64,
    /// Duplicates recognized.
    pub duplicates: u64,
    /// Per-entry failures.
    pub errors: u64,
    /// Insertions by type.
    pub by_type: TypeCounts,
    /// Link-certificate invariant violations observed (recorded, not rejected).
    pub compliance_violations: u64,
}
