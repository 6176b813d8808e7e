//! Ingestion pipeline and upload orchestration.
//!
//! Per-entry failures are recovered locally: the entry is skipped, counted
//! and reported on the upload's event stream. Only upload-level failures
//! (unreadable input, repository unreachable at start, deadline exceeded)
//! transition the upload to FAILED, and even then partial repository inserts
//! remain authoritative.

#![deny(unsafe_code)]

pub mod classify;
pub mod counters;
pub mod deviation;
pub mod ldif;
pub mod masterlist;
pub mod pipeline;
pub mod upload;

use thiserror::Error;

pub use classify::{classify, ClassifyContext};
pub use counters::UploadCounters;
pub use pipeline::Ingest;
pub use upload::{UploadOrchestrator, UploadOutcome};

/// Upload-level failures. Everything per-entry is handled inside the
/// pipeline and never surfaces here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Repository failure outside the per-entry path.
    #[error("store: {0}")]
    Store(#[from] cert_store::StoreError),
    /// Input could not be decoded at the container level.
    #[error("decode: {0}")]
    Decode(#[from] codec::CodecError),
    /// Background processing exceeded the configured deadline.
    #[error("processing deadline exceeded")]
    Timeout,
}
