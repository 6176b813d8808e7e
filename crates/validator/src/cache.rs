//! In-memory CSCA cache.
//!
//! Keyed by normalized subject DN, multi-valued. Filled once from the
//! repository under a single-flight lock; readers clone an `Arc` snapshot and
//! never contend after the fill. Invalidated whenever a CSCA is inserted or
//! removed.

use crate::chain::{candidate_map, CandidateMap};
use cert_store::{Store, StoreError};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Cache of candidate CSCAs. With caching disabled every snapshot is a fresh
/// repository scan.
pub struct CscaCache {
    enabled: bool,
    map: RwLock<Option<Arc<CandidateMap>>>,
    fill: Mutex<()>,
}

impl CscaCache {
    /// Create a cache; `enabled = false` degrades to scan-per-call.
    pub fn new(enabled: bool) -> Self {
        Self { enabled, map: RwLock::new(None), fill: Mutex::new(()) }
    }

    /// Current snapshot, filling from `store` on miss (single-flight).
    pub async fn snapshot(&self, store: &dyn Store) -> Result<Arc<CandidateMap>, StoreError> {
        if !self.enabled {
            return Ok(Arc::new(candidate_map(store.all_cscas().await?)));
        }
        if let Some(map) = self.map.read().expect("csca cache poisoned").clone() {
            return Ok(map);
        }
        let _fill = self.fill.lock().await;
        // Another task may have filled while this one waited.
        if let Some(map) = self.map.read().expect("csca cache poisoned").clone() {
            return Ok(map);
        }
        let fresh = Arc::new(candidate_map(store.all_cscas().await?));
        debug!(subjects = fresh.len(), "csca cache filled");
        *self.map.write().expect("csca cache poisoned") = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the snapshot; the next read refills.
    pub fn invalidate(&self) {
        *self.map.write().expect("csca cache poisoned") = None;
    }

    /// Whether a snapshot is currently held.
    pub fn is_warm(&self) -> bool {
        self.map.read().expect("csca cache poisoned").is_some()
    }
}
