//! Per-upload progress event broker.
//!
//! Single writer (the ingesting task), many readers (SSE subscribers held by
//! the external HTTP surface). Each upload owns a bounded ring of recent
//! events for late subscribers plus a broadcast channel for live fan-out.
//! Event ids are monotonic per upload.

#![deny(unsafe_code)]

use chrono::Utc;
use dashmap::DashMap;
use pkd_core::event::{EventName, EventStatus, ProgressTotals, UploadEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events retained per upload for replay to late subscribers.
pub const RING_CAPACITY: usize = 200;

struct Channel {
    tx: broadcast::Sender<UploadEvent>,
    ring: Mutex<VecDeque<UploadEvent>>,
    next_id: AtomicU64,
}

impl Channel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(RING_CAPACITY);
        Self { tx, ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)), next_id: AtomicU64::new(1) }
    }
}

/// Broker indexed by upload id.
#[derive(Default)]
pub struct UploadEventBroker {
    channels: DashMap<Uuid, Arc<Channel>>,
}

impl UploadEventBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, upload_id: Uuid) -> Arc<Channel> {
        self.channels.entry(upload_id).or_insert_with(|| Arc::new(Channel::new())).clone()
    }

    /// Publish an event on `upload_id`'s stream. Returns the assigned id.
    pub fn publish(
        &self,
        upload_id: Uuid,
        event_name: EventName,
        status: EventStatus,
        detail: impl Into<String>,
        totals: Option<ProgressTotals>,
    ) -> u64 {
        let ch = self.channel(upload_id);
        let id = ch.next_id.fetch_add(1, Ordering::Relaxed);
        let event = UploadEvent {
            id,
            timestamp: Utc::now(),
            event_name,
            detail: detail.into(),
            status,
            totals,
        };
        {
            let mut ring = ch.ring.lock().expect("event ring poisoned");
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        // No live subscribers is fine; the ring still records.
        let _ = ch.tx.send(event);
        id
    }

    /// Subscribe to live events for `upload_id`.
    pub fn subscribe(&self, upload_id: Uuid) -> broadcast::Receiver<UploadEvent> {
        self.channel(upload_id).tx.subscribe()
    }

    /// Retained tail of events for `upload_id`, oldest first.
    pub fn recent(&self, upload_id: Uuid) -> Vec<UploadEvent> {
        match self.channels.get(&upload_id) {
            Some(ch) => ch.ring.lock().expect("event ring poisoned").iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Drop an upload's channel once the upload reaches a terminal state and
    /// all subscribers are gone.
    pub fn close(&self, upload_id: Uuid) {
        self.channels.remove(&upload_id);
    }
}
