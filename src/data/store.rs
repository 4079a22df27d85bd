//! Shared soil-data store.
//!
//! The single mutable resource shared with the UI layer. Only the backend
//! bridge writes to it, and only with a complete, validated record set, so
//! readers observe either the previous full set or the new full set.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::data::SoilParameterRecord;

/// Holds the latest complete set of soil parameter records.
pub struct SoilDataStore {
    records: RwLock<Vec<SoilParameterRecord>>,
    last_updated: RwLock<Option<DateTime<Utc>>>,
    update_tx: broadcast::Sender<Vec<SoilParameterRecord>>,
}

impl SoilDataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(16);

        Self {
            records: RwLock::new(Vec::new()),
            last_updated: RwLock::new(None),
            update_tx,
        }
    }

    /// Replace the full record set in one atomic update.
    pub fn replace(&self, records: Vec<SoilParameterRecord>) {
        debug!("Publishing {} soil parameter records", records.len());

        *self.records.write() = records.clone();
        *self.last_updated.write() = Some(Utc::now());

        let _ = self.update_tx.send(records);
    }

    /// Snapshot of the current record set. Empty until the first prediction.
    pub fn snapshot(&self) -> Vec<SoilParameterRecord> {
        self.records.read().clone()
    }

    /// When the store last received a full record set.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read()
    }

    /// Subscribe to full-set replacements.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<SoilParameterRecord>> {
        self.update_tx.subscribe()
    }
}

impl Default for SoilDataStore {
    fn default() -> Self {
        Self::new()
    }
}
