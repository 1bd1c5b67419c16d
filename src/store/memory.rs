use std::collections::HashMap;
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tracing::{debug, warn};

use super::{ChangeListener, ChangeListeners, ConfigStore};
use crate::error::StoreError;
use crate::model::{Segment, StoredConfigRecord};

/// Per-segment limit the host enforces on content.
pub const MAX_CONTENT_LEN: usize = 5 * 1024;

#[derive(Default)]
struct SegmentSlot {
    visible: Option<StoredConfigRecord>,
    // Written but not yet visible, with the number of reads left before it lands.
    pending: Option<(StoredConfigRecord, u32)>,
}

/// In-process configuration store that behaves like the host's cache:
/// size limit, broadcaster-only writes, and optional read-after-write lag.
pub struct MemoryConfigStore {
    slots: Mutex<HashMap<Segment, SegmentSlot>>,
    listeners: ChangeListeners,
    enabled: AtomicBool,
    lag_reads: u32,
    max_content_len: usize,
    writes: AtomicU64,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            listeners: ChangeListeners::default(),
            enabled: AtomicBool::new(true),
            lag_reads: 0,
            max_content_len: MAX_CONTENT_LEN,
            writes: AtomicU64::new(0),
        }
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A write becomes visible only after `reads` further reads of its segment.
    pub fn with_propagation_lag(mut self, reads: u32) -> Self {
        self.lag_reads = reads;
        self
    }

    pub fn with_max_content_len(mut self, max: usize) -> Self {
        self.max_content_len = max;
        self
    }

    /// Models the configuration capability being switched off for the extension.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Install a record as if the host (or another session) already had it.
    pub fn seed(&self, segment: Segment, version: &str, content: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            let slot = slots.entry(segment).or_default();
            slot.visible = Some(StoredConfigRecord {
                segment,
                version: version.to_string(),
                content: content.to_string(),
            });
            slot.pending = None;
        }
        self.listeners.notify();
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn read(&self, segment: Segment) -> Option<StoredConfigRecord> {
        let mut landed = false;
        let out = {
            let mut slots = self.slots.lock().ok()?;
            let slot = slots.entry(segment).or_default();
            if let Some((record, left)) = slot.pending.take() {
                if left == 0 {
                    slot.visible = Some(record);
                    landed = true;
                } else {
                    slot.pending = Some((record, left - 1));
                }
            }
            slot.visible.clone()
        };
        if landed {
            debug!(%segment, "pending write landed");
            self.listeners.notify();
        }
        out
    }

    fn write(&self, segment: Segment, version: &str, content: &str) -> Result<(), StoreError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        if segment != Segment::Broadcaster {
            return Err(StoreError::InvalidSegment(segment));
        }
        if version.trim().is_empty() {
            return Err(StoreError::InvalidVersion);
        }
        if content.len() > self.max_content_len {
            warn!(len = content.len(), max = self.max_content_len, "content over limit");
            return Err(StoreError::ContentTooLarge {
                len: content.len(),
                max: self.max_content_len,
            });
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        let record = StoredConfigRecord {
            segment,
            version: version.to_string(),
            content: content.to_string(),
        };

        let landed = {
            let mut slots = self.slots.lock().map_err(|_| StoreError::Unavailable)?;
            let slot = slots.entry(segment).or_default();
            if self.lag_reads == 0 {
                slot.visible = Some(record);
                slot.pending = None;
                true
            } else {
                // Reads until visible; the one that lands it counts too.
                slot.pending = Some((record, self.lag_reads));
                false
            }
        };
        if landed {
            self.listeners.notify();
        }
        Ok(())
    }

    fn on_change(&self, listener: ChangeListener) {
        self.listeners.register(listener);
    }
}
