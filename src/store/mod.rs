//! Host configuration service seam.
//!
//! The host keeps a local cache per [`Segment`] and pushes a payload-less
//! change event whenever any of them updates, whichever session wrote it.
//! Reads come from that cache and can lag a write by an unspecified delay.

pub mod memory;

use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::model::{Segment, StoredConfigRecord};

pub use memory::MemoryConfigStore;

pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

pub trait ConfigStore: Send + Sync {
    /// Whatever the host currently caches for `segment`.
    fn read(&self, segment: Segment) -> Option<StoredConfigRecord>;

    /// Pass-through to the host; `Ok` does not mean the next read sees it.
    fn write(&self, segment: Segment, version: &str, content: &str) -> Result<(), StoreError>;

    fn on_change(&self, listener: ChangeListener);
}

/// Listener registry for store implementations.
#[derive(Default)]
pub struct ChangeListeners {
    inner: Mutex<Vec<ChangeListener>>,
}

impl ChangeListeners {
    pub fn register(&self, listener: ChangeListener) {
        if let Ok(mut list) = self.inner.lock() {
            list.push(listener);
        }
    }

    /// Fire every listener. The list is cloned first so a listener may
    /// read the store or register another listener.
    pub fn notify(&self) {
        let snapshot: Vec<ChangeListener> = match self.inner.lock() {
            Ok(list) => list.clone(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
