//! Write ordering for node content
//!
//! Provides per-node locking so that writes to the same node complete in the
//! order they were submitted. Writes to different nodes never wait on each other.

use crate::types::NodeId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Per-node FIFO write lock manager
///
/// Waiters on a node lock are served in arrival order (tokio's mutex is fair),
/// so a write can never finish after, and overwrite, one submitted later.
#[derive(Default)]
pub struct WriteOrdering {
    /// Map from node id to its lock
    locks: Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one write; releases the node on drop.
pub struct WriteTicket {
    _guard: OwnedMutexGuard<()>,
}

impl WriteOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.locks.lock();
        // Drop locks nobody holds or waits on.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Queue behind writes for `id` that started waiting earlier.
    pub async fn acquire(&self, id: &str) -> WriteTicket {
        let lock = self.node_lock(id);
        WriteTicket {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of nodes with a live lock.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
