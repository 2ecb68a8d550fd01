//! Debounced content saves
//!
//! Bursts of edits to one node collapse into a single router write issued after
//! a quiet period. Only the newest content scheduled for an id is ever written.

use crate::error::StorageError;
use crate::node::Node;
use crate::router::StorageRouter;
use crate::types::NodeId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct PendingSave {
    content: String,
    generation: u64,
}

#[derive(Default)]
struct Pending {
    saves: HashMap<NodeId, PendingSave>,
    next_generation: u64,
}

/// Per-node save debouncer in front of [`StorageRouter::write`]
pub struct SaveDebouncer {
    router: Arc<StorageRouter>,
    quiet: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl SaveDebouncer {
    pub fn new(router: Arc<StorageRouter>, quiet: Duration) -> Self {
        Self {
            router,
            quiet,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Replace any pending save for `id` and restart its quiet period.
    ///
    /// Must be called inside a tokio runtime.
    pub fn schedule(&self, id: &str, content: impl Into<String>) {
        let generation = {
            let mut pending = self.pending.lock();
            pending.next_generation += 1;
            let generation = pending.next_generation;
            pending.saves.insert(
                id.to_string(),
                PendingSave {
                    content: content.into(),
                    generation,
                },
            );
            generation
        };

        let router = self.router.clone();
        let pending = self.pending.clone();
        let quiet = self.quiet;
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let content = {
                let mut pending = pending.lock();
                match pending.saves.get(&id) {
                    Some(save) if save.generation == generation => {
                        pending.saves.remove(&id).map(|save| save.content)
                    }
                    // Superseded by a later edit, flushed, or cancelled.
                    _ => None,
                }
            };
            if let Some(content) = content {
                match router.write(&id, &content).await {
                    Ok(_) => debug!(id = %id, "Debounced save written"),
                    Err(e) => warn!(id = %id, error = %e, "Debounced save failed"),
                }
            }
        });
    }

    /// Drop the pending save for `id`, if any.
    pub fn cancel(&self, id: &str) -> bool {
        self.pending.lock().saves.remove(id).is_some()
    }

    pub fn pending_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.pending.lock().saves.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Write everything pending now, without waiting for quiet periods.
    pub async fn flush(&self) -> Vec<(NodeId, Result<Node, StorageError>)> {
        let mut saves: Vec<(NodeId, String)> = self
            .pending
            .lock()
            .saves
            .drain()
            .map(|(id, save)| (id, save.content))
            .collect();
        saves.sort_by(|a, b| a.0.cmp(&b.0));

        let mut results = Vec::with_capacity(saves.len());
        for (id, content) in saves {
            let result = self.router.write(&id, &content).await;
            results.push((id, result));
        }
        results
    }
}
