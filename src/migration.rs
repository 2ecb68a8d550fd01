//! Backend-to-backend copy
//!
//! Lists the source in full and replays creates against the target. Not
//! transactional: whatever was copied before a failure stays in the target.

use crate::driver::StorageDriver;
use crate::error::StorageError;
use crate::node::{path, Node};
use crate::types::NodeId;
use tracing::{info, warn};

/// Outcome of a migration
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Ids created (or already present, for folders) in the target
    pub copied: Vec<NodeId>,
    pub failed: Vec<(NodeId, StorageError)>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Order nodes so that every folder comes before anything inside it.
///
/// Shallower nodes first; at equal depth folders before files, then by id.
pub fn replay_order(mut nodes: Vec<Node>) -> Vec<Node> {
    nodes.sort_by(|a, b| {
        path::depth(&a.id)
            .cmp(&path::depth(&b.id))
            .then_with(|| b.is_folder().cmp(&a.is_folder()))
            .then_with(|| a.id.cmp(&b.id))
    });
    nodes
}

/// Logical copy of `node` for another backend: no backend handle, content loaded.
async fn portable(source: &dyn StorageDriver, node: Node) -> Result<Node, StorageError> {
    let mut node = Node {
        backend: None,
        ..node
    };
    if node.is_unloaded() {
        node.content = Some(source.get_content(&node.id).await?);
    }
    Ok(node)
}

/// Create `nodes` in `target` in replay order.
///
/// A folder that already exists in the target counts as copied. With
/// `continue_on_error` unset the replay stops at the first failure.
pub async fn replay(
    source: Option<&dyn StorageDriver>,
    target: &dyn StorageDriver,
    nodes: Vec<Node>,
    continue_on_error: bool,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    for node in replay_order(nodes) {
        let id = node.id.clone();
        let kind = node.kind;
        let result = match source {
            Some(source) => portable(source, node).await,
            None => Ok(Node {
                backend: None,
                ..node
            }),
        };
        let result = match result {
            Ok(node) => target.create(&node).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => report.copied.push(id),
            Err(StorageError::AlreadyExists(_)) if kind.is_folder() => report.copied.push(id),
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to copy node");
                report.failed.push((id, e));
                if !continue_on_error {
                    break;
                }
            }
        }
    }

    report
}

/// Copy every node of `source` into `target`.
pub async fn migrate(
    source: &dyn StorageDriver,
    target: &dyn StorageDriver,
    continue_on_error: bool,
) -> Result<MigrationReport, StorageError> {
    let nodes = source.list_all().await?;
    let total = nodes.len();
    info!(from = %source.kind(), to = %target.kind(), total, "Migrating notes");

    let report = replay(Some(source), target, nodes, continue_on_error).await;
    info!(
        copied = report.copied.len(),
        failed = report.failed.len(),
        "Migration finished"
    );
    Ok(report)
}
