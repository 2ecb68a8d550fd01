//! Full JSON export and destructive import of the active backend.

use crate::driver::StorageDriver;
use crate::error::StorageError;
use crate::migration::{self, MigrationReport};
use crate::node::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Format version written by this crate
pub const BACKUP_VERSION: u32 = 1;

fn default_version() -> u32 {
    BACKUP_VERSION
}

/// Backup document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
    pub nodes: Vec<Node>,
}

/// Accepted import shapes
#[derive(Deserialize)]
#[serde(untagged)]
enum BackupDocument {
    Versioned(Backup),
    Bare(Vec<Node>),
}

impl Backup {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            version: BACKUP_VERSION,
            exported_at: Some(Utc::now()),
            nodes,
        }
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a backup; a bare node array is read as a version 1 backup.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let backup = match serde_json::from_str::<BackupDocument>(json)? {
            BackupDocument::Versioned(backup) => backup,
            BackupDocument::Bare(nodes) => Backup {
                version: BACKUP_VERSION,
                exported_at: None,
                nodes,
            },
        };
        if backup.version > BACKUP_VERSION {
            return Err(StorageError::Unsupported(format!(
                "backup version {} (newest supported is {})",
                backup.version, BACKUP_VERSION
            )));
        }
        for node in &backup.nodes {
            node.validate()?;
        }
        Ok(backup)
    }
}

/// Every node of `driver` with all file content loaded.
pub async fn export(driver: &dyn StorageDriver) -> Result<Backup, StorageError> {
    let mut nodes = driver.list_all().await?;
    for node in nodes.iter_mut().filter(|n| n.is_unloaded()) {
        node.content = Some(driver.get_content(&node.id).await?);
    }
    for node in nodes.iter_mut() {
        node.backend = None;
    }
    info!(mode = %driver.kind(), count = nodes.len(), "Exported backup");
    Ok(Backup::new(nodes))
}

/// Replace everything in `driver` with the backup's nodes.
pub async fn restore(
    driver: &dyn StorageDriver,
    backup: &Backup,
) -> Result<MigrationReport, StorageError> {
    let existing = driver.list_all().await?;
    let mut removed = 0usize;
    for node in existing.iter().filter(|n| n.parent_id.is_none()) {
        driver.delete(&node.id, node.kind).await?;
        removed += 1;
    }

    let nodes: Vec<Node> = backup
        .nodes
        .iter()
        .cloned()
        .map(|mut node| {
            if node.is_file() && node.content.is_none() {
                node.content = Some(String::new());
            }
            node
        })
        .collect();
    let report = migration::replay(None, driver, nodes, true).await;
    info!(
        mode = %driver.kind(),
        removed,
        restored = report.copied.len(),
        failed = report.failed.len(),
        "Restored backup"
    );
    Ok(report)
}
