//! Unit metadata
//!
//! Two small JSON records identify what projmaker owns: `.pminfo.json` at
//! the unit directory root names the generator kind, and an in-flight
//! update is checkpointed as JSON in the work branch's description so a
//! suspended update can be resumed after a process restart.

use std::path::{Path, PathBuf};

use gitclient::{GitClient, GitError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// File naming a unit's generator kind, at the unit directory root
pub const UNIT_INFO_FILE: &str = ".pminfo.json";

/// Errors reading a unit's metadata file
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no unit metadata at {}", .path.display())]
    Missing { path: PathBuf },

    #[error("malformed unit metadata at {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reading an in-flight update record
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("branch '{branch}' carries no update record")]
    Missing { branch: String },

    #[error("branch '{branch}' carries a malformed update record: {reason}")]
    Malformed { branch: String, reason: String },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// A unit's identity, persisted at `<unit_dir>/.pminfo.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    /// Generator kind the unit was created from
    pub unit_type: String,
}

impl UnitInfo {
    /// Path of the metadata file inside a unit directory
    pub fn path(unit_dir: &Path) -> PathBuf {
        unit_dir.join(UNIT_INFO_FILE)
    }

    /// Read the metadata file from a unit directory
    pub async fn load(unit_dir: &Path) -> Result<Self, MetadataError> {
        let path = Self::path(unit_dir);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetadataError::Missing { path });
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| MetadataError::Malformed {
            path,
            reason: e.to_string(),
        })
    }

    /// Write the metadata file into a unit directory
    pub async fn save(&self, unit_dir: &Path) -> std::io::Result<()> {
        let path = Self::path(unit_dir);
        debug!(path = %path.display(), "writing unit metadata");
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        tokio::fs::write(&path, content).await
    }
}

/// Checkpoint for an in-flight update, stored as a branch description
///
/// Created when the work branch is created and discarded with it when a
/// successful finalize deletes the branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// Generator kind of the unit being updated
    pub unit_type: String,
    /// Name of the unit being updated
    pub unit_name: String,
    /// The unit's real home branch
    pub orig_branch: String,
    /// Branch holding the user's edits being rebased
    pub work_branch: String,
    /// Branch hosting the freshly regenerated base
    pub tmp_branch: String,
    /// Generator version requested for the regeneration, if any
    pub generator_version: Option<String>,
}

impl UpdateRecord {
    /// Persist the record into a branch's description
    pub async fn store(&self, client: &GitClient, branch: &str) -> Result<(), RecordError> {
        let json = serde_json::to_string(self).map_err(|e| RecordError::Malformed {
            branch: branch.to_string(),
            reason: e.to_string(),
        })?;
        debug!(%branch, "storing update record");
        client.set_branch_description(branch, &json).await?;
        Ok(())
    }

    /// Read the record back from a branch's description
    pub async fn load(client: &GitClient, branch: &str) -> Result<Self, RecordError> {
        let text = client.branch_description(branch).await?;
        if text.trim().is_empty() {
            return Err(RecordError::Missing {
                branch: branch.to_string(),
            });
        }
        serde_json::from_str(&text).map_err(|e| RecordError::Malformed {
            branch: branch.to_string(),
            reason: e.to_string(),
        })
    }
}
