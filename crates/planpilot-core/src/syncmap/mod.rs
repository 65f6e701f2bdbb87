//! Durable id -> remote-identity mapping.
//!
//! The sync map is what makes repeated syncs idempotent: an item with an
//! entry here is never created a second time. It is persisted after
//! every engine phase that mutates it, so a crash after phase N cannot
//! lose progress from earlier phases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::model::PlanItemType;

/// Suffix appended to the map path by dry runs, so a rehearsal never
/// overwrites the authoritative map.
pub const DRY_RUN_SUFFIX: &str = ".dry-run";

/// Remote identity of one plan item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Opaque provider id.
    pub remote_id: String,
    /// Short human key, e.g. "#123".
    pub key: String,
    pub url: String,
    pub item_type: PlanItemType,
}

/// The persisted mapping for one plan on one remote target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMap {
    /// Plan fingerprint as of the last successful sync. Differs from the
    /// freshly computed id whenever the plan has evolved since; that is
    /// normal and only disables the no-op fast path.
    pub plan_id: String,
    /// Where the plan lives remotely, e.g. "owner/repo".
    pub target: String,
    pub board_url: String,
    /// Stamp of the last persisted sync. `None` until the first run
    /// writes the map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: BTreeMap<String, SyncEntry>,
}

/// Errors from loading or persisting a sync map.
#[derive(Debug, Error)]
pub enum SyncMapError {
    #[error("failed to read sync map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A corrupt map is a hard configuration error: guessing and
    /// overwriting would sever every existing remote identity.
    #[error("sync map {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("sync map {path} belongs to target {found:?}, expected {expected:?}")]
    TargetMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

impl SyncMap {
    /// Fresh, empty map for a plan that has never been synced.
    pub fn empty(plan_id: &str, target: &str, board_url: &str) -> Self {
        Self {
            plan_id: plan_id.to_owned(),
            target: target.to_owned(),
            board_url: board_url.to_owned(),
            synced_at: None,
            entries: BTreeMap::new(),
        }
    }

    /// Load the map at `path`, or an empty map if the file does not
    /// exist (a first run is not a failure).
    ///
    /// An unreadable or unparsable file is a hard error. A file whose
    /// `target` differs from the configured one is a hard error too:
    /// pointing an old map at a different tracker would cross-wire
    /// remote identities.
    pub fn load(
        path: &Path,
        plan_id: &str,
        target: &str,
        board_url: &str,
    ) -> Result<Self, SyncMapError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(plan_id, target, board_url));
            }
            Err(source) => {
                return Err(SyncMapError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let map: SyncMap =
            serde_json::from_str(&content).map_err(|source| SyncMapError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;

        if map.target != target {
            return Err(SyncMapError::TargetMismatch {
                path: path.display().to_string(),
                expected: target.to_owned(),
                found: map.target,
            });
        }

        Ok(map)
    }

    /// Write the map to `path`, or to `<path>.dry-run` when `dry_run` is
    /// set. Returns the path actually written.
    pub fn persist(&self, path: &Path, dry_run: bool) -> Result<PathBuf, SyncMapError> {
        let target_path = if dry_run {
            PathBuf::from(format!("{}{DRY_RUN_SUFFIX}", path.display()))
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = target_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| SyncMapError::Io {
                    path: target_path.display().to_string(),
                    source,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self).expect("sync map serializes infallibly");
        std::fs::write(&target_path, json).map_err(|source| SyncMapError::Io {
            path: target_path.display().to_string(),
            source,
        })?;

        Ok(target_path)
    }

    pub fn entry(&self, item_id: &str) -> Option<&SyncEntry> {
        self.entries.get(item_id)
    }

    pub fn insert(&mut self, item_id: String, entry: SyncEntry) {
        self.entries.insert(item_id, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
