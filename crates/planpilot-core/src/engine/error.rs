//! Sync engine error taxonomy.

use std::fmt;

use thiserror::Error;

use crate::provider::ProviderError;
use crate::syncmap::{SyncEntry, SyncMapError};

/// One step of the per-item mutation sequence. Carried on partial
/// failures so a retry run knows what already happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Create,
    ApplyLabels,
    Enrich,
    SetParent,
    AddDependency,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::ApplyLabels => "apply-labels",
            Self::Enrich => "enrich",
            Self::SetParent => "set-parent",
            Self::AddDependency => "add-dependency",
        };
        f.write_str(s)
    }
}

/// Failure of a sync run.
///
/// Independent work drains before any of these surface, and everything
/// that did succeed is persisted to the sync map first, so a retry run
/// resumes instead of duplicating.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Map(#[from] SyncMapError),

    /// A provider call failed before any partial state existed for the
    /// item (e.g. the create itself was rejected).
    #[error("sync failed on item {item_id:?} during {step}: {source}")]
    Item {
        item_id: String,
        step: SyncStep,
        #[source]
        source: ProviderError,
    },

    /// The item was created remotely, but a required follow-up step
    /// failed. The created identity is already persisted in the sync
    /// map; a retry run must reuse it, not create a duplicate.
    #[error(
        "item {item_id:?} was created as {} but {step} failed (completed: {}): {source}",
        .entry.key,
        completed_list(.completed)
    )]
    CreatedButIncomplete {
        item_id: String,
        entry: SyncEntry,
        completed: Vec<SyncStep>,
        step: SyncStep,
        #[source]
        source: ProviderError,
    },

    /// A phase-level provider failure outside any single item (e.g. the
    /// discovery search).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("sync cancelled; in-flight work was drained and persisted")]
    Cancelled,
}

fn completed_list(steps: &[SyncStep]) -> String {
    if steps.is_empty() {
        "none".to_owned()
    } else {
        steps
            .iter()
            .map(SyncStep::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl SyncError {
    /// Whether a retry run could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Item { source, .. }
            | Self::CreatedButIncomplete { source, .. }
            | Self::Provider(source) => source.is_retryable(),
            Self::Map(_) | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanItemType;

    fn entry() -> SyncEntry {
        SyncEntry {
            remote_id: "rid-1".to_owned(),
            key: "#7".to_owned(),
            url: "https://tracker.test/items/7".to_owned(),
            item_type: PlanItemType::Task,
        }
    }

    #[test]
    fn created_but_incomplete_names_identity_and_steps() {
        let err = SyncError::CreatedButIncomplete {
            item_id: "T1".to_owned(),
            entry: entry(),
            completed: vec![SyncStep::Create],
            step: SyncStep::ApplyLabels,
            source: ProviderError::Transport {
                message: "timeout".to_owned(),
                retryable: true,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("T1"));
        assert!(msg.contains("#7"));
        assert!(msg.contains("apply-labels"));
        assert!(msg.contains("completed: create"));
        assert!(err.is_retryable());
    }

    #[test]
    fn retryability_follows_the_underlying_provider_error() {
        let err = SyncError::Item {
            item_id: "T1".to_owned(),
            step: SyncStep::Create,
            source: ProviderError::InvalidInput("empty title".to_owned()),
        };
        assert!(!err.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn empty_completed_list_reads_as_none() {
        let err = SyncError::CreatedButIncomplete {
            item_id: "T1".to_owned(),
            entry: entry(),
            completed: vec![],
            step: SyncStep::SetParent,
            source: ProviderError::NotFound("x".to_owned()),
        };
        assert!(err.to_string().contains("completed: none"));
    }
}
