//! Map-sync reconciliation: rebuild the sync map from discovered remote
//! items.
//!
//! Discovery may return anything the tracker hosts: items from other
//! plans, other tools, or hand-written issues. Attribution is decided
//! solely by the embedded metadata block: a `PLAN_ID` that does not
//! match the target plan excludes an item even if its `ITEM_ID` collides
//! lexically with one of ours.

use std::collections::HashMap;

use crate::plan::model::PlanItem;
use crate::provider::RemoteItem;
use crate::syncmap::SyncEntry;

use super::metadata::{parse_metadata, KEY_ITEM_ID, KEY_PLAN_ID};
use super::parser::{plan_item_from_remote, resolve_remote_item_type};

/// Result of reconciling discovered remote items against a plan id.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Plan item id -> remote identity, for every attributable item.
    pub desired_entries: HashMap<String, SyncEntry>,
    /// Plan item id -> recovered approximation of the remote content.
    pub remote_items: HashMap<String, PlanItem>,
}

/// Filter discovered items down to those belonging to `plan_id` and
/// recover their identities and content.
pub fn reconcile_discovered(discovered: &[RemoteItem], plan_id: &str) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    for remote in discovered {
        let meta = parse_metadata(&remote.body);

        match meta.get(KEY_PLAN_ID).map(String::as_str) {
            Some(found) if found == plan_id => {}
            Some(found) => {
                tracing::debug!(
                    remote_key = %remote.key,
                    found_plan_id = %found,
                    "skipping item from a different plan"
                );
                continue;
            }
            None => {
                tracing::debug!(remote_key = %remote.key, "skipping unmarked item");
                continue;
            }
        }

        let Some(item_id) = meta.get(KEY_ITEM_ID) else {
            // Attributable to the plan but not to an item: unusable.
            tracing::warn!(
                remote_key = %remote.key,
                "item carries the plan id but no ITEM_ID; skipping"
            );
            continue;
        };

        let entry = SyncEntry {
            remote_id: remote.id.clone(),
            key: remote.key.clone(),
            url: remote.url.clone(),
            item_type: resolve_remote_item_type(item_id, &meta),
        };
        let recovered = plan_item_from_remote(item_id, &meta, &remote.title, &remote.body);

        outcome.desired_entries.insert(item_id.clone(), entry);
        outcome.remote_items.insert(item_id.clone(), recovered);
    }

    outcome
}
