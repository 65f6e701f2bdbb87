//! Dependency-edge rollup across hierarchy levels.
//!
//! If task X (in story S1) depends on task T (in story S2), then S1 is
//! blocked by S2. Applied once per level: task dependencies roll up to
//! story blocked-by edges, and story-level edges (declared plus derived)
//! roll up to epic blocked-by edges. The level-by-level form matters:
//! story-level edges are a first-class, separately persisted relation, so
//! tasks are never flattened straight to epics.
//!
//! Cyclic dependency graphs are not rejected here; a cycle across parents
//! simply yields the symmetric parent edges.

use std::collections::{BTreeSet, HashMap};

use super::model::{PlanItem, PlanItemType};

/// Ordered pair: `(blocked_parent_id, blocking_parent_id)`.
pub type BlockedByEdge = (String, String);

/// Same-level dependency edges `(blocked_id, blocking_id)` declared via
/// `depends_on` between items of `item_type`. Cross-level references are
/// ignored; they have no rollup meaning.
pub fn declared_edges(items: &[PlanItem], item_type: PlanItemType) -> BTreeSet<BlockedByEdge> {
    let types: HashMap<&str, PlanItemType> =
        items.iter().map(|i| (i.id.as_str(), i.item_type)).collect();

    let mut edges = BTreeSet::new();
    for item in items.iter().filter(|i| i.item_type == item_type) {
        for dep in &item.depends_on {
            if types.get(dep.as_str()) == Some(&item_type) {
                edges.insert((item.id.clone(), dep.clone()));
            }
        }
    }
    edges
}

/// Lift child-level edges one level up: each endpoint is replaced by its
/// parent, edges whose endpoints share a parent (or lack one) drop out,
/// and duplicates collapse into the set.
pub fn rollup_edges(
    items: &[PlanItem],
    child_edges: &BTreeSet<BlockedByEdge>,
) -> BTreeSet<BlockedByEdge> {
    let parents: HashMap<&str, &str> = items
        .iter()
        .filter_map(|i| i.parent_id.as_deref().map(|p| (i.id.as_str(), p)))
        .collect();

    let mut edges = BTreeSet::new();
    for (blocked, blocking) in child_edges {
        let (Some(&blocked_parent), Some(&blocking_parent)) =
            (parents.get(blocked.as_str()), parents.get(blocking.as_str()))
        else {
            continue;
        };
        if blocked_parent != blocking_parent {
            edges.insert((blocked_parent.to_owned(), blocking_parent.to_owned()));
        }
    }
    edges
}

/// Blocked-by edges at `level`, derived from its child level's declared
/// dependencies. `level` must have a child type (story or epic).
pub fn parent_blocked_by(items: &[PlanItem], level: PlanItemType) -> BTreeSet<BlockedByEdge> {
    match level.child_type() {
        Some(child) => rollup_edges(items, &declared_edges(items, child)),
        None => BTreeSet::new(),
    }
}
