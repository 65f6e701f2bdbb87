//! Relational plan validator.
//!
//! Unlike a parser that stops at the first problem, this validator runs
//! every check and reports the full list of violations in one error, so a
//! plan can be fixed in a single editing pass. Callers must not proceed to
//! reconciliation when validation fails.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use super::model::{Plan, PlanItem, PlanItemType};

/// Strictness of reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    /// Every `parent_id`, `sub_item_ids`, and `depends_on` reference must
    /// resolve within the plan.
    Strict,
    /// Dangling references are tolerated. Used when validating a single
    /// slice of a plan, or a plan recovered from an incomplete remote
    /// snapshot, where siblings are deliberately absent.
    Partial,
}

impl fmt::Display for ValidateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Partial => f.write_str("partial"),
        }
    }
}

/// Aggregated validation failure: every violation found, in check order.
#[derive(Debug, Error)]
#[error("plan validation failed with {} violation(s):\n  {}", .violations.len(), .violations.join("\n  "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

/// Validate a plan's relational and structural integrity.
///
/// All checks run regardless of earlier failures; the returned error
/// carries one human-readable line per violation.
pub fn validate_plan(plan: &Plan, mode: ValidateMode) -> Result<(), ValidationError> {
    let mut violations: Vec<String> = Vec::new();

    check_duplicate_ids(plan, &mut violations);

    // Later checks resolve references through this index; duplicates were
    // already reported above, the index just keeps the last occurrence.
    let index: HashMap<&str, &PlanItem> = plan.index();

    check_hierarchy_typing(plan, &index, &mut violations);
    check_bidirectional_consistency(plan, &index, &mut violations);
    if mode == ValidateMode::Strict {
        check_reference_resolution(plan, &index, &mut violations);
    }
    check_self_dependency(plan, &mut violations);
    check_required_fields(plan, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn check_duplicate_ids(plan: &Plan, violations: &mut Vec<String>) {
    let mut seen: HashSet<&str> = HashSet::new();
    for item in &plan.items {
        if !seen.insert(item.id.as_str()) {
            violations.push(format!("duplicate item id {:?}", item.id));
        }
    }
}

/// Epics must have no parent; a story's parent must be an epic; a task's
/// parent must be a story. Parents that don't resolve are left to the
/// reference-resolution check.
fn check_hierarchy_typing(
    plan: &Plan,
    index: &HashMap<&str, &PlanItem>,
    violations: &mut Vec<String>,
) {
    for item in &plan.items {
        match (item.item_type, &item.parent_id) {
            (PlanItemType::Epic, Some(parent)) => {
                violations.push(format!(
                    "epic {:?} must not have a parent (found parent_id {:?})",
                    item.id, parent
                ));
            }
            (child_type, Some(parent_id)) => {
                let expected = child_type
                    .parent_type()
                    .expect("story and task always have a parent type");
                if let Some(parent) = index.get(parent_id.as_str()) {
                    if parent.item_type != expected {
                        violations.push(format!(
                            "{} {:?} has parent {:?} of type {}, expected {}",
                            child_type, item.id, parent_id, parent.item_type, expected
                        ));
                    }
                }
            }
            (_, None) => {}
        }
    }
}

/// `sub_item_ids(X)` must equal exactly the set of items whose
/// `parent_id == X.id`. Both directions are checked so silent drift in
/// either field is caught.
fn check_bidirectional_consistency(
    plan: &Plan,
    index: &HashMap<&str, &PlanItem>,
    violations: &mut Vec<String>,
) {
    for item in &plan.items {
        // Forward: every listed child must point back.
        for child_id in &item.sub_item_ids {
            if let Some(child) = index.get(child_id.as_str()) {
                if child.parent_id.as_deref() != Some(item.id.as_str()) {
                    violations.push(format!(
                        "item {:?} lists sub-item {:?}, but that item's parent_id is {:?}",
                        item.id, child_id, child.parent_id
                    ));
                }
            }
        }
        // Reverse: every item pointing here must be listed.
        if let Some(parent_id) = &item.parent_id {
            if let Some(parent) = index.get(parent_id.as_str()) {
                if !parent.sub_item_ids.contains(&item.id) {
                    violations.push(format!(
                        "item {:?} has parent_id {:?}, but is missing from that item's sub_item_ids",
                        item.id, parent_id
                    ));
                }
            }
        }
    }
}

fn check_reference_resolution(
    plan: &Plan,
    index: &HashMap<&str, &PlanItem>,
    violations: &mut Vec<String>,
) {
    for item in &plan.items {
        if let Some(parent_id) = &item.parent_id {
            if !index.contains_key(parent_id.as_str()) {
                violations.push(format!(
                    "item {:?} references unknown parent {:?}",
                    item.id, parent_id
                ));
            }
        }
        for child_id in &item.sub_item_ids {
            if !index.contains_key(child_id.as_str()) {
                violations.push(format!(
                    "item {:?} references unknown sub-item {:?}",
                    item.id, child_id
                ));
            }
        }
        for dep_id in &item.depends_on {
            if !index.contains_key(dep_id.as_str()) {
                violations.push(format!(
                    "item {:?} depends on unknown item {:?}",
                    item.id, dep_id
                ));
            }
        }
    }
}

fn check_self_dependency(plan: &Plan, violations: &mut Vec<String>) {
    for item in &plan.items {
        if item.depends_on.contains(&item.id) {
            violations.push(format!("item {:?} depends on itself", item.id));
        }
    }
}

/// Required-field policy per level: every item needs a non-empty title;
/// stories and tasks additionally need a goal, requirements, and
/// acceptance criteria. Applies in both modes.
fn check_required_fields(plan: &Plan, violations: &mut Vec<String>) {
    for item in &plan.items {
        if item.title.trim().is_empty() {
            violations.push(format!("item {:?} has an empty title", item.id));
        }
        if matches!(item.item_type, PlanItemType::Story | PlanItemType::Task) {
            if item.goal.as_deref().is_none_or(|g| g.trim().is_empty()) {
                violations.push(format!(
                    "{} {:?} is missing a goal",
                    item.item_type, item.id
                ));
            }
            if item.requirements.is_empty() {
                violations.push(format!(
                    "{} {:?} has no requirements",
                    item.item_type, item.id
                ));
            }
            if item.acceptance_criteria.is_empty() {
                violations.push(format!(
                    "{} {:?} has no acceptance criteria",
                    item.item_type, item.id
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::model::{Plan, PlanItem, PlanItemType};

    fn epic(id: &str) -> PlanItem {
        PlanItem::new(id, PlanItemType::Epic, format!("Epic {id}"))
    }

    fn story(id: &str, parent: &str) -> PlanItem {
        let mut item = PlanItem::new(id, PlanItemType::Story, format!("Story {id}"));
        item.parent_id = Some(parent.to_owned());
        item.goal = Some("ship it".to_owned());
        item.requirements = vec!["req".to_owned()];
        item.acceptance_criteria = vec!["done".to_owned()];
        item
    }

    fn task(id: &str, parent: &str) -> PlanItem {
        let mut item = PlanItem::new(id, PlanItemType::Task, format!("Task {id}"));
        item.parent_id = Some(parent.to_owned());
        item.goal = Some("do it".to_owned());
        item.requirements = vec!["req".to_owned()];
        item.acceptance_criteria = vec!["done".to_owned()];
        item
    }

    /// E1 -> S1 -> T1 with both link directions populated.
    fn consistent_plan() -> Plan {
        let mut e1 = epic("E1");
        e1.sub_item_ids = vec!["S1".to_owned()];
        let mut s1 = story("S1", "E1");
        s1.sub_item_ids = vec!["T1".to_owned()];
        let t1 = task("T1", "S1");
        Plan::new(vec![e1, s1, t1])
    }

    #[test]
    fn valid_plan_passes_both_modes() {
        let plan = consistent_plan();
        validate_plan(&plan, ValidateMode::Strict).expect("strict should pass");
        validate_plan(&plan, ValidateMode::Partial).expect("partial should pass");
    }

    #[test]
    fn duplicate_ids_always_raise() {
        let plan = Plan::new(vec![epic("E1"), epic("E1")]);
        for mode in [ValidateMode::Strict, ValidateMode::Partial] {
            let err = validate_plan(&plan, mode).unwrap_err();
            assert!(
                err.violations.iter().any(|v| v.contains("duplicate")),
                "{mode}: {err}"
            );
        }
    }

    #[test]
    fn story_with_task_parent_raises() {
        let mut plan = consistent_plan();
        // Add a story whose parent is the task.
        let mut bad = story("S2", "T1");
        bad.parent_id = Some("T1".to_owned());
        plan.items.push(bad);
        // Keep bidirectional consistency so only the typing check fires.
        plan.items
            .iter_mut()
            .find(|i| i.id == "T1")
            .unwrap()
            .sub_item_ids = vec!["S2".to_owned()];

        let err = validate_plan(&plan, ValidateMode::Strict).unwrap_err();
        assert!(
            err.violations
                .iter()
                .any(|v| v.contains("of type task, expected epic")),
            "{err}"
        );
    }

    #[test]
    fn epic_with_parent_raises() {
        let mut plan = consistent_plan();
        plan.items[0].parent_id = Some("S1".to_owned());
        let err = validate_plan(&plan, ValidateMode::Partial).unwrap_err();
        assert!(
            err.violations.iter().any(|v| v.contains("must not have a parent")),
            "{err}"
        );
    }

    #[test]
    fn missing_goal_raises_in_both_modes() {
        let mut plan = consistent_plan();
        plan.items.iter_mut().find(|i| i.id == "T1").unwrap().goal = None;
        for mode in [ValidateMode::Strict, ValidateMode::Partial] {
            let err = validate_plan(&plan, mode).unwrap_err();
            assert!(
                err.violations.iter().any(|v| v.contains("missing a goal")),
                "{mode}: {err}"
            );
        }
    }

    #[test]
    fn unresolved_parent_raises_only_in_strict() {
        let mut plan = consistent_plan();
        plan.items.iter_mut().find(|i| i.id == "T1").unwrap().parent_id =
            Some("S-gone".to_owned());

        let err = validate_plan(&plan, ValidateMode::Strict).unwrap_err();
        assert!(
            err.violations.iter().any(|v| v.contains("unknown parent")),
            "{err}"
        );

        // Partial tolerates the dangling reference. Removing the stale
        // back-link keeps the bidirectional check quiet too.
        plan.items
            .iter_mut()
            .find(|i| i.id == "S1")
            .unwrap()
            .sub_item_ids
            .clear();
        validate_plan(&plan, ValidateMode::Partial).expect("partial should tolerate");
    }

    #[test]
    fn unresolved_dependency_raises_only_in_strict() {
        let mut plan = consistent_plan();
        plan.items
            .iter_mut()
            .find(|i| i.id == "T1")
            .unwrap()
            .depends_on
            .insert("T-gone".to_owned());

        let err = validate_plan(&plan, ValidateMode::Strict).unwrap_err();
        assert!(
            err.violations.iter().any(|v| v.contains("unknown item")),
            "{err}"
        );
        validate_plan(&plan, ValidateMode::Partial).expect("partial should tolerate");
    }

    #[test]
    fn sub_item_drift_raises() {
        let mut plan = consistent_plan();
        // E1 claims S1 and S2; S2 does not exist -> strict ref error, and
        // in partial mode the forward check is silent for missing items.
        plan.items[0].sub_item_ids.push("S2".to_owned());
        let err = validate_plan(&plan, ValidateMode::Strict).unwrap_err();
        assert!(
            err.violations.iter().any(|v| v.contains("unknown sub-item")),
            "{err}"
        );

        // Now the drift case: T1 points at S1, but S1 stops listing it.
        let mut plan = consistent_plan();
        plan.items
            .iter_mut()
            .find(|i| i.id == "S1")
            .unwrap()
            .sub_item_ids
            .clear();
        let err = validate_plan(&plan, ValidateMode::Strict).unwrap_err();
        assert!(
            err.violations
                .iter()
                .any(|v| v.contains("missing from that item's sub_item_ids")),
            "{err}"
        );
    }

    #[test]
    fn self_dependency_raises() {
        let mut plan = consistent_plan();
        plan.items
            .iter_mut()
            .find(|i| i.id == "T1")
            .unwrap()
            .depends_on
            .insert("T1".to_owned());
        let err = validate_plan(&plan, ValidateMode::Partial).unwrap_err();
        assert!(
            err.violations.iter().any(|v| v.contains("depends on itself")),
            "{err}"
        );
    }

    #[test]
    fn all_violations_reported_together() {
        // Three independent problems in one plan: duplicate id, missing
        // goal, self-dependency. One error, three lines.
        let mut t1 = task("T1", "S1");
        t1.goal = None;
        t1.depends_on.insert("T1".to_owned());
        let mut s1 = story("S1", "E1");
        s1.sub_item_ids = vec!["T1".to_owned()];
        let mut e1 = epic("E1");
        e1.sub_item_ids = vec!["S1".to_owned()];
        let plan = Plan::new(vec![e1.clone(), e1, s1, t1]);

        let err = validate_plan(&plan, ValidateMode::Strict).unwrap_err();
        assert!(err.violations.len() >= 3, "expected >= 3 violations: {err}");
        assert!(err.to_string().contains("violation(s)"));
    }
}
