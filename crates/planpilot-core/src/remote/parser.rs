//! Recover a [`PlanItem`] approximation from a remote item's rendered
//! body and metadata block.
//!
//! A remote-recovered item is inherently lossy: bodies may have been
//! hand-edited, sections reordered or deleted. Parsing is therefore
//! lenient everywhere (missing sections become placeholders, unbulleted
//! lines are accepted verbatim) so that recovery never fails outright.

use std::collections::HashMap;

use crate::plan::model::{PlanItem, PlanItemType};

use super::metadata::{self, KEY_ITEM_TYPE, KEY_PARENT_ID};

/// Substituted for a missing or empty required section, so a recovered
/// item still satisfies the validator's required-field checks.
pub const MIGRATED_PLACEHOLDER: &str = "(migrated from remote)";

pub const SECTION_GOAL: &str = "Goal";
pub const SECTION_REQUIREMENTS: &str = "Requirements";
pub const SECTION_ACCEPTANCE: &str = "Acceptance Criteria";
pub const SECTION_SUCCESS_METRICS: &str = "Success Metrics";
pub const SECTION_ASSUMPTIONS: &str = "Assumptions";
pub const SECTION_RISKS: &str = "Risks";

/// Resolve a remote item's hierarchy level.
///
/// Precedence: explicit `ITEM_TYPE` metadata (case-insensitive) wins;
/// else an id prefix convention (`EPIC...`, `STORY...`); else task.
pub fn resolve_remote_item_type(
    item_id: &str,
    meta: &HashMap<String, String>,
) -> PlanItemType {
    if let Some(raw) = meta.get(KEY_ITEM_TYPE) {
        if let Ok(t) = raw.parse::<PlanItemType>() {
            return t;
        }
    }
    let upper = item_id.to_ascii_uppercase();
    if upper.starts_with("EPIC") {
        PlanItemType::Epic
    } else if upper.starts_with("STORY") {
        PlanItemType::Story
    } else {
        PlanItemType::Task
    }
}

/// Split a markdown-like body into `##`-headed sections.
///
/// A line starting with `## ` opens a new section named by the rest of
/// the line; its text is everything up to the next such heading. Text
/// before the first heading is discarded.
pub fn extract_sections(body: &str) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            let name = heading.trim().to_owned();
            sections.entry(name.clone()).or_default();
            current = Some(name);
        } else if let Some(name) = &current {
            let text = sections.get_mut(name).expect("section entry exists");
            text.push_str(line);
            text.push('\n');
        }
    }

    sections
}

/// Parse a section's text into an ordered list of bullet strings.
///
/// Leading `*` or `-` markers (and checkbox forms `- [ ]` / `- [x]`) are
/// stripped; non-bulleted, non-empty lines are accepted verbatim.
pub fn parse_bullets(section_text: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    for line in section_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let stripped = line
            .strip_prefix("- [x] ")
            .or_else(|| line.strip_prefix("- [ ] "))
            .or_else(|| line.strip_prefix("- "))
            .or_else(|| line.strip_prefix("* "))
            .unwrap_or(line);
        bullets.push(stripped.trim().to_owned());
    }
    bullets
}

/// Reconstruct an approximate [`PlanItem`] from a remote item.
///
/// `Goal`, `Requirements`, and `Acceptance Criteria` fall back to
/// [`MIGRATED_PLACEHOLDER`] when missing or empty.
pub fn plan_item_from_remote(
    item_id: &str,
    meta: &HashMap<String, String>,
    title: &str,
    body: &str,
) -> PlanItem {
    let item_type = resolve_remote_item_type(item_id, meta);
    let sections = extract_sections(&metadata::strip_metadata(body));

    let section_text = |name: &str| -> Option<String> {
        sections
            .get(name)
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
    };
    let section_bullets = |name: &str| -> Vec<String> {
        sections.get(name).map(|t| parse_bullets(t)).unwrap_or_default()
    };
    let bullets_or_placeholder = |name: &str| -> Vec<String> {
        let bullets = section_bullets(name);
        if bullets.is_empty() {
            vec![MIGRATED_PLACEHOLDER.to_owned()]
        } else {
            bullets
        }
    };

    let mut item = PlanItem::new(item_id, item_type, title);
    item.goal = Some(
        section_text(SECTION_GOAL).unwrap_or_else(|| MIGRATED_PLACEHOLDER.to_owned()),
    );
    item.requirements = bullets_or_placeholder(SECTION_REQUIREMENTS);
    item.acceptance_criteria = bullets_or_placeholder(SECTION_ACCEPTANCE);
    item.success_metrics = section_bullets(SECTION_SUCCESS_METRICS);
    item.assumptions = section_bullets(SECTION_ASSUMPTIONS);
    item.risks = section_bullets(SECTION_RISKS);
    item.parent_id = meta.get(KEY_PARENT_ID).cloned();
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::validate::{validate_plan, ValidateMode};
    use crate::plan::Plan;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn item_type_metadata_wins_over_prefix() {
        let m = meta(&[(KEY_ITEM_TYPE, "story")]);
        assert_eq!(resolve_remote_item_type("EPIC-1", &m), PlanItemType::Story);
    }

    #[test]
    fn item_type_metadata_is_case_insensitive() {
        let m = meta(&[(KEY_ITEM_TYPE, "EPIC")]);
        assert_eq!(resolve_remote_item_type("whatever", &m), PlanItemType::Epic);
    }

    #[test]
    fn invalid_item_type_metadata_falls_through_to_prefix() {
        let m = meta(&[(KEY_ITEM_TYPE, "milestone")]);
        assert_eq!(resolve_remote_item_type("STORY-7", &m), PlanItemType::Story);
    }

    #[test]
    fn id_prefix_convention_applies() {
        let m = HashMap::new();
        assert_eq!(resolve_remote_item_type("EPIC-auth", &m), PlanItemType::Epic);
        assert_eq!(resolve_remote_item_type("story-login", &m), PlanItemType::Story);
    }

    #[test]
    fn unknown_ids_default_to_task() {
        assert_eq!(
            resolve_remote_item_type("whatever-9", &HashMap::new()),
            PlanItemType::Task
        );
    }

    #[test]
    fn extract_sections_splits_on_level_two_headings() {
        let body = "intro is discarded\n## Goal\nShip it.\n\n## Requirements\n- a\n- b\n";
        let sections = extract_sections(body);
        assert_eq!(sections.get("Goal").unwrap().trim(), "Ship it.");
        assert!(sections.get("Requirements").unwrap().contains("- a"));
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn extract_sections_ignores_deeper_headings() {
        let body = "## Scope\n### In\n- x\n";
        let sections = extract_sections(body);
        assert!(sections.get("Scope").unwrap().contains("### In"));
    }

    #[test]
    fn empty_section_is_present_but_empty() {
        let sections = extract_sections("## Goal\n## Requirements\n- r\n");
        assert_eq!(sections.get("Goal").unwrap(), "");
    }

    #[test]
    fn parse_bullets_strips_markers() {
        let bullets = parse_bullets("- first\n* second\n- [ ] third\n- [x] fourth\n");
        assert_eq!(bullets, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn parse_bullets_accepts_plain_lines() {
        let bullets = parse_bullets("not a bullet\n\n- real bullet\n");
        assert_eq!(bullets, vec!["not a bullet", "real bullet"]);
    }

    #[test]
    fn recovered_item_maps_sections_to_fields() {
        let body = "\
## Goal
Converge the tracker.

## Requirements
- idempotent runs
- bounded concurrency

## Acceptance Criteria
- second run is a no-op

## Risks
- partial failures

PLANPILOT_META_V1
PLAN_ID: abc123def456
ITEM_ID: T1
ITEM_TYPE: TASK
PARENT_ID: S1
END_PLANPILOT_META
";
        let m = super::super::metadata::parse_metadata(body);
        let item = plan_item_from_remote("T1", &m, "Sync engine", body);

        assert_eq!(item.item_type, PlanItemType::Task);
        assert_eq!(item.goal.as_deref(), Some("Converge the tracker."));
        assert_eq!(item.requirements, vec!["idempotent runs", "bounded concurrency"]);
        assert_eq!(item.acceptance_criteria, vec!["second run is a no-op"]);
        assert_eq!(item.risks, vec!["partial failures"]);
        assert_eq!(item.parent_id.as_deref(), Some("S1"));
        // Metadata lines must never leak into parsed fields.
        assert!(!item.risks.iter().any(|r| r.contains("PLANPILOT")));
    }

    #[test]
    fn missing_required_sections_get_placeholders() {
        let item = plan_item_from_remote("T9", &HashMap::new(), "Bare item", "no sections here");
        assert_eq!(item.goal.as_deref(), Some(MIGRATED_PLACEHOLDER));
        assert_eq!(item.requirements, vec![MIGRATED_PLACEHOLDER]);
        assert_eq!(item.acceptance_criteria, vec![MIGRATED_PLACEHOLDER]);
        assert!(item.success_metrics.is_empty());
    }

    #[test]
    fn recovered_item_satisfies_required_field_checks() {
        let item = plan_item_from_remote("T9", &HashMap::new(), "Bare item", "");
        let plan = Plan::new(vec![item]);
        // Partial mode: the parent reference may dangle, but required
        // fields must hold.
        validate_plan(&plan, ValidateMode::Partial).expect("placeholders satisfy policy");
    }
}
