//! The machine-readable metadata block embedded in remote item bodies.
//!
//! Every body this tool writes ends with a marker-framed block:
//!
//! ```text
//! PLANPILOT_META_V1
//! PLAN_ID: 3fa1b2c4d5e6
//! ITEM_ID: T1
//! ITEM_TYPE: TASK
//! PARENT_ID: S1
//! END_PLANPILOT_META
//! ```
//!
//! The block is what makes remote items attributable: discovery scans for
//! the start marker, and the parser recovers plan identity from the
//! `KEY: value` lines. Unknown keys are ignored; a body without a
//! matching marker pair yields an empty map, never an error.

use std::collections::HashMap;

/// Start marker line (also the search needle for discovery).
pub const META_START: &str = "PLANPILOT_META_V1";
/// End marker line.
pub const META_END: &str = "END_PLANPILOT_META";

pub const KEY_PLAN_ID: &str = "PLAN_ID";
pub const KEY_ITEM_ID: &str = "ITEM_ID";
pub const KEY_ITEM_TYPE: &str = "ITEM_TYPE";
pub const KEY_PARENT_ID: &str = "PARENT_ID";

/// Parse the metadata block out of a rendered body.
///
/// Returns every `KEY: value` pair between the first matching start/end
/// marker pair. Lines without a colon are skipped.
pub fn parse_metadata(body: &str) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    let mut in_block = false;

    for line in body.lines() {
        let line = line.trim();
        if !in_block {
            if line == META_START {
                in_block = true;
            }
            continue;
        }
        if line == META_END {
            return meta;
        }
        if let Some((key, value)) = line.split_once(':') {
            meta.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }

    // No end marker: the block never closed, so nothing is trusted.
    HashMap::new()
}

/// Render a metadata block for embedding at the end of a body.
pub fn render_metadata(
    plan_id: &str,
    item_id: &str,
    item_type: &str,
    parent_id: Option<&str>,
) -> String {
    let mut out = String::new();
    out.push_str(META_START);
    out.push('\n');
    out.push_str(&format!("{KEY_PLAN_ID}: {plan_id}\n"));
    out.push_str(&format!("{KEY_ITEM_ID}: {item_id}\n"));
    out.push_str(&format!("{KEY_ITEM_TYPE}: {item_type}\n"));
    if let Some(parent) = parent_id {
        out.push_str(&format!("{KEY_PARENT_ID}: {parent}\n"));
    }
    out.push_str(META_END);
    out.push('\n');
    out
}

/// Body text with the metadata block removed, for section parsing.
///
/// Lines from the start marker through the end marker (inclusive) are
/// dropped; an unterminated block is dropped to the end of the body.
pub fn strip_metadata(body: &str) -> String {
    let mut out = String::new();
    let mut in_block = false;

    for line in body.lines() {
        let trimmed = line.trim();
        if !in_block {
            if trimmed == META_START {
                in_block = true;
            } else {
                out.push_str(line);
                out.push('\n');
            }
        } else if trimmed == META_END {
            in_block = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_complete_block() {
        let body = "Some intro.\n\nPLANPILOT_META_V1\nPLAN_ID: abc123\nITEM_ID: T1\nITEM_TYPE: TASK\nPARENT_ID: S1\nEND_PLANPILOT_META\n";
        let meta = parse_metadata(body);
        assert_eq!(meta.get(KEY_PLAN_ID).map(String::as_str), Some("abc123"));
        assert_eq!(meta.get(KEY_ITEM_ID).map(String::as_str), Some("T1"));
        assert_eq!(meta.get(KEY_ITEM_TYPE).map(String::as_str), Some("TASK"));
        assert_eq!(meta.get(KEY_PARENT_ID).map(String::as_str), Some("S1"));
    }

    #[test]
    fn unknown_keys_are_carried_not_rejected() {
        let body = "PLANPILOT_META_V1\nITEM_ID: X\nFUTURE_KEY: whatever\nEND_PLANPILOT_META\n";
        let meta = parse_metadata(body);
        assert_eq!(meta.get("FUTURE_KEY").map(String::as_str), Some("whatever"));
        assert_eq!(meta.get(KEY_ITEM_ID).map(String::as_str), Some("X"));
    }

    #[test]
    fn missing_markers_yield_empty_map() {
        assert!(parse_metadata("just a body with no block").is_empty());
    }

    #[test]
    fn unterminated_block_yields_empty_map() {
        let body = "PLANPILOT_META_V1\nITEM_ID: X\n";
        assert!(parse_metadata(body).is_empty());
    }

    #[test]
    fn lines_without_colon_are_skipped() {
        let body = "PLANPILOT_META_V1\ngarbage line\nITEM_ID: X\nEND_PLANPILOT_META\n";
        let meta = parse_metadata(body);
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.get(KEY_ITEM_ID).map(String::as_str), Some("X"));
    }

    #[test]
    fn values_may_contain_colons() {
        let body = "PLANPILOT_META_V1\nITEM_ID: ns:T1\nEND_PLANPILOT_META\n";
        let meta = parse_metadata(body);
        assert_eq!(meta.get(KEY_ITEM_ID).map(String::as_str), Some("ns:T1"));
    }

    #[test]
    fn render_parse_roundtrip() {
        let block = render_metadata("abc123def456", "S1", "STORY", Some("E1"));
        let meta = parse_metadata(&block);
        assert_eq!(meta.get(KEY_PLAN_ID).map(String::as_str), Some("abc123def456"));
        assert_eq!(meta.get(KEY_ITEM_TYPE).map(String::as_str), Some("STORY"));
        assert_eq!(meta.get(KEY_PARENT_ID).map(String::as_str), Some("E1"));
    }

    #[test]
    fn render_omits_parent_when_absent() {
        let block = render_metadata("abc", "E1", "EPIC", None);
        assert!(!block.contains(KEY_PARENT_ID));
        assert!(block.ends_with("END_PLANPILOT_META\n"));
    }

    #[test]
    fn strip_metadata_removes_only_the_block() {
        let body = "## Goal\nShip it.\n\nPLANPILOT_META_V1\nITEM_ID: X\nEND_PLANPILOT_META\n";
        let stripped = strip_metadata(body);
        assert!(stripped.contains("## Goal"));
        assert!(stripped.contains("Ship it."));
        assert!(!stripped.contains("PLANPILOT"));
        assert!(!stripped.contains("ITEM_ID"));
    }

    #[test]
    fn strip_metadata_drops_unterminated_block_to_end() {
        let body = "keep\nPLANPILOT_META_V1\nITEM_ID: X\nno end marker";
        assert_eq!(strip_metadata(body), "keep\n");
    }
}
