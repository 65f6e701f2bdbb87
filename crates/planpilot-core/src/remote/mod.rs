//! Remote-state recovery: metadata block parsing, body parsing, and
//! map-sync reconciliation.

pub mod metadata;
pub mod parser;
pub mod reconcile;

pub use metadata::{parse_metadata, render_metadata, strip_metadata, META_END, META_START};
pub use parser::{
    extract_sections, parse_bullets, plan_item_from_remote, resolve_remote_item_type,
    MIGRATED_PLACEHOLDER,
};
pub use reconcile::{reconcile_discovered, ReconcileOutcome};
