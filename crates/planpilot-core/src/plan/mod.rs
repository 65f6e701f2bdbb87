//! Plan management: data model, TOML loading, validation, identity
//! hashing, and dependency rollup.

pub mod hash;
pub mod model;
pub mod rollup;
pub mod toml_format;
pub mod validate;

pub use hash::compute_plan_id;
pub use model::{Estimate, Plan, PlanItem, PlanItemType, ScopeBounds, Verification};
pub use rollup::{declared_edges, parent_blocked_by, rollup_edges, BlockedByEdge};
pub use toml_format::{load_plan_file, parse_plan_toml, PlanMeta, PlanParseError, PlanToml};
pub use validate::{validate_plan, ValidateMode, ValidationError};
