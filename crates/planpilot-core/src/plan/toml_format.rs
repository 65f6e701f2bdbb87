//! TOML format for plan definition files.
//!
//! A plan file has a `[plan]` header and one `[[items]]` entry per plan
//! item. Parsing here is purely structural; relational integrity is the
//! [`super::validate`] module's job (two separate passes so every
//! relational problem can be reported at once).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Plan, PlanItem};

/// Top-level structure of a plan TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanToml {
    /// Plan metadata.
    pub plan: PlanMeta,
    /// Items within the plan.
    #[serde(default)]
    pub items: Vec<PlanItem>,
}

/// Plan-level metadata in `[plan]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanMeta {
    /// Human-readable plan name.
    pub name: String,
}

/// Errors that can occur during structural plan parsing.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("failed to read plan file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plan must contain at least one item")]
    NoItems,
}

/// Parse a plan TOML string into a [`PlanToml`].
///
/// Only structural problems are rejected here; run
/// [`super::validate::validate_plan`] on the result before syncing.
pub fn parse_plan_toml(content: &str) -> Result<PlanToml, PlanParseError> {
    let plan: PlanToml = toml::from_str(content)?;
    if plan.items.is_empty() {
        return Err(PlanParseError::NoItems);
    }
    Ok(plan)
}

/// Read and parse a plan file from disk.
pub fn load_plan_file(path: &std::path::Path) -> Result<PlanToml, PlanParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| PlanParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_plan_toml(&content)
}

impl PlanToml {
    /// The items as a [`Plan`], consuming the file wrapper.
    pub fn into_plan(self) -> Plan {
        Plan::new(self.items)
    }
}
