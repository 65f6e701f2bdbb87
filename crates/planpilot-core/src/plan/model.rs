//! Core plan data model: items, hierarchy types, and the plan container.
//!
//! A [`Plan`] is an ordered collection of [`PlanItem`]s. The hierarchy
//! level is a field on the item, not a storage location, so a plan can be
//! sliced by level without re-deriving structure.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Hierarchy level of a plan item.
///
/// Levels form a strict parent chain: an epic has no parent, a story's
/// parent is an epic, a task's parent is a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanItemType {
    Epic,
    Story,
    Task,
}

impl PlanItemType {
    /// The level whose items may appear as parents of this level.
    pub fn parent_type(self) -> Option<PlanItemType> {
        match self {
            Self::Epic => None,
            Self::Story => Some(Self::Epic),
            Self::Task => Some(Self::Story),
        }
    }

    /// The level whose items may appear as children of this level.
    pub fn child_type(self) -> Option<PlanItemType> {
        match self {
            Self::Epic => Some(Self::Story),
            Self::Story => Some(Self::Task),
            Self::Task => None,
        }
    }
}

impl fmt::Display for PlanItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanItemType {
    type Err = PlanItemTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epic" => Ok(Self::Epic),
            "story" => Ok(Self::Story),
            "task" => Ok(Self::Task),
            other => Err(PlanItemTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanItemType`] string.
#[derive(Debug, Clone)]
pub struct PlanItemTypeParseError(pub String);

impl fmt::Display for PlanItemTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan item type: {:?}", self.0)
    }
}

impl std::error::Error for PlanItemTypeParseError {}

// ---------------------------------------------------------------------------
// Optional structured fields
// ---------------------------------------------------------------------------

/// Effort estimate: t-shirt size and/or hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
}

/// How completion of an item is verified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub ci_checks: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub manual_steps: Vec<String>,
}

/// Explicit in/out scope bullets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeBounds {
    #[serde(default, rename = "in")]
    pub in_scope: Vec<String>,
    #[serde(default, rename = "out")]
    pub out_of_scope: Vec<String>,
}

// ---------------------------------------------------------------------------
// PlanItem
// ---------------------------------------------------------------------------

/// One planning unit: an epic, story, or task.
///
/// The `id` is caller-assigned, unique within a plan, and stable across
/// runs; it is the join key between the plan, the sync map, and the
/// metadata block embedded in remote item bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: PlanItemType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub sub_item_ids: Vec<String>,
    /// Items this item is blocked by. A set: order carries no meaning.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<String>,
    // Structured optional fields last: they serialize as TOML tables,
    // which must come after plain values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<Estimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeBounds>,
}

impl PlanItem {
    /// Minimal item with the given identity; all descriptive fields empty.
    pub fn new(id: impl Into<String>, item_type: PlanItemType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_type,
            title: title.into(),
            goal: None,
            motivation: None,
            requirements: Vec::new(),
            acceptance_criteria: Vec::new(),
            success_metrics: Vec::new(),
            assumptions: Vec::new(),
            risks: Vec::new(),
            parent_id: None,
            sub_item_ids: Vec::new(),
            depends_on: BTreeSet::new(),
            labels: Vec::new(),
            spec_ref: None,
            estimate: None,
            verification: None,
            scope: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// An ordered collection of plan items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn new(items: Vec<PlanItem>) -> Self {
        Self { items }
    }

    /// Look up an item by id.
    pub fn item(&self, id: &str) -> Option<&PlanItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Items of one hierarchy level, in plan order.
    pub fn items_of_type(&self, item_type: PlanItemType) -> impl Iterator<Item = &PlanItem> {
        self.items.iter().filter(move |i| i.item_type == item_type)
    }

    /// Id -> item index for repeated lookups.
    pub fn index(&self) -> HashMap<&str, &PlanItem> {
        self.items.iter().map(|i| (i.id.as_str(), i)).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
