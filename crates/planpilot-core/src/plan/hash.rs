//! Deterministic plan identity.
//!
//! `compute_plan_id` fingerprints plan content so that every remote item
//! can be attributed back to the plan that produced it, and so an
//! unchanged plan can be recognized as a no-op resync. The fingerprint is
//! order-independent and normalizes "explicitly empty" vs "absent"
//! optional fields, because upstream plan sources differ on
//! default-vs-omitted policy.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::model::{Plan, PlanItem};

/// Hex characters kept from the SHA-256 digest. Short enough to embed in
/// a tracker metadata block, long enough that collision across plans is
/// not a practical concern at this tool's scale.
const PLAN_ID_LEN: usize = 12;

/// Compute the content fingerprint of a plan.
///
/// Items are sorted by `(type, id)`, dumped to canonical JSON (named
/// fields, nulls and empty containers stripped recursively, sorted keys,
/// no whitespace), hashed with SHA-256, and truncated to a 12-hex prefix.
pub fn compute_plan_id(plan: &Plan) -> String {
    let mut sorted: Vec<&PlanItem> = plan.items.iter().collect();
    sorted.sort_by(|a, b| (a.item_type, a.id.as_str()).cmp(&(b.item_type, b.id.as_str())));

    let canonical: Vec<Value> = sorted.iter().map(|i| canonical_item(i)).collect();

    // serde_json object keys are ordered (BTreeMap-backed), and
    // `to_string` emits no incidental whitespace, so this serialization
    // is already canonical.
    let dump = serde_json::to_string(&Value::Array(canonical))
        .expect("plan items serialize infallibly");

    let digest = Sha256::digest(dump.as_bytes());
    hex::encode(digest)[..PLAN_ID_LEN].to_owned()
}

/// Canonical JSON value for one item: nulls and empty containers removed
/// at every nesting depth.
fn canonical_item(item: &PlanItem) -> Value {
    let value = serde_json::to_value(item).expect("plan item serializes infallibly");
    strip_empty(value).unwrap_or(Value::Object(serde_json::Map::new()))
}

/// Recursively drop nulls and empty arrays/objects. Returns `None` when
/// the value itself normalizes away.
fn strip_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: serde_json::Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| strip_empty(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        Value::Array(values) => {
            let cleaned: Vec<Value> = values.into_iter().filter_map(strip_empty).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Array(cleaned))
            }
        }
        other => Some(other),
    }
}
