//! Value kinds the reactive layer passes through untouched.
//!
//! Timestamps, patterns, maps and sets behave like opaque leaves: an entity
//! never hands out a proxy for them. In the state tree they are kept as
//! single-key tagged objects so a snapshot stays plain JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TIMESTAMP_TAG: &str = "$timestamp";
pub const PATTERN_TAG: &str = "$pattern";
pub const MAP_TAG: &str = "$map";
pub const SET_TAG: &str = "$set";

const TAGS: [&str; 4] = [TIMESTAMP_TAG, PATTERN_TAG, MAP_TAG, SET_TAG];

/// A leaf value that is never wrapped in a proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Special {
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "$timestamp")]
    Timestamp(i64),
    /// A text pattern with its flag string (e.g. `"i"`).
    #[serde(rename = "$pattern")]
    Pattern {
        source: String,
        #[serde(default)]
        flags: String,
    },
    /// Ordered key/value entries. Keys may be any JSON value.
    #[serde(rename = "$map")]
    Map(Vec<(Value, Value)>),
    #[serde(rename = "$set")]
    Set(Vec<Value>),
}

impl Special {
    /// Timestamp for the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self::Timestamp(millis)
    }

    pub fn pattern(source: &str, flags: &str) -> Self {
        Self::Pattern {
            source: source.to_string(),
            flags: flags.to_string(),
        }
    }

    /// Recognize the tagged form. Returns `None` for anything else,
    /// including objects that merely contain a tag next to other keys.
    pub fn from_json(value: &Value) -> Option<Special> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        let tag = map.keys().next()?;
        if !TAGS.contains(&tag.as_str()) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// The tagged JSON form stored in the state tree.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Timestamp(millis) => tagged(TIMESTAMP_TAG, Value::from(*millis)),
            Self::Pattern { source, flags } => {
                let mut body = Map::new();
                body.insert("source".to_string(), Value::String(source.clone()));
                body.insert("flags".to_string(), Value::String(flags.clone()));
                tagged(PATTERN_TAG, Value::Object(body))
            }
            Self::Map(entries) => tagged(
                MAP_TAG,
                Value::Array(
                    entries
                        .iter()
                        .map(|(k, v)| Value::Array(vec![k.clone(), v.clone()]))
                        .collect(),
                ),
            ),
            Self::Set(items) => tagged(SET_TAG, Value::Array(items.clone())),
        }
    }

    /// Look up a key in a `Map`. Other kinds never match.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Membership test for a `Set`.
    pub fn set_contains(&self, item: &Value) -> bool {
        matches!(self, Self::Set(items) if items.contains(item))
    }
}

fn tagged(tag: &str, body: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), body);
    Value::Object(map)
}

/// Human-readable JSON kind, used in error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_round_trips_through_tagged_form() {
        let ts = Special::Timestamp(1_700_000_000_000);
        let stored = ts.to_json();
        assert_eq!(stored, json!({ "$timestamp": 1_700_000_000_000i64 }));
        assert_eq!(Special::from_json(&stored), Some(ts));
    }

    #[test]
    fn map_and_set_keep_entry_order() {
        let map = Special::Map(vec![(json!("b"), json!(2)), (json!("a"), json!(1))]);
        let stored = map.to_json();
        assert_eq!(stored, json!({ "$map": [["b", 2], ["a", 1]] }));
        let back = Special::from_json(&stored).unwrap();
        assert_eq!(back.map_get(&json!("a")), Some(&json!(1)));

        let set = Special::Set(vec![json!("sword"), json!("shield")]);
        assert!(Special::from_json(&set.to_json()).unwrap().set_contains(&json!("shield")));
    }

    #[test]
    fn pattern_flags_default_to_empty() {
        let parsed = Special::from_json(&json!({ "$pattern": { "source": "^h" } })).unwrap();
        assert_eq!(parsed, Special::pattern("^h", ""));
    }

    #[test]
    fn plain_objects_are_not_special() {
        assert!(Special::from_json(&json!({ "hp": 10 })).is_none());
        assert!(Special::from_json(&json!({ "$timestamp": 1, "extra": true })).is_none());
        assert!(Special::from_json(&json!({ "$timestamp": "soon" })).is_none());
        assert!(Special::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn json_kind_names() {
        assert_eq!(json_kind(&json!(null)), "null");
        assert_eq!(json_kind(&json!([])), "array");
        assert_eq!(json_kind(&json!({})), "object");
        assert_eq!(json_kind(&json!(1.5)), "number");
    }
}
