//! Path-addressable state store.
//!
//! One JSON tree holds all game state. Reads go through the path-query
//! language and return every match; writes either overwrite existing
//! matches in place or synthesize the missing containers for a concrete
//! path. The `_system` sub-tree is reserved for engine internals.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::path::{JsonPath, PathError, Step};
use crate::schema::value::json_kind;

/// Reserved property name. Any path containing it is write-protected.
pub const SYSTEM_PREFIX: &str = "_system";

/// How far past the end of an array a write may reach. The gap is padded
/// with nulls.
pub const MAX_ARRAY_GAP: usize = 1024;

/// A store shared by the entities and passages of one game.
pub type SharedStore = Rc<RefCell<PathStore>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("path '{path}' is inside the reserved system namespace")]
    Protected { path: String },
    #[error("cannot create '{path}': {reason}")]
    Structure { path: String, reason: String },
    #[error("state must be an object, got {found}")]
    NotAnObject { found: &'static str },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The global state tree. Always an object at the root.
#[derive(Debug, Clone, PartialEq)]
pub struct PathStore {
    state: Value,
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Value::Object(Map::new()),
        }
    }

    /// Create an empty store behind a shared handle.
    pub fn shared() -> SharedStore {
        Rc::new(RefCell::new(Self::new()))
    }

    /// All values matched by `path`. No match is an empty vector.
    pub fn get_value(&self, path: &str) -> Result<Vec<&Value>, StoreError> {
        let parsed = JsonPath::parse(path)?;
        Ok(self.get_value_at(&parsed))
    }

    pub fn get_value_at(&self, path: &JsonPath) -> Vec<&Value> {
        path.select(&self.state).into_iter().map(|m| m.value).collect()
    }

    /// Deserialize every match of `path` into `T`.
    pub fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        self.get_value(path)?
            .into_iter()
            .map(|v| T::deserialize(v).map_err(StoreError::from))
            .collect()
    }

    /// Write `value` at `path`, returning the number of locations written.
    ///
    /// Existing matches are all overwritten. A concrete path with no match
    /// is created, synthesizing objects or arrays (array when the next
    /// segment is an index) along the way. A wildcard path with no match
    /// writes nothing. On error the tree is left untouched.
    pub fn set_value(
        &mut self,
        path: &str,
        value: Value,
        allow_system: bool,
    ) -> Result<usize, StoreError> {
        let parsed = JsonPath::parse(path)?;
        self.set_value_at(&parsed, value, allow_system)
    }

    pub fn set_value_at(
        &mut self,
        path: &JsonPath,
        value: Value,
        allow_system: bool,
    ) -> Result<usize, StoreError> {
        if !allow_system && path.touches(SYSTEM_PREFIX) {
            return Err(StoreError::Protected {
                path: path.to_string(),
            });
        }

        if path.is_root() {
            let state = if allow_system {
                value
            } else {
                self.keep_system(value)?
            };
            self.set_state(state)?;
            return Ok(1);
        }

        let matches = path.select(&self.state);
        if !allow_system {
            if let Some(hit) = matches.iter().find(|m| m.path.touches(SYSTEM_PREFIX)) {
                return Err(StoreError::Protected {
                    path: hit.path.to_string(),
                });
            }
        }
        let targets: Vec<String> = matches
            .into_iter()
            .filter_map(|m| m.path.to_pointer())
            .collect();

        if !targets.is_empty() {
            let count = targets.len();
            for pointer in targets {
                if let Some(slot) = self.state.pointer_mut(&pointer) {
                    *slot = value.clone();
                }
            }
            debug!(path = %path, count, "store_value_overwritten");
            return Ok(count);
        }

        if !path.is_concrete() {
            trace!(path = %path, "store_wildcard_no_match");
            return Ok(0);
        }

        check_creatable(&self.state, path)?;
        create_at(&mut self.state, path, value)?;
        debug!(path = %path, "store_value_created");
        Ok(1)
    }

    /// An unauthorized root write may not bring its own system sub-tree;
    /// the current one is carried over.
    fn keep_system(&self, value: Value) -> Result<Value, StoreError> {
        match value {
            Value::Object(mut map) => {
                if map.contains_key(SYSTEM_PREFIX) {
                    return Err(StoreError::Protected {
                        path: JsonPath::root().key(SYSTEM_PREFIX).to_string(),
                    });
                }
                if let Some(system) = self.state.get(SYSTEM_PREFIX) {
                    map.insert(SYSTEM_PREFIX.to_string(), system.clone());
                }
                Ok(Value::Object(map))
            }
            other => Ok(other),
        }
    }

    /// The live root tree.
    pub fn get_state(&self) -> &Value {
        &self.state
    }

    /// Replace the whole tree. Not a merge: keys absent from `state` are gone.
    pub fn set_state(&mut self, state: Value) -> Result<(), StoreError> {
        match state {
            Value::Object(map) => {
                debug!(keys = map.len(), "store_state_replaced");
                self.state = Value::Object(map);
                Ok(())
            }
            other => Err(StoreError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    /// Back to an empty root object.
    pub fn reset(&mut self) {
        self.state = Value::Object(Map::new());
        debug!("store_reset");
    }

    /// Serialize the tree to JSON text.
    pub fn snapshot(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.state)?)
    }

    /// Replace the tree from JSON text produced by [`PathStore::snapshot`].
    pub fn restore(&mut self, snapshot: &str) -> Result<(), StoreError> {
        let value: Value = serde_json::from_str(snapshot)?;
        self.set_state(value)
    }
}

fn structure(path: &JsonPath, reason: String) -> StoreError {
    StoreError::Structure {
        path: path.to_string(),
        reason,
    }
}

/// Read-only walk proving that [`create_at`] cannot fail halfway.
///
/// Once a segment is missing, everything below it is synthesized fresh, so
/// only the existing prefix needs shape checks. Every index is bounded
/// against the array it lands in (empty when synthesized).
fn check_creatable(root: &Value, path: &JsonPath) -> Result<(), StoreError> {
    let mut current = Some(root);
    for (depth, step) in path.steps().iter().enumerate() {
        if let Step::Index(index) = step {
            let len = match current {
                Some(Value::Array(items)) => items.len(),
                _ => 0,
            };
            if index.saturating_sub(len) > MAX_ARRAY_GAP {
                return Err(structure(
                    path,
                    format!(
                        "index [{}] at segment {} is more than {} past the end of the array",
                        index, depth, MAX_ARRAY_GAP
                    ),
                ));
            }
        }
        let Some(node) = current else {
            continue;
        };
        let child = match (step, node) {
            (Step::Key(key), Value::Object(map)) => map.get(key),
            (Step::Index(index), Value::Array(items)) => items.get(*index),
            (Step::Key(key), other) => {
                return Err(structure(
                    path,
                    format!(
                        "property '{}' at segment {} needs an object, found {}",
                        key,
                        depth,
                        json_kind(other)
                    ),
                ))
            }
            (Step::Index(index), other) => {
                return Err(structure(
                    path,
                    format!(
                        "index [{}] at segment {} needs an array, found {}",
                        index,
                        depth,
                        json_kind(other)
                    ),
                ))
            }
            (Step::Wildcard, _) => {
                return Err(structure(path, "wildcards cannot create values".to_string()))
            }
        };
        current = match child {
            None | Some(Value::Null) => None,
            Some(next) => Some(next),
        };
    }
    Ok(())
}

fn container_for(next: Option<&Step>) -> Value {
    match next {
        Some(Step::Index(_)) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

fn create_at(root: &mut Value, path: &JsonPath, value: Value) -> Result<(), StoreError> {
    let steps = path.steps();
    let mut current = root;
    let mut value = Some(value);

    for (depth, step) in steps.iter().enumerate() {
        let next = steps.get(depth + 1);
        let slot = match (step, current) {
            (Step::Key(key), Value::Object(map)) => {
                map.entry(key.clone()).or_insert(Value::Null)
            }
            (Step::Index(index), Value::Array(items)) => {
                let Some(needed) = index.checked_add(1) else {
                    return Err(structure(path, format!("index [{}] is too large", index)));
                };
                if items.len() < needed {
                    items.resize(needed, Value::Null);
                }
                &mut items[*index]
            }
            (_, other) => {
                return Err(structure(
                    path,
                    format!("segment {} cannot be entered on {}", depth, json_kind(other)),
                ))
            }
        };

        if next.is_none() {
            *slot = value.take().unwrap_or(Value::Null);
            return Ok(());
        }
        if slot.is_null() {
            *slot = container_for(next);
        }
        current = slot;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creates_nested_objects_on_empty_store() {
        let mut store = PathStore::new();
        store.set_value("$.player.stats.str", json!(10), false).unwrap();
        assert_eq!(store.get_state(), &json!({ "player": { "stats": { "str": 10 } } }));
    }

    #[test]
    fn set_then_get_returns_single_match() {
        let mut store = PathStore::new();
        store.set_value("$.flags.met_guard", json!(true), false).unwrap();
        let found = store.get_value("$.flags.met_guard").unwrap();
        assert_eq!(found, vec![&json!(true)]);
    }

    #[test]
    fn missing_path_reads_as_empty() {
        let store = PathStore::new();
        assert!(store.get_value("$.nowhere.at.all").unwrap().is_empty());
    }

    #[test]
    fn appends_into_existing_array() {
        let mut store = PathStore::new();
        store.set_value("$.items", json!([]), false).unwrap();
        store.set_value("$.items[0]", json!("sword"), false).unwrap();
        assert_eq!(store.get_state()["items"], json!(["sword"]));
    }

    #[test]
    fn next_numeric_segment_creates_array() {
        let mut store = PathStore::new();
        store.set_value("$.party[1].name", json!("Ada"), false).unwrap();
        assert_eq!(store.get_state()["party"], json!([null, { "name": "Ada" }]));
    }

    #[test]
    fn wildcard_overwrites_every_existing_match() {
        let mut store = PathStore::new();
        store
            .set_state(json!({ "npcs": { "a": { "hp": 1 }, "b": { "hp": 2 }, "c": {} } }))
            .unwrap();
        let written = store.set_value("$.npcs.*.hp", json!(9), false).unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            store.get_state(),
            &json!({ "npcs": { "a": { "hp": 9 }, "b": { "hp": 9 }, "c": {} } })
        );
    }

    #[test]
    fn wildcard_without_match_writes_nothing() {
        let mut store = PathStore::new();
        let written = store.set_value("$.npcs.*.hp", json!(1), false).unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.get_state(), &json!({}));
    }

    #[test]
    fn system_namespace_is_protected() {
        let mut store = PathStore::new();
        store.set_value("$.visible", json!(1), false).unwrap();
        let before = store.clone();

        let err = store.set_value("$._system.seed", json!(7), false).unwrap_err();
        assert!(matches!(err, StoreError::Protected { .. }));
        let err = store.set_value("$.player._system", json!(7), false).unwrap_err();
        assert!(matches!(err, StoreError::Protected { .. }));
        assert_eq!(store, before);

        store.set_value("$._system.seed", json!(7), true).unwrap();
        assert_eq!(store.get_value("$._system.seed").unwrap(), vec![&json!(7)]);
    }

    #[test]
    fn indexing_an_object_is_a_structural_error() {
        let mut store = PathStore::new();
        store.set_value("$.bag.gold", json!(3), false).unwrap();
        let before = store.clone();
        let err = store.set_value("$.bag[0].name", json!("x"), false).unwrap_err();
        assert!(matches!(err, StoreError::Structure { .. }));
        assert_eq!(store, before);
    }

    #[test]
    fn property_on_scalar_is_a_structural_error() {
        let mut store = PathStore::new();
        store.set_value("$.name", json!("Ada"), false).unwrap();
        let before = store.clone();
        let err = store.set_value("$.name.first.letter", json!("A"), false).unwrap_err();
        assert!(matches!(err, StoreError::Structure { .. }));
        assert_eq!(store, before);
    }

    #[test]
    fn null_intermediate_is_replaced() {
        let mut store = PathStore::new();
        store.set_value("$.quest", json!(null), false).unwrap();
        store.set_value("$.quest.stage", json!(2), false).unwrap();
        assert_eq!(store.get_state()["quest"], json!({ "stage": 2 }));
    }

    #[test]
    fn overwrite_may_change_type() {
        let mut store = PathStore::new();
        store.set_value("$.mood", json!("calm"), false).unwrap();
        store.set_value("$.mood", json!(3), false).unwrap();
        assert_eq!(store.get_value("$.mood").unwrap(), vec![&json!(3)]);
    }

    #[test]
    fn set_state_is_a_full_swap() {
        let mut store = PathStore::new();
        store.set_value("$.old", json!(1), false).unwrap();
        store.set_state(json!({ "new": 2 })).unwrap();
        assert_eq!(store.get_state(), &json!({ "new": 2 }));
    }

    #[test]
    fn set_state_rejects_non_objects() {
        let mut store = PathStore::new();
        store.set_value("$.keep", json!(true), false).unwrap();
        for bad in [json!(null), json!([1]), json!("x"), json!(4)] {
            let err = store.set_state(bad).unwrap_err();
            assert!(matches!(err, StoreError::NotAnObject { .. }));
        }
        assert_eq!(store.get_state(), &json!({ "keep": true }));
    }

    #[test]
    fn set_state_of_own_state_is_idempotent() {
        let mut store = PathStore::new();
        store.set_value("$.a.b[0].c", json!("deep"), false).unwrap();
        let before = store.get_state().clone();
        store.set_state(before.clone()).unwrap();
        assert_eq!(store.get_state(), &before);
    }

    #[test]
    fn snapshot_round_trips() {
        let mut store = PathStore::new();
        store
            .set_state(json!({ "player": { "hp": 3, "inv": ["a", { "b": null }] }, "turn": 1.5 }))
            .unwrap();
        let text = store.snapshot().unwrap();
        let mut other = PathStore::new();
        other.restore(&text).unwrap();
        assert_eq!(other, store);
    }

    #[test]
    fn typed_reads() {
        let mut store = PathStore::new();
        store.set_value("$.npcs.a.hp", json!(4), false).unwrap();
        store.set_value("$.npcs.b.hp", json!(6), false).unwrap();
        let mut hps: Vec<u32> = store.get_typed("$.npcs.*.hp").unwrap();
        hps.sort();
        assert_eq!(hps, vec![4, 6]);
    }

    #[test]
    fn root_write_replaces_state() {
        let mut store = PathStore::new();
        store.set_value("$.a", json!(1), false).unwrap();
        store.set_value("$", json!({ "b": 2 }), false).unwrap();
        assert_eq!(store.get_state(), &json!({ "b": 2 }));
        assert!(store.set_value("$", json!([]), false).is_err());
    }

    #[test]
    fn reset_empties_the_tree() {
        let mut store = PathStore::new();
        store.set_value("$.a", json!(1), false).unwrap();
        store.reset();
        assert_eq!(store.get_state(), &json!({}));
    }

    fn with_seed() -> PathStore {
        let mut store = PathStore::new();
        store.set_value("$._system.seed", json!(7), true).unwrap();
        store.set_value("$.player.seed", json!(1), false).unwrap();
        store
    }

    #[test]
    fn wildcards_cannot_reach_into_system() {
        let mut store = with_seed();
        let before = store.get_state().clone();
        assert!(matches!(
            store.set_value("$.*.seed", json!(0), false),
            Err(StoreError::Protected { .. })
        ));
        assert!(matches!(
            store.set_value("$.*", json!("x"), false),
            Err(StoreError::Protected { .. })
        ));
        assert_eq!(store.get_state(), &before);

        assert_eq!(store.set_value("$.*.seed", json!(0), true).unwrap(), 2);
        assert_eq!(store.get_state()["_system"]["seed"], json!(0));
    }

    #[test]
    fn root_write_keeps_system_subtree() {
        let mut store = with_seed();
        let before = store.get_state().clone();
        assert!(matches!(
            store.set_value("$", json!({ "_system": { "seed": 99 } }), false),
            Err(StoreError::Protected { .. })
        ));
        assert_eq!(store.get_state(), &before);

        store.set_value("$", json!({ "fresh": true }), false).unwrap();
        assert_eq!(
            store.get_state(),
            &json!({ "fresh": true, "_system": { "seed": 7 } })
        );

        store.set_value("$", json!({ "wiped": true }), true).unwrap();
        assert_eq!(store.get_state(), &json!({ "wiped": true }));
    }

    #[test]
    fn far_indices_are_structure_errors() {
        let mut store = PathStore::new();
        for path in [
            "$.items[18446744073709551615]",
            "$.items[4000000000]",
            "$.grid[0][2000]",
        ] {
            assert!(
                matches!(
                    store.set_value(path, json!(1), false),
                    Err(StoreError::Structure { .. })
                ),
                "path {path}"
            );
        }
        assert_eq!(store.get_state(), &json!({}));

        store.set_value("$.items", json!([1, 2]), false).unwrap();
        store
            .set_value(&format!("$.items[{}]", 2 + MAX_ARRAY_GAP), json!(3), false)
            .unwrap();
        assert_eq!(store.get_state()["items"].as_array().map(Vec::len), Some(3 + MAX_ARRAY_GAP));
        assert!(store
            .set_value(&format!("$.items[{}]", 4 + 2 * MAX_ARRAY_GAP), json!(3), false)
            .is_err());
    }
}
