//! PathStore integration tests: path writes, reads and the reserved namespace.

use narrative_state::core::store::{PathStore, StoreError, SYSTEM_PREFIX};
use serde_json::{json, Value};

fn store_with(state: Value) -> PathStore {
    let mut store = PathStore::new();
    store.set_state(state).unwrap();
    store
}

#[test]
fn nested_write_on_empty_store_creates_objects() {
    let mut store = PathStore::new();
    store.set_value("$.player.stats.str", json!(10), false).unwrap();
    assert_eq!(store.get_state(), &json!({ "player": { "stats": { "str": 10 } } }));
}

#[test]
fn index_write_into_empty_array() {
    let mut store = PathStore::new();
    store.set_value("$.items", json!([]), false).unwrap();
    store.set_value("$.items[0]", json!("sword"), false).unwrap();
    assert_eq!(store.get_state()["items"], json!(["sword"]));
}

#[test]
fn written_values_read_back() {
    let mut store = PathStore::new();
    let cases = [
        ("$.name", json!("Ada")),
        ("$.flags.met_king", json!(true)),
        ("$.inventory[2]", json!({ "id": "torch" })),
        ("$['odd.key']", json!(1.5)),
        ("$.matrix[1][0]", json!(null)),
    ];
    for (path, value) in cases {
        store.set_value(path, value.clone(), false).unwrap();
        assert_eq!(store.get_value(path).unwrap(), vec![&value], "path {path}");
    }
    assert_eq!(store.get_state()["inventory"], json!([null, null, { "id": "torch" }]));
}

#[test]
fn set_state_of_get_state_is_idempotent() {
    let mut store = store_with(json!({ "a": [1, 2, { "b": null }], "c": "d" }));
    let before = store.get_state().clone();
    store.set_state(before.clone()).unwrap();
    assert_eq!(store.get_state(), &before);
}

#[test]
fn wildcard_reads_and_writes_every_match() {
    let mut store = store_with(json!({
        "npcs": { "bob": { "mood": "calm" }, "eve": { "mood": "angry" } }
    }));
    let moods = store.get_value("$.npcs.*.mood").unwrap();
    assert_eq!(moods.len(), 2);

    let written = store.set_value("$.npcs.*.mood", json!("happy"), false).unwrap();
    assert_eq!(written, 2);
    let moods: Vec<String> = store.get_typed("$.npcs.*.mood").unwrap();
    assert_eq!(moods, vec!["happy".to_string(), "happy".to_string()]);

    assert_eq!(store.set_value("$.nobody.*.mood", json!("x"), false).unwrap(), 0);
    assert!(store.get_state().get("nobody").is_none());
}

#[test]
fn missing_paths_read_as_empty() {
    let store = store_with(json!({ "list": [1] }));
    assert!(store.get_value("$.nope.deeper").unwrap().is_empty());
    assert!(store.get_value("$.list[5]").unwrap().is_empty());
    assert!(store.get_value("$.list.name").unwrap().is_empty());
}

#[test]
fn reserved_namespace_requires_permission() {
    let mut store = store_with(json!({ "visible": 1 }));
    let before = store.get_state().clone();
    for path in ["$._system", "$._system.flags", "$.a._system", "$['_system'].x"] {
        let err = store.set_value(path, json!(1), false).unwrap_err();
        assert!(matches!(err, StoreError::Protected { .. }), "path {path}");
        assert_eq!(store.get_state(), &before);
    }
    store
        .set_value(&format!("$.{SYSTEM_PREFIX}.version"), json!(2), true)
        .unwrap();
    assert_eq!(store.get_state()["_system"]["version"], json!(2));
}

#[test]
fn structural_conflict_leaves_store_untouched() {
    let mut store = store_with(json!({ "list": [1, 2], "obj": { "k": 1 } }));
    let before = store.get_state().clone();
    assert!(matches!(
        store.set_value("$.list.name.deep", json!(1), false),
        Err(StoreError::Structure { .. })
    ));
    assert!(matches!(
        store.set_value("$.obj[0].deep", json!(1), false),
        Err(StoreError::Structure { .. })
    ));
    assert!(matches!(
        store.set_value("$.fresh.branch.list.name", json!(1), false),
        Ok(1)
    ));
    store.set_state(before.clone()).unwrap();
    assert!(store.set_value("$.obj.k.deeper", json!(1), false).is_err());
    assert_eq!(store.get_state(), &before);
}

#[test]
fn non_object_state_is_rejected() {
    let mut store = store_with(json!({ "keep": true }));
    for bad in [json!(null), json!([1]), json!("text"), json!(3)] {
        assert!(matches!(
            store.set_state(bad),
            Err(StoreError::NotAnObject { .. })
        ));
    }
    assert!(store.set_value("$", json!(7), false).is_err());
    assert_eq!(store.get_state(), &json!({ "keep": true }));
}

#[test]
fn overwrite_may_change_type() {
    let mut store = store_with(json!({ "x": "text" }));
    store.set_value("$.x", json!(42), false).unwrap();
    assert_eq!(store.get_state()["x"], json!(42));
}

#[test]
fn snapshot_restores_exact_tree() {
    let store = store_with(json!({ "a": { "b": [1, 2.5, "c"] } }));
    let text = store.snapshot().unwrap();
    let mut other = PathStore::new();
    other.restore(&text).unwrap();
    assert_eq!(other, store);
    assert!(other.restore("[1, 2]").is_err());
    assert!(matches!(other.restore("{"), Err(StoreError::Json(_))));
}

#[test]
fn malformed_paths_are_errors() {
    let mut store = PathStore::new();
    for path in ["player", "$.", "$[", "$.a..b", "$['unterminated"] {
        assert!(matches!(store.get_value(path), Err(StoreError::Path(_))), "path {path}");
        assert!(store.set_value(path, json!(1), false).is_err());
    }
    assert_eq!(store.get_state(), &json!({}));
}
