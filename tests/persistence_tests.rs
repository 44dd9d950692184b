//! Save slot integration tests against the file backend.

use narrative_state::core::context::GameContext;
use narrative_state::core::persistence::{JsonFileBackend, PersistenceError, SaveManager};
use narrative_state::core::store::PathStore;
use narrative_state::schema::save::{SaveMeta, SYSTEM_SAVE_NAME};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

#[test]
fn saves_list_newest_first_without_system_save() {
    let dir = TempDir::new().unwrap();
    let mut saves = SaveManager::new(JsonFileBackend::open(dir.path()).unwrap(), "1.0.0");
    let mut store = PathStore::new();

    saves.save_initial_state(&store).unwrap();
    for turn in 1..=3 {
        store.set_value("$.turn", json!(turn), false).unwrap();
        saves
            .save_game(&store, &format!("turn {turn}"), SaveMeta::default())
            .unwrap();
    }

    let listed = saves.list_saves().unwrap();
    let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["turn 3", "turn 2", "turn 1"]);
    assert!(listed.iter().all(|s| s.name != SYSTEM_SAVE_NAME));
}

#[test]
fn file_holds_camel_case_records() {
    let dir = TempDir::new().unwrap();
    let mut saves = SaveManager::new(JsonFileBackend::open(dir.path()).unwrap(), "1.0.0");
    let mut store = PathStore::new();
    store.set_value("$.gold", json!(12), false).unwrap();
    saves
        .save_game(&store, "camp", SaveMeta::described("Before the bridge"))
        .unwrap();

    let text = fs::read_to_string(saves.backend().path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let record = &doc["saves"][0];
    assert_eq!(record["name"], json!("camp"));
    assert_eq!(record["gameData"], json!({ "gold": 12 }));
    assert_eq!(record["isSystemSave"], json!(false));
    assert_eq!(record["description"], json!("Before the bridge"));
}

#[test]
fn corrupt_save_file_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("saves.json"), "{ not json").unwrap();
    assert!(matches!(
        JsonFileBackend::open(dir.path()),
        Err(PersistenceError::Json(_))
    ));
}

#[test]
fn context_with_saves_dir_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut ctx = GameContext::builder()
            .version("3.0.0")
            .saves_dir(dir.path())
            .build()
            .unwrap();
        let hero = ctx.spawn_entity("hero").unwrap();
        hero.set("level", 4).unwrap();
        ctx.save_game("quick", SaveMeta::default()).unwrap();
    }

    let mut ctx = GameContext::builder()
        .saves_dir(dir.path())
        .build()
        .unwrap();
    let hero = ctx.spawn_entity("hero").unwrap();
    assert!(hero.get("level").is_none());
    let record = ctx.load_game("quick").unwrap();
    assert_eq!(record.version, "3.0.0");
    assert_eq!(hero.get_as::<i64>("level"), Some(4));
}

#[test]
fn config_file_selects_the_backend() {
    let dir = TempDir::new().unwrap();
    let saves_dir = dir.path().join("slots");
    let config_path = dir.path().join("engine.ron");
    fs::write(
        &config_path,
        format!("(game_version: \"0.5.0\", saves_dir: Some({:?}))", saves_dir),
    )
    .unwrap();

    let mut ctx = GameContext::builder().config_file(&config_path).build().unwrap();
    ctx.save_game("first", SaveMeta::default()).unwrap();
    assert!(saves_dir.join("saves.json").exists());
    assert_eq!(ctx.saves().list_saves().unwrap()[0].version, "0.5.0");
}
