//! Save slots and settings on top of a pluggable storage backend.
//!
//! A [`SaveBackend`] is the seam to whatever database the host uses. Two
//! are provided: [`MemoryBackend`] and [`JsonFileBackend`], which keeps
//! everything in one JSON document rewritten atomically on each change.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::store::{PathStore, StoreError};
use crate::schema::save::{now_millis, SaveMeta, SaveRecord, SettingRecord, SYSTEM_SAVE_NAME};

/// File name used by [`JsonFileBackend`] inside its directory.
pub const SAVES_FILE_NAME: &str = "saves.json";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no save named '{0}'")]
    NotFound(String),
    #[error("'{0}' is reserved for the initial-state save")]
    ReservedName(String),
    #[error("no initial-state save has been recorded")]
    NoInitialState,
}

/// Storage for save and setting records.
///
/// `put_save` upserts by name (the system save by its flag) and
/// `put_setting` upserts by key; both return the record id.
/// `delete_all_saves` removes every user save in one step, keeps the system
/// save, and returns how many records it removed.
pub trait SaveBackend {
    fn put_save(&mut self, record: SaveRecord) -> Result<u64, PersistenceError>;
    fn saves(&self) -> Result<Vec<SaveRecord>, PersistenceError>;
    fn delete_save(&mut self, name: &str) -> Result<bool, PersistenceError>;
    fn delete_all_saves(&mut self) -> Result<usize, PersistenceError>;
    fn put_setting(&mut self, record: SettingRecord) -> Result<u64, PersistenceError>;
    fn settings(&self) -> Result<Vec<SettingRecord>, PersistenceError>;
}

impl<B: SaveBackend + ?Sized> SaveBackend for Box<B> {
    fn put_save(&mut self, record: SaveRecord) -> Result<u64, PersistenceError> {
        (**self).put_save(record)
    }

    fn saves(&self) -> Result<Vec<SaveRecord>, PersistenceError> {
        (**self).saves()
    }

    fn delete_save(&mut self, name: &str) -> Result<bool, PersistenceError> {
        (**self).delete_save(name)
    }

    fn delete_all_saves(&mut self) -> Result<usize, PersistenceError> {
        (**self).delete_all_saves()
    }

    fn put_setting(&mut self, record: SettingRecord) -> Result<u64, PersistenceError> {
        (**self).put_setting(record)
    }

    fn settings(&self) -> Result<Vec<SettingRecord>, PersistenceError> {
        (**self).settings()
    }
}

impl fmt::Debug for dyn SaveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SaveBackend")
    }
}

/// The two record tables with upsert rules and id allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tables {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    saves: Vec<SaveRecord>,
    #[serde(default)]
    settings: Vec<SettingRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn put_save(&mut self, mut record: SaveRecord) -> u64 {
        let existing = self.saves.iter().position(|s| {
            s.name == record.name || (record.is_system_save && s.is_system_save)
        });
        match existing {
            Some(index) => {
                let id = self.saves[index].id.unwrap_or(0);
                record.id = Some(id);
                self.saves[index] = record;
                id
            }
            None => {
                let id = self.allocate_id();
                record.id = Some(id);
                self.saves.push(record);
                id
            }
        }
    }

    fn delete_save(&mut self, name: &str) -> bool {
        let before = self.saves.len();
        self.saves.retain(|s| s.name != name);
        before != self.saves.len()
    }

    fn delete_all_saves(&mut self) -> usize {
        let before = self.saves.len();
        self.saves.retain(|s| s.is_system_save);
        before - self.saves.len()
    }

    fn put_setting(&mut self, mut record: SettingRecord) -> u64 {
        match self.settings.iter().position(|s| s.key == record.key) {
            Some(index) => {
                let id = self.settings[index].id.unwrap_or(0);
                record.id = Some(id);
                self.settings[index] = record;
                id
            }
            None => {
                let id = self.allocate_id();
                record.id = Some(id);
                self.settings.push(record);
                id
            }
        }
    }
}

/// Volatile backend for tests and tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Tables,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaveBackend for MemoryBackend {
    fn put_save(&mut self, record: SaveRecord) -> Result<u64, PersistenceError> {
        Ok(self.tables.put_save(record))
    }

    fn saves(&self) -> Result<Vec<SaveRecord>, PersistenceError> {
        Ok(self.tables.saves.clone())
    }

    fn delete_save(&mut self, name: &str) -> Result<bool, PersistenceError> {
        Ok(self.tables.delete_save(name))
    }

    fn delete_all_saves(&mut self) -> Result<usize, PersistenceError> {
        Ok(self.tables.delete_all_saves())
    }

    fn put_setting(&mut self, record: SettingRecord) -> Result<u64, PersistenceError> {
        Ok(self.tables.put_setting(record))
    }

    fn settings(&self) -> Result<Vec<SettingRecord>, PersistenceError> {
        Ok(self.tables.settings.clone())
    }
}

/// Backend keeping every record in `<dir>/saves.json`.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
    tables: Tables,
}

impl JsonFileBackend {
    /// Open (or start) the save file in `dir`.
    pub fn open(dir: &Path) -> Result<Self, PersistenceError> {
        let path = dir.join(SAVES_FILE_NAME);
        let tables = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Tables::default(),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };
        debug!(path = %path.display(), saves = tables.saves.len(), "save_file_opened");
        Ok(Self { path, tables })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        let text = serde_json::to_string_pretty(&self.tables)?;
        write_text_atomic(&self.path, &text).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Apply `change` to a copy and commit it only if the write succeeds.
    fn commit<R>(&mut self, change: impl FnOnce(&mut Tables) -> R) -> Result<R, PersistenceError> {
        let previous = self.tables.clone();
        let result = change(&mut self.tables);
        if let Err(error) = self.flush() {
            warn!(path = %self.path.display(), error = %error, "save_file_write_failed");
            self.tables = previous;
            return Err(error);
        }
        Ok(result)
    }
}

impl SaveBackend for JsonFileBackend {
    fn put_save(&mut self, record: SaveRecord) -> Result<u64, PersistenceError> {
        self.commit(|t| t.put_save(record))
    }

    fn saves(&self) -> Result<Vec<SaveRecord>, PersistenceError> {
        Ok(self.tables.saves.clone())
    }

    fn delete_save(&mut self, name: &str) -> Result<bool, PersistenceError> {
        self.commit(|t| t.delete_save(name))
    }

    fn delete_all_saves(&mut self) -> Result<usize, PersistenceError> {
        self.commit(Tables::delete_all_saves)
    }

    fn put_setting(&mut self, record: SettingRecord) -> Result<u64, PersistenceError> {
        self.commit(|t| t.put_setting(record))
    }

    fn settings(&self) -> Result<Vec<SettingRecord>, PersistenceError> {
        Ok(self.tables.settings.clone())
    }
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(SAVES_FILE_NAME);
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Save-slot operations over a [`PathStore`].
#[derive(Debug)]
pub struct SaveManager<B> {
    backend: B,
    version: String,
}

impl<B: SaveBackend> SaveManager<B> {
    pub fn new(backend: B, version: &str) -> Self {
        Self {
            backend,
            version: version.to_string(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn record(&self, store: &PathStore, name: &str, meta: SaveMeta, system: bool) -> SaveRecord {
        SaveRecord {
            id: None,
            name: name.to_string(),
            game_data: store.get_state().clone(),
            timestamp: now_millis(),
            version: self.version.clone(),
            screenshot: meta.screenshot,
            description: meta.description,
            is_system_save: system,
        }
    }

    /// Snapshot the store into the slot `name`, replacing any earlier save
    /// with that name.
    pub fn save_game(
        &mut self,
        store: &PathStore,
        name: &str,
        meta: SaveMeta,
    ) -> Result<u64, PersistenceError> {
        if name == SYSTEM_SAVE_NAME {
            return Err(PersistenceError::ReservedName(name.to_string()));
        }
        let id = self.backend.put_save(self.record(store, name, meta, false))?;
        info!(name, id, "game_saved");
        Ok(id)
    }

    /// Replace the store wholesale with the slot's snapshot.
    pub fn load_game(&self, store: &mut PathStore, name: &str) -> Result<SaveRecord, PersistenceError> {
        let record = self
            .find(name)?
            .ok_or_else(|| PersistenceError::NotFound(name.to_string()))?;
        store.set_state(record.game_data.clone())?;
        info!(name, version = %record.version, "game_loaded");
        Ok(record)
    }

    fn find(&self, name: &str) -> Result<Option<SaveRecord>, PersistenceError> {
        Ok(self.backend.saves()?.into_iter().find(|s| s.name == name))
    }

    /// User saves, newest first. The initial-state save is never listed.
    pub fn list_saves(&self) -> Result<Vec<SaveRecord>, PersistenceError> {
        let mut saves: Vec<SaveRecord> = self
            .backend
            .saves()?
            .into_iter()
            .filter(|s| !s.is_system_save)
            .collect();
        saves.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(saves)
    }

    pub fn delete_save(&mut self, name: &str) -> Result<bool, PersistenceError> {
        if name == SYSTEM_SAVE_NAME {
            return Err(PersistenceError::ReservedName(name.to_string()));
        }
        let deleted = self.backend.delete_save(name)?;
        debug!(name, deleted, "save_deleted");
        Ok(deleted)
    }

    /// Delete every user save; the initial-state save survives.
    pub fn delete_all_saves(&mut self) -> Result<usize, PersistenceError> {
        let removed = self.backend.delete_all_saves()?;
        info!(removed, "saves_cleared");
        Ok(removed)
    }

    /// Record the current store as the initial state for new games.
    pub fn save_initial_state(&mut self, store: &PathStore) -> Result<u64, PersistenceError> {
        let record = self.record(store, SYSTEM_SAVE_NAME, SaveMeta::default(), true);
        let id = self.backend.put_save(record)?;
        debug!(id, "initial_state_saved");
        Ok(id)
    }

    pub fn has_initial_state(&self) -> Result<bool, PersistenceError> {
        Ok(self.backend.saves()?.iter().any(|s| s.is_system_save))
    }

    pub fn restore_initial_state(&self, store: &mut PathStore) -> Result<(), PersistenceError> {
        let record = self
            .backend
            .saves()?
            .into_iter()
            .find(|s| s.is_system_save)
            .ok_or(PersistenceError::NoInitialState)?;
        store.set_state(record.game_data)?;
        debug!("initial_state_restored");
        Ok(())
    }

    pub fn set_setting(&mut self, key: &str, value: Value) -> Result<u64, PersistenceError> {
        self.backend.put_setting(SettingRecord {
            id: None,
            key: key.to_string(),
            value,
            timestamp: now_millis(),
            version: self.version.clone(),
        })
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self
            .backend
            .settings()?
            .into_iter()
            .find(|s| s.key == key)
            .map(|s| s.value))
    }

    pub fn get_setting_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        match self.get_setting(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
