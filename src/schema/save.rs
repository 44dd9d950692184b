//! Save slot and settings records, as exchanged with the storage backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the one record that holds the initial game state.
pub const SYSTEM_SAVE_NAME: &str = "__initial_state__";

/// A full state snapshot plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    /// Assigned by the backend on first insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub game_data: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system_save: bool,
}

/// A single key/value setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub key: String,
    pub value: Value,
    pub timestamp: u64,
    pub version: String,
}

/// Optional metadata supplied when saving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveMeta {
    pub screenshot: Option<String>,
    pub description: Option<String>,
}

impl SaveMeta {
    pub fn described(description: &str) -> Self {
        Self {
            screenshot: None,
            description: Some(description.to_string()),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_record_uses_camel_case_fields() {
        let record = SaveRecord {
            id: None,
            name: "slot1".to_string(),
            game_data: json!({ "player": { "hp": 3 } }),
            timestamp: 42,
            version: "1.0.0".to_string(),
            screenshot: None,
            description: Some("Before the duel".to_string()),
            is_system_save: false,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["gameData"]["player"]["hp"], json!(3));
        assert_eq!(value["isSystemSave"], json!(false));
        assert!(value.get("id").is_none());
        assert!(value.get("screenshot").is_none());
    }

    #[test]
    fn system_flag_defaults_to_false() {
        let record: SaveRecord = serde_json::from_value(json!({
            "name": "slot",
            "gameData": {},
            "timestamp": 1,
            "version": "0.1.0"
        }))
        .unwrap();
        assert!(!record.is_system_save);
        assert_eq!(record.id, None);
    }
}
