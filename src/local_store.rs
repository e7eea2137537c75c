//! Local key-value store
//!
//! Anonymous users' data lives as pretty-printed JSON files in `~/.crewcal/`,
//! one file per key (`modifications.json`, `settings.json`). Malformed or
//! unreadable JSON is logged and treated as absent so a corrupt file can
//! never wedge startup.

use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::settings::UserSettings;
use crate::types::{ShiftModification, StorageData};

/// Key for the override list.
pub const MODIFICATIONS_KEY: &str = "modifications";
/// Key for the settings singleton.
pub const SETTINGS_KEY: &str = "settings";

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at an explicit directory. The directory is
    /// created lazily on first write.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Open the canonical store at `~/.crewcal/`.
    pub fn open_default() -> Result<Self, StorageError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::Local("Could not find home directory".to_string()))?;
        Ok(Self::new(home.join(".crewcal")))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Load everything currently persisted, substituting defaults for
    /// missing or malformed keys.
    pub fn load_data(&self) -> StorageData {
        StorageData {
            modifications: self.read_key(MODIFICATIONS_KEY).unwrap_or_default(),
            settings: self.read_key(SETTINGS_KEY).unwrap_or_default(),
        }
    }

    fn read_key<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.key_path(key);
        if !path.exists() {
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(
                    "Malformed JSON in {}, using defaults: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    fn write_key<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        let content = serde_json::to_string_pretty(value)?;
        fs::write(self.key_path(key), content)?;
        Ok(())
    }

    pub fn write_modifications(
        &self,
        modifications: &[ShiftModification],
    ) -> Result<(), StorageError> {
        self.write_key(MODIFICATIONS_KEY, &modifications)
    }

    pub fn write_settings(&self, settings: &UserSettings) -> Result<(), StorageError> {
        self.write_key(SETTINGS_KEY, settings)
    }

    /// Remove both keys. Used after the one-time migration to a remote
    /// document, so stale local data can't be migrated twice.
    pub fn clear(&self) -> Result<(), StorageError> {
        for key in [MODIFICATIONS_KEY, SETTINGS_KEY] {
            let path = self.key_path(key);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
