//! Persisted humor preference.
//!
//! The humor level survives across sessions in a small TOML file under the
//! fixed key `humor_level`. Stored values are clamped on load, so a
//! hand-edited file can never push the level out of range.

use crate::error::{AppError, AppResult};
use crate::persona::HumorLevel;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key the humor level is stored under.
pub const HUMOR_LEVEL_KEY: &str = "humor_level";

pub trait PreferenceStore: Send + Sync + Debug {
    /// `None` when nothing has been stored yet.
    fn load_humor(&self) -> AppResult<Option<HumorLevel>>;
    fn save_humor(&self, level: HumorLevel) -> AppResult<()>;

    /// Stored level, or `default` when missing or unreadable.
    fn humor_or(&self, default: HumorLevel) -> HumorLevel {
        match self.load_humor() {
            Ok(level) => level.unwrap_or(default),
            Err(err) => {
                tracing::warn!(error = %err, "Falling back to default humor level");
                default
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    humor_level: Option<i64>,
}

/// TOML-file backed store.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> AppResult<PreferencesFile> {
        if !self.path.exists() {
            return Ok(PreferencesFile::default());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| AppError::Persistence(format!("Failed to read {}: {}", self.path.display(), e)))?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Persistence(format!("Invalid preferences file {}: {}", self.path.display(), e)))
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load_humor(&self) -> AppResult<Option<HumorLevel>> {
        Ok(self.read()?.humor_level.map(HumorLevel::clamped))
    }

    fn save_humor(&self, level: HumorLevel) -> AppResult<()> {
        let mut file = self.read().unwrap_or_default();
        file.humor_level = Some(level.value() as i64);

        let contents = toml::to_string(&file)
            .map_err(|e| AppError::Persistence(format!("Failed to encode preferences: {}", e)))?;
        fs::write(&self.path, contents)
            .map_err(|e| AppError::Persistence(format!("Failed to write {}: {}", self.path.display(), e)))
    }
}

/// Process-local store for tests and sessions without a file.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    humor: Mutex<Option<HumorLevel>>,
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn load_humor(&self) -> AppResult<Option<HumorLevel>> {
        self.humor
            .lock()
            .map(|h| *h)
            .map_err(|_| AppError::Persistence("preference lock poisoned".to_string()))
    }

    fn save_humor(&self, level: HumorLevel) -> AppResult<()> {
        let mut humor = self
            .humor
            .lock()
            .map_err(|_| AppError::Persistence("preference lock poisoned".to_string()))?;
        *humor = Some(level);
        Ok(())
    }
}
