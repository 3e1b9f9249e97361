use super::{read_json_file, relative_name, write_json_file};
use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_DOC: &str = "settings.json";
pub const PROFILE_DOC: &str = "UserProfile.json";
pub const LOGS_DOC: &str = "BasicLogs.json";
pub const ACHIEVEMENTS_DOC: &str = "achievements.json";
pub const PROGRESS_DOC: &str = "progress.json";
pub const WALLET_DOC: &str = "wallet/wallet.json";

/// Single named JSON documents addressed relative to the data root.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> AppResult<PathBuf> {
        Ok(self.root.join(relative_name(name)?))
    }

    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> AppResult<()> {
        let path = self.path_for(name)?;
        write_json_file(&path, value)?;
        tracing::debug!(document = name, "document saved");
        Ok(())
    }

    /// Absent documents come back as `AppError::NotFound`, never as an IO failure.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> AppResult<T> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Document '{}' not found", name)));
        }
        read_json_file(&path)
    }

    pub fn load_optional<T: DeserializeOwned>(&self, name: &str) -> AppResult<Option<T>> {
        match self.load(name) {
            Ok(value) => Ok(Some(value)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> AppResult<T> {
        Ok(self.load_optional(name)?.unwrap_or_default())
    }

    pub fn delete(&self, name: &str) -> AppResult<()> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Document '{}' not found", name)));
        }
        fs::remove_file(&path).map_err(|error| AppError::Io(error.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.is_file()).unwrap_or(false)
    }
}
