pub mod collection;
pub mod document;
pub mod media;

pub use collection::{parse_all, CollectionStore, ParseFailure};
pub use document::DocumentStore;
pub use media::{mime_for, MediaStore};

use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Rejects anything that could escape the directory it is joined onto.
pub(crate) fn relative_name(name: &str) -> AppResult<PathBuf> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }
    let candidate = Path::new(trimmed);
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::Validation(format!("Invalid path component in '{}'", name)));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(AppError::Validation(format!("Invalid name '{}'", name)));
    }
    Ok(clean)
}

pub(crate) fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_file_atomic(path, &bytes)
}

/// Writes next to the target and renames over it so readers never observe a
/// half-written file.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let temp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if let Err(error) = written {
        let _ = fs::remove_file(&temp);
        return Err(AppError::Io(format!("Failed to write {}: {}", path.display(), error)));
    }
    Ok(())
}

pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = fs::read(path).map_err(|error| match error.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound(path.display().to_string()),
        _ => AppError::Io(format!("Failed to read {}: {}", path.display(), error)),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|error| AppError::Parse(format!("{}: {}", path.display(), error)))
}

pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.') && name.ends_with(".tmp"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_name_rejects_escapes() {
        assert!(relative_name("../outside.json").is_err());
        assert!(relative_name("/etc/passwd").is_err());
        assert!(relative_name("   ").is_err());
        assert!(relative_name("notes/../../x").is_err());
        assert_eq!(
            relative_name("wallet/wallet.json").expect("nested name"),
            PathBuf::from("wallet").join("wallet.json")
        );
        assert_eq!(relative_name("./settings.json").expect("cur dir"), PathBuf::from("settings.json"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested").join("doc.json");
        write_json_file(&target, &serde_json::json!({"a": 1})).expect("write");
        write_json_file(&target, &serde_json::json!({"a": 2})).expect("overwrite");

        let value: serde_json::Value = read_json_file(&target).expect("read");
        assert_eq!(value["a"], 2);
        let leftovers = fs::read_dir(target.parent().expect("parent"))
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| is_temp_file(&entry.path()))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn reading_missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = read_json_file::<serde_json::Value>(&dir.path().join("absent.json")).expect_err("missing");
        assert!(error.is_not_found());
    }
}
