use super::{is_temp_file, read_json_file, relative_name, write_json_file};
use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Parses every file independently. A bad file lands in the error list and never
/// stops the rest.
pub fn parse_all<T, I>(files: I) -> (Vec<T>, Vec<ParseFailure>)
where
    T: DeserializeOwned,
    I: IntoIterator<Item = (PathBuf, Vec<u8>)>,
{
    let mut items = Vec::new();
    let mut errors = Vec::new();
    for (path, bytes) in files {
        match serde_json::from_slice::<T>(&bytes) {
            Ok(item) => items.push(item),
            Err(error) => errors.push(ParseFailure {
                path,
                message: error.to_string(),
            }),
        }
    }
    (items, errors)
}

/// Numeric `id` of a stored record; strings holding numbers are accepted and
/// anything else sorts as 0.
pub fn record_id(value: &Value) -> i64 {
    match value.get("id") {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

pub fn sort_newest_first(values: &mut [Value]) {
    values.sort_by(|a, b| record_id(b).cmp(&record_id(a)));
}

/// Folders of independently stored `*.json` records.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    root: PathBuf,
}

impl CollectionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder_path(&self, folder: &str) -> AppResult<PathBuf> {
        Ok(self.root.join(relative_name(folder)?))
    }

    pub fn item_path(&self, folder: &str, filename: &str) -> AppResult<PathBuf> {
        Ok(self.folder_path(folder)?.join(relative_name(filename)?))
    }

    /// Every readable record in `folder`, newest id first. Missing folders are
    /// created and yield an empty list.
    pub fn list_all(&self, folder: &str) -> AppResult<Vec<Value>> {
        let dir = self.folder_path(folder)?;
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|error| AppError::Io(error.to_string()))?;
            return Ok(Vec::new());
        }

        let files = read_json_files(&dir)?;
        let (mut values, failures) = parse_all::<Value, _>(files);
        for failure in &failures {
            tracing::warn!(
                path = %failure.path.to_string_lossy(),
                error = %failure.message,
                "skipping malformed collection file"
            );
        }
        values.retain(|value| {
            let keep = value.is_object();
            if !keep {
                tracing::warn!(folder = folder, "skipping non-object collection record");
            }
            keep
        });
        sort_newest_first(&mut values);
        Ok(values)
    }

    /// Typed listing. Records that parse as JSON but not as `T` are skipped too.
    pub fn list<T: DeserializeOwned>(&self, folder: &str) -> AppResult<Vec<T>> {
        let mut items = Vec::new();
        for value in self.list_all(folder)? {
            let id = record_id(&value);
            match serde_json::from_value::<T>(value) {
                Ok(item) => items.push(item),
                Err(error) => {
                    tracing::warn!(folder = folder, id = id, error = %error, "skipping record with unexpected shape");
                }
            }
        }
        Ok(items)
    }

    pub fn load_item<T: DeserializeOwned>(&self, folder: &str, filename: &str) -> AppResult<T> {
        let path = self.item_path(folder, filename)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("{}/{} not found", folder, filename)));
        }
        read_json_file(&path)
    }

    pub fn save_item<T: Serialize + ?Sized>(&self, folder: &str, filename: &str, value: &T) -> AppResult<PathBuf> {
        let path = self.item_path(folder, filename)?;
        write_json_file(&path, value)?;
        Ok(path)
    }

    pub fn delete_item(&self, folder: &str, filename: &str) -> AppResult<()> {
        let path = self.item_path(folder, filename)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("{}/{} not found", folder, filename)));
        }
        fs::remove_file(&path).map_err(|error| AppError::Io(error.to_string()))
    }

    pub fn item_exists(&self, folder: &str, filename: &str) -> bool {
        self.item_path(folder, filename)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

pub fn item_filename(id: i64) -> String {
    format!("{}.json", id)
}

fn read_json_files(dir: &Path) -> AppResult<Vec<(PathBuf, Vec<u8>)>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|error| AppError::Io(error.to_string()))? {
        let entry = entry.map_err(|error| AppError::Io(error.to_string()))?;
        let path = entry.path();
        let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
        if !is_json || !path.is_file() || is_temp_file(&path) {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match fs::read(&path) {
            Ok(bytes) => files.push((path, bytes)),
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "skipping unreadable collection file");
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, CollectionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CollectionStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn parse_all_separates_good_and_bad_files() {
        let files = vec![
            (PathBuf::from("1.json"), br#"{"id":1}"#.to_vec()),
            (PathBuf::from("2.json"), b"{broken".to_vec()),
            (PathBuf::from("3.json"), br#"{"id":3}"#.to_vec()),
        ];
        let (items, errors) = parse_all::<Value, _>(files);
        assert_eq!(items.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, PathBuf::from("2.json"));
    }

    #[test]
    fn listing_a_missing_folder_creates_it() {
        let (dir, store) = store();
        let items = store.list_all("snippets").expect("list");
        assert!(items.is_empty());
        assert!(dir.path().join("snippets").is_dir());
    }

    #[test]
    fn listing_sorts_by_id_descending() {
        let (_dir, store) = store();
        for id in [3, 1, 2] {
            store
                .save_item("goals", &item_filename(id), &json!({"id": id, "title": format!("g{}", id)}))
                .expect("save");
        }
        let ids: Vec<i64> = store.list_all("goals").expect("list").iter().map(record_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn poison_file_is_excluded_without_failing_the_listing() {
        let (dir, store) = store();
        for id in 1..=3 {
            store.save_item("notes", &item_filename(id), &json!({"id": id})).expect("save");
        }
        fs::write(dir.path().join("notes").join("bad.json"), b"{{{{").expect("poison");
        fs::write(dir.path().join("notes").join("readme.txt"), b"ignored").expect("non-json");

        let items = store.list_all("notes").expect("list survives poison");
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn missing_id_sorts_last() {
        let (_dir, store) = store();
        store.save_item("chats", "a.json", &json!({"title": "no id"})).expect("save");
        store.save_item("chats", "5.json", &json!({"id": 5})).expect("save");
        store.save_item("chats", "7.json", &json!({"id": "7"})).expect("save");
        let ids: Vec<i64> = store.list_all("chats").expect("list").iter().map(record_id).collect();
        assert_eq!(ids, vec![7, 5, 0]);
    }

    #[test]
    fn typed_listing_skips_wrong_shapes() {
        let (_dir, store) = store();
        store
            .save_item("notes", "1.json", &json!({"id": 1, "title": "ok"}))
            .expect("save");
        store.save_item("notes", "2.json", &json!({"id": 2})).expect("save");
        let notes: Vec<Note> = store.list("notes").expect("typed list");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "ok");
    }

    #[test]
    fn delete_missing_item_is_reported() {
        let (_dir, store) = store();
        store.save_item("bounties", "4.json", &json!({"id": 4})).expect("save");
        store.delete_item("bounties", "4.json").expect("delete");
        let error = store.delete_item("bounties", "4.json").expect_err("gone");
        assert!(error.is_not_found());
    }
}
