pub mod achievements;
pub mod bounties;
pub mod chats;
pub mod daily_logs;
pub mod goals;
pub mod notes;
pub mod profile;
pub mod snippets;
pub mod wallet;

use crate::errors::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::models::RecordId;
use crate::store::collection::item_filename;
use crate::store::{CollectionStore, DocumentStore};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Shared plumbing for every manager: the stores, the per-file locks and a
/// counter that ticks on every successful mutation.
#[derive(Clone)]
pub struct StoreContext {
    pub documents: DocumentStore,
    pub collections: CollectionStore,
    pub locks: KeyedLocks,
    changes: Arc<watch::Sender<u64>>,
}

impl StoreContext {
    pub fn new(documents: DocumentStore, collections: CollectionStore) -> Self {
        let (sender, _receiver) = watch::channel(0u64);
        Self {
            documents,
            collections,
            locks: KeyedLocks::new(),
            changes: Arc::new(sender),
        }
    }

    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn touched(&self, domain: &'static str) {
        self.changes.send_modify(|counter| *counter += 1);
        tracing::debug!(domain, "data changed");
    }

    /// Picks an unused time-based id and writes the new record while holding the
    /// folder lock, so two creates in the same millisecond still differ.
    pub(crate) async fn create_item<T, F>(&self, folder: &str, build: F) -> AppResult<T>
    where
        T: Serialize,
        F: FnOnce(RecordId) -> AppResult<T>,
    {
        let dir = self.collections.folder_path(folder)?;
        let _guard = self.locks.acquire(&dir).await;
        let mut id = Utc::now().timestamp_millis();
        while self.collections.item_exists(folder, &item_filename(id)) {
            id += 1;
        }
        let item = build(id)?;
        self.collections.save_item(folder, &item_filename(id), &item)?;
        Ok(item)
    }

    pub(crate) fn load_item<T: DeserializeOwned>(&self, folder: &str, id: RecordId) -> AppResult<T> {
        self.collections
            .load_item(folder, &item_filename(id))
            .map_err(|error| not_found_as(error, folder, id))
    }

    /// Load, change and rewrite one record under its file lock.
    pub(crate) async fn mutate_item<T, R, F>(&self, folder: &str, id: RecordId, change: F) -> AppResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> AppResult<R>,
    {
        let filename = item_filename(id);
        let path = self.collections.item_path(folder, &filename)?;
        let _guard = self.locks.acquire(&path).await;
        let mut item: T = self
            .collections
            .load_item(folder, &filename)
            .map_err(|error| not_found_as(error, folder, id))?;
        let result = change(&mut item)?;
        self.collections.save_item(folder, &filename, &item)?;
        Ok(result)
    }

    pub(crate) async fn put_item<T: Serialize>(&self, folder: &str, id: RecordId, item: &T) -> AppResult<()> {
        let filename = item_filename(id);
        let path = self.collections.item_path(folder, &filename)?;
        let _guard = self.locks.acquire(&path).await;
        self.collections.save_item(folder, &filename, item)?;
        Ok(())
    }

    pub(crate) async fn remove_item(&self, folder: &str, id: RecordId) -> AppResult<()> {
        let filename = item_filename(id);
        let path = self.collections.item_path(folder, &filename)?;
        let _guard = self.locks.acquire(&path).await;
        self.collections
            .delete_item(folder, &filename)
            .map_err(|error| not_found_as(error, folder, id))
    }

    /// Same as `mutate_item` for singleton documents; absence starts from default.
    pub(crate) async fn mutate_document<T, R, F>(&self, name: &str, change: F) -> AppResult<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> AppResult<R>,
    {
        let path = self.documents.path_for(name)?;
        let _guard = self.locks.acquire(&path).await;
        let mut document: T = self.documents.load_or_default(name)?;
        let result = change(&mut document)?;
        self.documents.save(name, &document)?;
        Ok(result)
    }
}

fn not_found_as(error: AppError, folder: &str, id: RecordId) -> AppError {
    match error {
        AppError::NotFound(_) => AppError::NotFound(format!("No record {} in {}", id, folder)),
        other => other,
    }
}

/// Time-based id that is guaranteed not to collide with `taken`.
pub fn next_nested_id<I: IntoIterator<Item = RecordId>>(taken: I) -> RecordId {
    let candidate = Utc::now().timestamp_millis();
    match taken.into_iter().max() {
        Some(max) if max >= candidate => max + 1,
        _ => candidate,
    }
}

pub fn is_iso_date(value: &str) -> bool {
    ISO_DATE.is_match(value) && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub(crate) fn require_text(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn require_date(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if !is_iso_date(trimmed) {
        return Err(AppError::Validation(format!("{} must be a YYYY-MM-DD date, got '{}'", field, value)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
pub(crate) fn test_context() -> (tempfile::TempDir, StoreContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    crate::paths::ensure_layout(dir.path()).expect("layout");
    let ctx = StoreContext::new(DocumentStore::new(dir.path()), CollectionStore::new(dir.path()));
    (dir, ctx)
}
