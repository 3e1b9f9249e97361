use crate::backup::BackupEngine;
use crate::errors::{AppError, AppResult};
use crate::export::{summarize, ExportEngine};
use crate::managers::achievements::AchievementManager;
use crate::managers::bounties::BountyManager;
use crate::managers::chats::{ChatManager, HeuristicTitler, TitleGenerator};
use crate::managers::daily_logs::DailyLogManager;
use crate::managers::goals::GoalManager;
use crate::managers::notes::NoteManager;
use crate::managers::profile::ProfileManager;
use crate::managers::snippets::SnippetManager;
use crate::managers::wallet::WalletManager;
use crate::managers::StoreContext;
use crate::models::{
    AppSettings, BackupOutcome, ExportResponse, MediaDataUrl, Notification, RestoreOutcome, SavedMedia,
};
use crate::notify::Notifier;
use crate::paths::AppPaths;
use crate::store::document::SETTINGS_DOC;
use crate::store::{CollectionStore, DocumentStore, MediaStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Everything the UI talks to, rooted at one data folder.
pub struct Vault {
    paths: AppPaths,
    ctx: StoreContext,
    media: MediaStore,
    backup: BackupEngine,
    notifier: Notifier,
    pub daily_logs: DailyLogManager,
    pub goals: GoalManager,
    pub bounties: BountyManager,
    pub notes: NoteManager,
    pub snippets: SnippetManager,
    pub wallet: WalletManager,
    pub chats: ChatManager,
    pub profile: ProfileManager,
    pub achievements: AchievementManager,
}

impl Vault {
    pub fn open(paths: AppPaths) -> AppResult<Self> {
        Self::open_with_titler(paths, Arc::new(HeuristicTitler))
    }

    /// Creates the folder layout if needed; failure here means the app cannot run.
    pub fn open_with_titler(paths: AppPaths, titler: Arc<dyn TitleGenerator>) -> AppResult<Self> {
        paths.ensure_layout()?;
        let documents = DocumentStore::new(&paths.root);
        let collections = CollectionStore::new(&paths.root);
        let media = MediaStore::new(paths.media_dir());
        let ctx = StoreContext::new(documents, collections);
        let notifier = Notifier::new();
        tracing::info!(root = %paths.root.display(), logs = %paths.logs.display(), "vault opened");

        Ok(Self {
            backup: BackupEngine::new(&paths.root),
            daily_logs: DailyLogManager::new(ctx.clone()),
            goals: GoalManager::new(ctx.clone()),
            bounties: BountyManager::new(ctx.clone()),
            notes: NoteManager::new(ctx.clone()),
            snippets: SnippetManager::new(ctx.clone()),
            wallet: WalletManager::new(ctx.clone()),
            chats: ChatManager::new(ctx.clone(), titler),
            profile: ProfileManager::new(ctx.clone(), media.clone()),
            achievements: AchievementManager::new(ctx.clone(), notifier.clone()),
            paths,
            ctx,
            media,
            notifier,
        })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn root_path(&self) -> PathBuf {
        self.paths.root.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    // Generic documents

    pub fn read_document(&self, name: &str) -> AppResult<Value> {
        self.ctx.documents.load(name)
    }

    pub async fn write_document(&self, name: &str, value: &Value) -> AppResult<()> {
        let path = self.ctx.documents.path_for(name)?;
        let _guard = self.ctx.locks.acquire(&path).await;
        self.ctx.documents.save(name, value)?;
        self.ctx.touched("documents");
        Ok(())
    }

    pub async fn delete_document(&self, name: &str) -> AppResult<()> {
        let path = self.ctx.documents.path_for(name)?;
        let _guard = self.ctx.locks.acquire(&path).await;
        self.ctx.documents.delete(name)?;
        self.ctx.touched("documents");
        Ok(())
    }

    pub fn document_exists(&self, name: &str) -> bool {
        self.ctx.documents.exists(name)
    }

    // Generic collections

    pub fn list_collection(&self, folder: &str) -> AppResult<Vec<Value>> {
        self.ctx.collections.list_all(folder)
    }

    pub async fn save_collection_item(&self, folder: &str, filename: &str, value: &Value) -> AppResult<PathBuf> {
        let path = self.ctx.collections.item_path(folder, filename)?;
        let _guard = self.ctx.locks.acquire(&path).await;
        let saved = self.ctx.collections.save_item(folder, filename, value)?;
        self.ctx.touched("collections");
        Ok(saved)
    }

    pub async fn delete_collection_item(&self, folder: &str, filename: &str) -> AppResult<()> {
        let path = self.ctx.collections.item_path(folder, filename)?;
        let _guard = self.ctx.locks.acquire(&path).await;
        self.ctx.collections.delete_item(folder, filename)?;
        self.ctx.touched("collections");
        Ok(())
    }

    // Media

    pub fn save_media(&self, filename: &str, bytes: &[u8]) -> AppResult<SavedMedia> {
        self.media.save_binary(filename, bytes)
    }

    pub fn read_media_as_data_url(&self, filename: &str) -> AppResult<MediaDataUrl> {
        self.media.read_as_data_url(filename)
    }

    pub fn read_media_as_text(&self, filename: &str) -> AppResult<String> {
        self.media.read_as_text(filename)
    }

    // Settings

    /// A settings file that no longer parses falls back to defaults.
    pub fn settings(&self) -> AppResult<AppSettings> {
        match self.ctx.documents.load_or_default(SETTINGS_DOC) {
            Err(AppError::Parse(message)) => {
                tracing::warn!(error = %message, "settings unreadable, using defaults");
                Ok(AppSettings::default())
            }
            other => other,
        }
    }

    /// Deep-merges `patch` into the stored settings. The merged result must still
    /// be a valid settings object or nothing is written.
    pub async fn update_settings(&self, patch: Value) -> AppResult<AppSettings> {
        if !patch.is_object() {
            return Err(AppError::Validation("Settings update must be a JSON object".to_string()));
        }
        let path = self.ctx.documents.path_for(SETTINGS_DOC)?;
        let _guard = self.ctx.locks.acquire(&path).await;
        let mut merged = serde_json::to_value(self.settings()?)?;
        merge_json(&mut merged, patch);
        let settings: AppSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::Validation(format!("Invalid settings: {}", error)))?;
        self.ctx.documents.save(SETTINGS_DOC, &settings)?;
        tracing::info!(
            recent_window_days = settings.recent_window_days,
            achievements_enabled = settings.achievements_enabled,
            "settings updated"
        );
        Ok(settings)
    }

    /// Configured folder, else the user's documents folder, else home.
    pub fn export_dir(&self) -> AppResult<PathBuf> {
        let settings = self.settings()?;
        if let Some(dir) = settings.export_dir.as_deref().map(str::trim).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| AppError::Io("No documents or home folder available for exports".to_string()))
    }

    fn export_engine(&self) -> AppResult<ExportEngine> {
        Ok(ExportEngine::new(
            self.ctx.documents.clone(),
            self.ctx.collections.clone(),
            self.export_dir()?,
        ))
    }

    // Backup, restore and export

    pub async fn create_backup(&self, destination: Option<PathBuf>) -> AppResult<BackupOutcome> {
        let engine = self.backup.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.create_backup(destination.as_deref())).await??;
        if let BackupOutcome::Created { files, .. } = &outcome {
            self.notifier.info("Backup created", format!("{} files archived", files));
        }
        Ok(outcome)
    }

    pub async fn restore_backup(&self, source: Option<PathBuf>) -> AppResult<RestoreOutcome> {
        let engine = self.backup.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.restore_backup(source.as_deref())).await??;
        if let RestoreOutcome::RestartRequired { aside_path, .. } = &outcome {
            self.notifier.info(
                "Restore complete",
                format!("Restart the app. Previous data kept at {}", aside_path.display()),
            );
        }
        Ok(outcome)
    }

    pub async fn export_full(&self) -> AppResult<ExportResponse> {
        let engine = self.export_engine()?;
        tokio::task::spawn_blocking(move || engine.export_full()).await?
    }

    /// `None` uses the configured window.
    pub async fn export_window(&self, days: Option<u32>) -> AppResult<ExportResponse> {
        let days = match days {
            Some(days) => days,
            None => self.settings()?.recent_window_days,
        };
        let engine = self.export_engine()?;
        tokio::task::spawn_blocking(move || engine.export_window(days)).await?
    }

    // Achievements

    pub async fn refresh_achievements(&self) -> AppResult<Vec<Notification>> {
        if !self.settings()?.achievements_enabled {
            return Ok(Vec::new());
        }
        let engine = ExportEngine::new(self.ctx.documents.clone(), self.ctx.collections.clone(), &self.paths.root);
        let snapshot = tokio::task::spawn_blocking(move || engine.collect_snapshot()).await?;
        self.achievements.evaluate(&summarize(&snapshot)).await
    }

    /// Re-evaluates achievements after every burst of mutations until the vault is dropped.
    pub fn watch_mutations(self: Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.ctx.subscribe_changes();
        let vault = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(vault) = vault.upgrade() else {
                    break;
                };
                if let Err(error) = vault.refresh_achievements().await {
                    tracing::warn!(error = %error, "achievement refresh failed");
                }
            }
            tracing::debug!("mutation watcher stopped");
        })
    }
}

fn merge_json(target: &mut Value, update: Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
