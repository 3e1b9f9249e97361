use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_NAME: &str = "DevJournalData";
pub const LOG_DIR_NAME: &str = "DevJournalLogs";
pub const DEV_BASE_DIR_NAME: &str = ".devjournal-dev";
pub const MEDIA_DIR: &str = "media";

pub const KNOWN_FOLDERS: &[&str] = &["notes", "snippets", "goals", "bounties", "wallet", "chats", MEDIA_DIR];

const DATA_DIR_ENV: &str = "DEVJOURNAL_DATA_DIR";
const MODE_ENV: &str = "DEVJOURNAL_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Development,
    Packaged,
}

impl RuntimeMode {
    pub fn detect() -> Self {
        if let Ok(raw) = std::env::var(MODE_ENV) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "dev" | "development" => return Self::Development,
                "packaged" | "release" => return Self::Packaged,
                other => tracing::warn!(value = other, "ignoring unknown {}", MODE_ENV),
            }
        }
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Packaged
        }
    }
}

/// Directory pair every other component works under. Logs sit next to the data
/// root so backups never capture open log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
    pub logs: PathBuf,
}

impl AppPaths {
    pub fn from_base(base: &Path) -> Self {
        Self {
            root: base.join(DATA_DIR_NAME),
            logs: base.join(LOG_DIR_NAME),
        }
    }

    /// Uses `root` verbatim; logs go to a sibling directory.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let logs = match root.parent() {
            Some(parent) => parent.join(LOG_DIR_NAME),
            None => root.join(LOG_DIR_NAME),
        };
        Self { root, logs }
    }

    pub fn resolve(mode: RuntimeMode) -> AppResult<Self> {
        if let Ok(explicit) = std::env::var(DATA_DIR_ENV) {
            if !explicit.trim().is_empty() {
                return Ok(Self::from_root(explicit.trim()));
            }
        }
        let exe = std::env::current_exe().map_err(|error| AppError::Io(error.to_string()))?;
        let cwd = std::env::current_dir().map_err(|error| AppError::Io(error.to_string()))?;
        Ok(Self::from_base(&resolve_base_dir(mode, &exe, &cwd)))
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    pub fn collection_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    pub fn ensure_layout(&self) -> AppResult<()> {
        ensure_layout(&self.root)?;
        if !self.logs.exists() {
            fs::create_dir_all(&self.logs).map_err(|error| AppError::Io(error.to_string()))?;
        }
        Ok(())
    }
}

pub fn resolve_base_dir(mode: RuntimeMode, exe_path: &Path, cwd: &Path) -> PathBuf {
    match mode {
        RuntimeMode::Development => cwd.join(DEV_BASE_DIR_NAME),
        RuntimeMode::Packaged => {
            let exe_dir = exe_path.parent().unwrap_or(cwd);
            app_bundle_parent(exe_dir).unwrap_or_else(|| exe_dir.to_path_buf())
        }
    }
}

/// `Foo.app/Contents/MacOS/foo` is read-only once signed, so the data folder
/// lives next to `Foo.app` instead.
fn app_bundle_parent(exe_dir: &Path) -> Option<PathBuf> {
    let contents = exe_dir.parent()?;
    let bundle = contents.parent()?;
    let is_bundle = exe_dir.file_name().map(|name| name == "MacOS").unwrap_or(false)
        && contents.file_name().map(|name| name == "Contents").unwrap_or(false)
        && bundle
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("app"))
            .unwrap_or(false);
    if is_bundle {
        bundle.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

pub fn ensure_layout(root: &Path) -> AppResult<()> {
    if !root.exists() {
        fs::create_dir_all(root).map_err(|error| AppError::Io(error.to_string()))?;
    }
    for rel in KNOWN_FOLDERS {
        let dir = root.join(rel);
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|error| AppError::Io(error.to_string()))?;
        }
    }
    Ok(())
}
