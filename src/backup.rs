use crate::errors::{AppError, AppResult};
use crate::models::{BackupOutcome, RestoreOutcome};
use crate::paths::ensure_layout;
use crate::store::is_temp_file;
use chrono::Local;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Where a restore currently stands. Only `Renamed -> Extracted` can fail in a
/// way that needs manual recovery, and then the aside copy is still on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorePhase {
    Safe,
    Renamed { aside: PathBuf },
    Extracted { aside: PathBuf, files: usize },
}

#[derive(Debug, Clone)]
pub struct BackupEngine {
    root: PathBuf,
}

impl BackupEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `None` means the operator dismissed the save dialog.
    pub fn create_backup(&self, destination: Option<&Path>) -> AppResult<BackupOutcome> {
        let Some(destination) = destination else {
            tracing::info!("backup canceled before a destination was chosen");
            return Ok(BackupOutcome::Canceled);
        };
        if !self.root.is_dir() {
            return Err(AppError::NotFound(format!("Data folder {} does not exist", self.root.display())));
        }
        if resolve_path(destination)?.starts_with(resolve_path(&self.root)?) {
            return Err(AppError::Validation(
                "Backup destination cannot be inside the data folder".to_string(),
            ));
        }

        match write_archive(&self.root, destination) {
            Ok((files, bytes)) => {
                tracing::info!(path = %destination.display(), files, bytes, "backup archive written");
                Ok(BackupOutcome::Created {
                    path: destination.to_path_buf(),
                    files,
                    bytes,
                })
            }
            Err(error) => {
                let _ = fs::remove_file(destination);
                tracing::warn!(path = %destination.display(), error = %error, "backup failed");
                Err(error)
            }
        }
    }

    /// Replaces the data folder with the archive's contents. The previous folder is
    /// renamed aside first and never deleted.
    pub fn restore_backup(&self, source: Option<&Path>) -> AppResult<RestoreOutcome> {
        let Some(source) = source else {
            tracing::info!("restore canceled before an archive was chosen");
            return Ok(RestoreOutcome::Canceled);
        };

        let mut archive = open_archive(source)?;
        for name in archive.file_names() {
            sanitize_entry_name(name)?;
        }

        let mut phase = RestorePhase::Safe;
        let aside = rename_aside(&self.root)?;
        phase = advance(phase, RestorePhase::Renamed { aside: aside.clone() });

        let extracted = fs::create_dir_all(&self.root)
            .map_err(|error| AppError::Io(error.to_string()))
            .and_then(|_| extract_into(&mut archive, &self.root))
            .and_then(|files| ensure_layout(&self.root).map(|_| files));

        match extracted {
            Ok(files) => {
                phase = advance(phase, RestorePhase::Extracted { aside: aside.clone(), files });
                tracing::info!(?phase, "restore finished; restart required");
                Ok(RestoreOutcome::RestartRequired { aside_path: aside, files })
            }
            Err(error) => {
                tracing::error!(aside = %aside.display(), error = %error, "restore failed after the data folder was moved aside");
                Err(AppError::PartialRestore {
                    aside,
                    message: error.to_string(),
                })
            }
        }
    }
}

fn advance(from: RestorePhase, to: RestorePhase) -> RestorePhase {
    tracing::debug!(?from, ?to, "restore phase");
    to
}

/// Absolute form of `path` with symlinks and `..` resolved. Trailing components
/// that do not exist yet are re-attached to their nearest existing ancestor.
fn resolve_path(path: &Path) -> AppResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|error| AppError::Io(error.to_string()))?
            .join(path)
    };
    let unresolvable = || AppError::Validation(format!("Cannot resolve path {}", path.display()));

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        missing.push(existing.file_name().ok_or_else(unresolvable)?.to_os_string());
        existing = existing.parent().ok_or_else(unresolvable)?;
    }
    let mut resolved = fs::canonicalize(existing)
        .map_err(|error| AppError::Io(format!("Failed to resolve {}: {}", existing.display(), error)))?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn write_archive(root: &Path, destination: &Path) -> AppResult<(usize, u64)> {
    let mut entries = Vec::new();
    collect_entries(root, root, &mut entries)?;
    entries.sort();

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
        }
    }
    let file = File::create(destination)
        .map_err(|error| AppError::Io(format!("Failed to create {}: {}", destination.display(), error)))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    let mut files = 0usize;
    let mut bytes = 0u64;
    for (rel, is_dir) in entries {
        let name = archive_name(&rel);
        if is_dir {
            writer.add_directory(name, FileOptions::default())?;
            continue;
        }
        let full_path = root.join(&rel);
        let mut source = File::open(&full_path)
            .map_err(|error| AppError::Io(format!("Failed to open {}: {}", full_path.display(), error)))?;
        let size = source.metadata().map(|meta| meta.len()).unwrap_or(0);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size > u32::MAX as u64);
        writer.start_file(name, options)?;
        bytes += std::io::copy(&mut source, &mut writer)
            .map_err(|error| AppError::Io(format!("Failed to archive {}: {}", rel.display(), error)))?;
        files += 1;
    }

    let mut inner = writer.finish()?;
    inner.flush().map_err(|error| AppError::Io(error.to_string()))?;
    Ok((files, bytes))
}

fn collect_entries(root: &Path, dir: &Path, acc: &mut Vec<(PathBuf, bool)>) -> AppResult<()> {
    for entry in fs::read_dir(dir).map_err(|error| AppError::Io(error.to_string()))? {
        let entry = entry.map_err(|error| AppError::Io(error.to_string()))?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .map_err(|error| AppError::Internal(error.to_string()))?
            .to_path_buf();
        if path.is_dir() {
            acc.push((rel, true));
            collect_entries(root, &path, acc)?;
        } else if !is_temp_file(&path) {
            acc.push((rel, false));
        }
    }
    Ok(())
}

fn archive_name(rel: &Path) -> String {
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn open_archive(source: &Path) -> AppResult<ZipArchive<BufReader<File>>> {
    let file = File::open(source).map_err(|error| match error.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound(format!("Backup {} not found", source.display())),
        _ => AppError::Io(format!("Failed to open {}: {}", source.display(), error)),
    })?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|error| AppError::Parse(format!("{} is not a valid backup archive: {}", source.display(), error)))
}

fn sanitize_entry_name(name: &str) -> AppResult<PathBuf> {
    let candidate = Path::new(name);
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::Validation(format!("Invalid path in archive entry: {}", name)));
            }
        }
    }
    Ok(clean)
}

fn rename_aside(root: &Path) -> AppResult<PathBuf> {
    let parent = root
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", root.display())))?;
    let base_name = root
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");

    let mut aside = parent.join(format!("{}_pre_restore_{}", base_name, stamp));
    let mut suffix = 1;
    while aside.exists() {
        aside = parent.join(format!("{}_pre_restore_{}_{}", base_name, stamp, suffix));
        suffix += 1;
    }

    if root.exists() {
        fs::rename(root, &aside)
            .map_err(|error| AppError::Io(format!("Failed to move {} aside: {}", root.display(), error)))?;
    } else {
        fs::create_dir_all(&aside).map_err(|error| AppError::Io(error.to_string()))?;
    }
    tracing::info!(aside = %aside.display(), "previous data folder moved aside");
    Ok(aside)
}

fn extract_into<R: Read + Seek>(archive: &mut ZipArchive<R>, target: &Path) -> AppResult<usize> {
    let mut files = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let rel = sanitize_entry_name(entry.name())?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out_path = target.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|error| AppError::Io(format!("Failed to create {}: {}", out_path.display(), error)))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| AppError::Io(format!("Failed to create {}: {}", parent.display(), error)))?;
        }
        let mut outfile = File::create(&out_path)
            .map_err(|error| AppError::Io(format!("Failed to create {}: {}", out_path.display(), error)))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|error| AppError::Io(format!("Failed to write {}: {}", out_path.display(), error)))?;
        files += 1;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(root: &Path, dir: &Path, acc: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in fs::read_dir(dir).expect("read dir") {
                let path = entry.expect("entry").path();
                if path.is_dir() {
                    walk(root, &path, acc);
                } else {
                    let rel = path.strip_prefix(root).expect("prefix").to_path_buf();
                    acc.insert(rel, fs::read(&path).expect("read"));
                }
            }
        }
        let mut acc = BTreeMap::new();
        walk(root, root, &mut acc);
        acc
    }

    fn seeded_root(base: &Path) -> PathBuf {
        let root = base.join("DevJournalData");
        ensure_layout(&root).expect("layout");
        fs::write(root.join("settings.json"), b"{\n  \"recentWindowDays\": 14\n}").expect("settings");
        fs::write(root.join("notes").join("5.json"), br#"{"id":5,"title":"five"}"#).expect("note");
        fs::write(root.join("media").join("avatar.png"), [137u8, 80, 78, 71, 0, 1, 2, 3]).expect("media");
        root
    }

    #[test]
    fn canceled_pickers_are_not_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = BackupEngine::new(seeded_root(dir.path()));
        assert_eq!(engine.create_backup(None).expect("backup"), BackupOutcome::Canceled);
        assert_eq!(engine.restore_backup(None).expect("restore"), RestoreOutcome::Canceled);
    }

    #[test]
    fn archive_entries_sit_at_the_top_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let engine = BackupEngine::new(&root);
        let dest = dir.path().join("out").join("backup.zip");
        engine.create_backup(Some(&dest)).expect("backup");

        let archive = ZipArchive::new(File::open(&dest).expect("open")).expect("zip");
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"settings.json".to_string()));
        assert!(names.contains(&"notes/5.json".to_string()));
        assert!(!names.iter().any(|name| name.starts_with("DevJournalData")));
    }

    #[test]
    fn backup_then_restore_reproduces_every_byte() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let before = snapshot(&root);
        let engine = BackupEngine::new(&root);
        let dest = dir.path().join("backup.zip");

        match engine.create_backup(Some(&dest)).expect("backup") {
            BackupOutcome::Created { files, .. } => assert_eq!(files, before.len()),
            other => panic!("unexpected outcome {:?}", other),
        }

        fs::write(root.join("notes").join("9.json"), br#"{"id":9}"#).expect("late note");
        fs::remove_file(root.join("settings.json")).expect("drop settings");

        let outcome = engine.restore_backup(Some(&dest)).expect("restore");
        let RestoreOutcome::RestartRequired { aside_path, .. } = outcome else {
            panic!("expected restart signal");
        };
        assert_eq!(snapshot(&root), before);
        assert!(!root.join("notes").join("9.json").exists());
        assert!(aside_path.join("notes").join("9.json").exists());
    }

    #[test]
    fn empty_folders_survive_the_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        fs::create_dir_all(root.join("media").join("goals")).expect("empty dir");
        let engine = BackupEngine::new(&root);
        let dest = dir.path().join("backup.zip");
        engine.create_backup(Some(&dest)).expect("backup");
        engine.restore_backup(Some(&dest)).expect("restore");
        assert!(root.join("media").join("goals").is_dir());
        assert!(root.join("chats").is_dir());
    }

    #[test]
    fn invalid_archive_leaves_root_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let before = snapshot(&root);
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"definitely not a zip").expect("bogus");

        let engine = BackupEngine::new(&root);
        let error = engine.restore_backup(Some(&bogus)).expect_err("bad archive");
        assert_eq!(error.code(), "PARSE_FAILURE");
        assert_eq!(snapshot(&root), before);
    }

    #[test]
    fn failed_extraction_keeps_the_aside_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let before = snapshot(&root);

        let broken = dir.path().join("broken.zip");
        {
            let mut writer = ZipWriter::new(File::create(&broken).expect("create"));
            writer.start_file("notes", FileOptions::default()).expect("file entry");
            writer.write_all(b"a file where a folder belongs").expect("write");
            writer.start_file("notes/1.json", FileOptions::default()).expect("nested entry");
            writer.write_all(br#"{"id":1}"#).expect("write");
            writer.finish().expect("finish");
        }

        let engine = BackupEngine::new(&root);
        let error = engine.restore_backup(Some(&broken)).expect_err("partial restore");
        let AppError::PartialRestore { aside, .. } = error else {
            panic!("expected partial restore, got {:?}", error);
        };
        assert_eq!(snapshot(&aside), before);
    }

    #[test]
    fn traversal_entries_are_rejected_before_touching_root() {
        assert!(sanitize_entry_name("../evil.json").is_err());
        assert!(sanitize_entry_name("/abs/evil.json").is_err());
        assert_eq!(sanitize_entry_name("notes/1.json").expect("ok"), PathBuf::from("notes/1.json"));
    }

    #[test]
    fn destination_inside_root_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let engine = BackupEngine::new(&root);
        let error = engine
            .create_backup(Some(&root.join("media").join("self.zip")))
            .expect_err("self archive");
        assert_eq!(error.code(), "VALIDATION");
    }

    #[test]
    fn destination_reaching_root_through_dot_dot_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let engine = BackupEngine::new(&root);
        let sneaky = root.join("notes").join("..").join("media").join("nested").join("self.zip");
        let error = engine.create_backup(Some(&sneaky)).expect_err("self archive");
        assert_eq!(error.code(), "VALIDATION");

        let outside = root.join("..").join("outside.zip");
        assert!(matches!(
            engine.create_backup(Some(&outside)).expect("outside root"),
            BackupOutcome::Created { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn destination_behind_a_symlink_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = seeded_root(dir.path());
        let link = dir.path().join("shortcut");
        std::os::unix::fs::symlink(&root, &link).expect("symlink");
        let engine = BackupEngine::new(&root);
        let error = engine
            .create_backup(Some(&link.join("self.zip")))
            .expect_err("self archive");
        assert_eq!(error.code(), "VALIDATION");
        assert!(!root.join("self.zip").exists());
    }
}
