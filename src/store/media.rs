use super::{relative_name, write_file_atomic};
use crate::errors::{AppError, AppResult};
use crate::models::{MediaDataUrl, SavedMedia};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const FALLBACK_MIME: &str = "application/octet-stream";

static MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // images
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("svg", "image/svg+xml"),
        ("bmp", "image/bmp"),
        ("ico", "image/x-icon"),
        ("avif", "image/avif"),
        // video & audio
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("mov", "video/quicktime"),
        ("mkv", "video/x-matroska"),
        ("mp3", "audio/mpeg"),
        ("wav", "audio/wav"),
        ("ogg", "audio/ogg"),
        // documents
        ("pdf", "application/pdf"),
        ("txt", "text/plain"),
        ("md", "text/markdown"),
        ("csv", "text/csv"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("html", "text/html"),
        ("htm", "text/html"),
        ("doc", "application/msword"),
        ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        ("zip", "application/zip"),
        // source code
        ("js", "text/javascript"),
        ("jsx", "text/javascript"),
        ("ts", "text/typescript"),
        ("tsx", "text/typescript"),
        ("css", "text/css"),
        ("py", "text/x-python"),
        ("rs", "text/x-rust"),
        ("sol", "text/x-solidity"),
        ("go", "text/x-go"),
        ("java", "text/x-java"),
        ("c", "text/x-c"),
        ("h", "text/x-c"),
        ("cpp", "text/x-c++"),
        ("sh", "text/x-shellscript"),
        ("yaml", "text/yaml"),
        ("yml", "text/yaml"),
        ("toml", "text/x-toml"),
    ])
});

pub fn mime_for(filename: &str) -> &'static str {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| MIME_TYPES.get(ext.to_ascii_lowercase().as_str()).copied())
        .unwrap_or(FALLBACK_MIME)
}

/// Binary attachments under `<root>/media`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self { dir: media_dir.into() }
    }

    pub fn path_for(&self, filename: &str) -> AppResult<PathBuf> {
        Ok(self.dir.join(relative_name(filename)?))
    }

    pub fn save_binary(&self, filename: &str, bytes: &[u8]) -> AppResult<SavedMedia> {
        let path = self.path_for(filename)?;
        write_file_atomic(&path, bytes)?;
        tracing::debug!(file = filename, size = bytes.len(), "media saved");
        Ok(SavedMedia {
            path,
            size: bytes.len() as u64,
        })
    }

    pub fn read_as_data_url(&self, filename: &str) -> AppResult<MediaDataUrl> {
        let bytes = self.read_bytes(filename)?;
        let mime_type = mime_for(filename);
        Ok(MediaDataUrl {
            data_url: format!("data:{};base64,{}", mime_type, STANDARD.encode(&bytes)),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    pub fn read_as_text(&self, filename: &str) -> AppResult<String> {
        let bytes = self.read_bytes(filename)?;
        String::from_utf8(bytes)
            .map_err(|error| AppError::Parse(format!("{} is not valid UTF-8: {}", filename, error)))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_for(filename).map(|path| path.is_file()).unwrap_or(false)
    }

    pub fn delete(&self, filename: &str) -> AppResult<()> {
        let path = self.path_for(filename)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Media '{}' not found", filename)));
        }
        fs::remove_file(path).map_err(|error| AppError::Io(error.to_string()))
    }

    fn read_bytes(&self, filename: &str) -> AppResult<Vec<u8>> {
        let path = self.path_for(filename)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Media '{}' not found", filename)));
        }
        fs::read(&path).map_err(|error| AppError::Io(format!("Failed to read {}: {}", filename, error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MediaStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MediaStore::new(dir.path().join("media"));
        (dir, store)
    }

    #[test]
    fn mime_lookup_is_case_insensitive_with_fallback() {
        assert_eq!(mime_for("avatar.PNG"), "image/png");
        assert_eq!(mime_for("Vault.sol"), "text/x-solidity");
        assert_eq!(mime_for("blob.unknownext"), FALLBACK_MIME);
        assert_eq!(mime_for("no-extension"), FALLBACK_MIME);
    }

    #[test]
    fn binary_round_trips_through_data_url() {
        let (_dir, store) = store();
        let bytes = [0u8, 159, 146, 150, 255];
        let saved = store.save_binary("photo.png", &bytes).expect("save");
        assert_eq!(saved.size, 5);
        assert!(saved.path.ends_with("photo.png"));

        let url = store.read_as_data_url("photo.png").expect("data url");
        assert_eq!(url.mime_type, "image/png");
        assert_eq!(url.size, 5);
        let encoded = url.data_url.strip_prefix("data:image/png;base64,").expect("prefix");
        assert_eq!(STANDARD.decode(encoded).expect("decode"), bytes);
    }

    #[test]
    fn text_reads_skip_base64() {
        let (_dir, store) = store();
        store.save_binary("exploit.sol", b"contract A {}").expect("save");
        assert_eq!(store.read_as_text("exploit.sol").expect("text"), "contract A {}");
    }

    #[test]
    fn missing_media_is_not_found() {
        let (_dir, store) = store();
        assert!(store.read_as_data_url("nope.png").expect_err("missing").is_not_found());
        assert!(store.read_as_text("nope.txt").expect_err("missing").is_not_found());
    }

    #[test]
    fn invalid_utf8_text_is_a_parse_failure() {
        let (_dir, store) = store();
        store.save_binary("bad.txt", &[0xff, 0xfe, 0xfd]).expect("save");
        assert_eq!(store.read_as_text("bad.txt").expect_err("bad utf8").code(), "PARSE_FAILURE");
    }
}
