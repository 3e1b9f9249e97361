use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("PARSE_FAILURE: {0}")]
    Parse(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("CANCELED: {0}")]
    Canceled(String),
    #[error("PARTIAL_RESTORE: {message} (previous data kept at {})", aside.display())]
    PartialRestore { aside: PathBuf, message: String },
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Parse(_) => "PARSE_FAILURE",
            Self::Io(_) => "IO_FAILURE",
            Self::Canceled(_) => "CANCELED",
            Self::PartialRestore { .. } => "PARTIAL_RESTORE",
            Self::Validation(_) => "VALIDATION",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(value.to_string()),
            _ => Self::Io(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn missing_file_maps_to_not_found() {
        let error: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(error.is_not_found());
        assert_eq!(error.code(), "NOT_FOUND");
    }

    #[test]
    fn permission_error_maps_to_io_failure() {
        let error: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(error.code(), "IO_FAILURE");
        assert!(error.to_string().starts_with("IO_FAILURE"));
    }

    #[test]
    fn partial_restore_names_the_aside_path() {
        let error = AppError::PartialRestore {
            aside: "/tmp/data_pre_restore".into(),
            message: "truncated entry".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("/tmp/data_pre_restore"));
        assert!(text.contains("truncated entry"));
    }
}
