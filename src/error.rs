use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StreamGrabError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("No {content} found at {url}")]
    NoEntriesFound { url: String, content: String },

    #[error("Failed to start {program}: {cause}")]
    SpawnFailed { program: String, cause: String },

    #[error("{}", describe_execution_failure(.exit_code, .args, .last_lines))]
    ExecutionFailed {
        exit_code: Option<i32>,
        args: Vec<String>,
        last_lines: Vec<String>,
    },

    #[error("Skipped malformed metadata line ({reason}): {line}")]
    MalformedMetadata { line: String, reason: String },

    #[error("Download cancelled: {url}")]
    Cancelled { url: String },

    #[error("Download stopped unexpectedly: {url}")]
    Interrupted { url: String },

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("File system error: {0}")]
    FileSystemError(String),
}

fn describe_execution_failure(
    exit_code: &Option<i32>,
    args: &[String],
    last_lines: &[String],
) -> String {
    let code = match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    };
    let mut message = format!("Tool failed with {} (args: {})", code, args.join(" "));
    if !last_lines.is_empty() {
        message.push_str("\nLast output:\n");
        message.push_str(&last_lines.join("\n"));
    }
    message
}

impl StreamGrabError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamGrabError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Classifies a failed `spawn()` into a user-facing cause.
    pub fn spawn_failed(program: impl Into<String>, err: &std::io::Error) -> Self {
        let cause = match err.kind() {
            std::io::ErrorKind::NotFound => format!("executable not found ({})", err),
            std::io::ErrorKind::PermissionDenied => format!("permission denied ({})", err),
            _ => err.to_string(),
        };
        StreamGrabError::SpawnFailed {
            program: program.into(),
            cause,
        }
    }
}

impl From<std::io::Error> for StreamGrabError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => StreamGrabError::PermissionError(err.to_string()),
            std::io::ErrorKind::NotFound => {
                StreamGrabError::FileSystemError(format!("File not found: {}", err))
            }
            _ => StreamGrabError::FileSystemError(err.to_string()),
        }
    }
}

/// Save-directory checks run before a task is accepted.
pub mod validation {
    use super::StreamGrabError;
    use std::path::Path;

    /// Validates that `path` is an existing directory we can write into.
    pub async fn validate_write_permissions(path: &Path) -> Result<(), StreamGrabError> {
        use tokio::fs;

        let metadata = fs::metadata(path).await.map_err(|e| {
            StreamGrabError::InvalidSettings(format!(
                "Save path {:?} is not accessible: {}",
                path, e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(StreamGrabError::InvalidSettings(format!(
                "Save path {:?} is not a directory",
                path
            )));
        }

        let test_file = path.join(format!(".streamgrab_write_test_{}", uuid::Uuid::new_v4()));
        match fs::write(&test_file, b"test").await {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&test_file).await {
                    tracing::warn!(path = ?test_file, error = %e, "Failed to remove write probe");
                }
                Ok(())
            }
            Err(e) => Err(StreamGrabError::PermissionError(format!(
                "Cannot write to directory {:?}: {}",
                path, e
            ))),
        }
    }
}
