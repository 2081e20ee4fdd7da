//! Path resolution for ollactl data files.
//!
//! All durable records live under a single data root:
//! - `server.json`: the inference server handle
//! - `server.log`: captured server output
//! - `task.json` / `task.log`: the active maintenance task
//! - `chats/`: one JSON file per chat session
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O - adapters handle user prompts separately

use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine the system data directory.
    #[error("Cannot determine system data directory")]
    NoDataDir,

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
}

/// Get the root directory for application data.
///
/// Resolution order:
/// 1. `OLLACTL_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g., `~/.local/share/ollactl`)
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var("OLLACTL_DATA_DIR") {
        return Ok(PathBuf::from(path));
    }

    let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    let root = data_dir.join("ollactl");

    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| PathError::CreateFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(root)
}

/// Location of the durable server handle record.
pub fn server_handle_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("server.json"))
}

/// Location of the captured inference server output.
pub fn server_log_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("server.log"))
}

/// Location of the durable task record.
pub fn task_record_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("task.json"))
}

/// Location of the task output capture log.
pub fn task_log_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("task.log"))
}

/// Directory holding chat session files, created on first use.
pub fn chats_dir() -> Result<PathBuf, PathError> {
    let dir = data_root()?.join("chats");
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| PathError::CreateFailed {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_paths_are_under_data_root() {
        let root = data_root().expect("data_root failed");
        assert!(server_handle_path().unwrap().starts_with(&root));
        assert!(task_record_path().unwrap().starts_with(&root));
        assert!(task_log_path().unwrap().starts_with(&root));
    }
}
