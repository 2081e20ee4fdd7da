//! File-backed chat session store.
//!
//! One pretty-printed JSON file per session under the chats directory.
//! Sessions are append-only: user messages and completed assistant messages
//! are appended; an in-flight assistant message is never written here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ChatSession, Message, SessionSummary, SessionUpdate};
use crate::paths;

/// Errors from chat session persistence.
#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("Chat session not found: {0}")]
    NotFound(String),

    #[error("Invalid chat session id")]
    InvalidId,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Failed to encode chat session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Path(#[from] paths::PathError),
}

/// Store for chat sessions in a single directory.
pub struct ChatStore {
    dir: PathBuf,
}

impl ChatStore {
    /// Create a store over an explicit directory (created on demand).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a store over the default chats directory.
    pub fn open_default() -> Result<Self, ChatStoreError> {
        Ok(Self::new(paths::chats_dir()?))
    }

    /// Create a new empty session and persist it.
    pub fn create(&self) -> Result<ChatSession, ChatStoreError> {
        let session = ChatSession {
            id: format!("chat_{}", Uuid::new_v4()),
            title: "New Conversation".to_string(),
            created_at: chrono::Utc::now(),
            messages: Vec::new(),
            metadata: crate::domain::ChatMetadata::default(),
        };
        self.write(&session)?;
        Ok(session)
    }

    /// Load a session by id.
    pub fn get(&self, id: &str) -> Result<ChatSession, ChatStoreError> {
        let path = self.path_for(id)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ChatStoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// List all sessions as id/title summaries, newest first.
    ///
    /// Malformed files are skipped, not surfaced.
    pub fn list(&self) -> Result<Vec<SessionSummary>, ChatStoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions: Vec<ChatSession> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<ChatSession>(&c).map_err(|e| e.to_string()))
            {
                Ok(session) => sessions.push(session),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable chat file"),
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id,
                title: s.title,
            })
            .collect())
    }

    /// Delete a session. Missing sessions are an error, matching the
    /// operator-facing "chat not found" report.
    pub fn delete(&self, id: &str) -> Result<(), ChatStoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ChatStoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every session, returning how many were removed.
    pub fn clear_all(&self) -> Result<usize, ChatStoreError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Append a message to a session's log.
    pub fn append_message(&self, id: &str, message: Message) -> Result<(), ChatStoreError> {
        let mut session = self.get(id)?;
        session.messages.push(message);
        self.write(&session)
    }

    /// Merge a partial title/metadata update into a session.
    pub fn update_metadata(&self, id: &str, update: SessionUpdate) -> Result<(), ChatStoreError> {
        let mut session = self.get(id)?;
        if let Some(title) = update.title {
            session.title = title;
        }
        if let Some(model) = update.model {
            session.metadata.model = model;
        }
        if let Some(preset_id) = update.preset_id {
            session.metadata.preset_id = preset_id;
        }
        self.write(&session)
    }

    /// Resolve the file path for a session id.
    ///
    /// Only the final path component of the id is honored, so ids can never
    /// escape the chats directory.
    fn path_for(&self, id: &str) -> Result<PathBuf, ChatStoreError> {
        let safe = Path::new(id)
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or(ChatStoreError::InvalidId)?;
        if safe.is_empty() {
            return Err(ChatStoreError::InvalidId);
        }
        Ok(self.dir.join(format!("{safe}.json")))
    }

    /// Write a session atomically using temp file + rename.
    fn write(&self, session: &ChatSession) -> Result<(), ChatStoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&session.id)?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, serde_json::to_string_pretty(session)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRole;
    use tempfile::tempdir;

    #[test]
    fn create_get_delete_roundtrip() {
        let dir = tempdir().expect("tempdir failed");
        let store = ChatStore::new(dir.path());

        let session = store.create().expect("create failed");
        assert!(session.messages.is_empty());

        let loaded = store.get(&session.id).expect("get failed");
        assert_eq!(loaded.title, "New Conversation");

        store.delete(&session.id).expect("delete failed");
        assert!(matches!(
            store.get(&session.id),
            Err(ChatStoreError::NotFound(_))
        ));
    }

    #[test]
    fn append_message_is_append_only() {
        let dir = tempdir().expect("tempdir failed");
        let store = ChatStore::new(dir.path());
        let session = store.create().expect("create failed");

        store
            .append_message(&session.id, Message::user("hello"))
            .expect("append failed");
        store
            .append_message(&session.id, Message::assistant("hi there"))
            .expect("append failed");

        let loaded = store.get(&session.id).expect("get failed");
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, MessageRole::User);
        assert_eq!(loaded.messages[1].content, "hi there");
    }

    #[test]
    fn list_skips_malformed_files() {
        let dir = tempdir().expect("tempdir failed");
        let store = ChatStore::new(dir.path());
        let session = store.create().expect("create failed");

        fs::write(dir.path().join("broken.json"), "{not json").expect("write failed");

        let listed = store.list().expect("list failed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, session.id);
    }

    #[test]
    fn ids_cannot_escape_the_store_directory() {
        let dir = tempdir().expect("tempdir failed");
        let store = ChatStore::new(dir.path());

        // A traversal-shaped id resolves to its final component only.
        let err = store.get("../../etc/passwd").unwrap_err();
        assert!(matches!(err, ChatStoreError::NotFound(_)));
    }

    #[test]
    fn update_metadata_merges_partially() {
        let dir = tempdir().expect("tempdir failed");
        let store = ChatStore::new(dir.path());
        let session = store.create().expect("create failed");

        store
            .update_metadata(
                &session.id,
                SessionUpdate {
                    title: Some("Renamed".into()),
                    model: Some("llama3:latest".into()),
                    preset_id: None,
                },
            )
            .expect("update failed");

        let loaded = store.get(&session.id).expect("get failed");
        assert_eq!(loaded.title, "Renamed");
        assert_eq!(loaded.metadata.model, "llama3:latest");
        assert_eq!(loaded.metadata.preset_id, "");
    }
}
