//! Draft persistence.
//!
//! Drafts are stored under a logical key (by default `postDraft`). The
//! session only talks to [`DraftStore`]; which backend sits behind it is the
//! embedder's choice.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quire_common::PersistenceError;
use quire_editor_core::DraftRecord;
use smol_str::SmolStr;
use tokio::sync::Mutex;

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn save_draft(&self, key: &str, draft: &DraftRecord) -> Result<(), PersistenceError>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn load_draft(&self, key: &str) -> Result<Option<DraftRecord>, PersistenceError>;

    /// Clearing a missing draft is not an error.
    async fn clear_draft(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Drafts kept in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<SmolStr, DraftRecord>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn save_draft(&self, key: &str, draft: &DraftRecord) -> Result<(), PersistenceError> {
        self.drafts
            .lock()
            .await
            .insert(SmolStr::new(key), draft.clone());
        Ok(())
    }

    async fn load_draft(&self, key: &str) -> Result<Option<DraftRecord>, PersistenceError> {
        Ok(self.drafts.lock().await.get(key).cloned())
    }

    async fn clear_draft(&self, key: &str) -> Result<(), PersistenceError> {
        self.drafts.lock().await.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per draft in a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous draft intact.
#[derive(Debug, Clone)]
pub struct JsonFileDraftStore {
    dir: PathBuf,
}

impl JsonFileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl DraftStore for JsonFileDraftStore {
    async fn save_draft(&self, key: &str, draft: &DraftRecord) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(draft)?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::trace!(path = %path.display(), "draft written");
        Ok(())
    }

    async fn load_draft(&self, key: &str) -> Result<Option<DraftRecord>, PersistenceError> {
        let path = self.path_for(key);
        let file = match tokio::fs::read(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let draft = serde_json::from_slice(&file)?;
        Ok(Some(draft))
    }

    async fn clear_draft(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DraftRecord {
        DraftRecord {
            title: "T".into(),
            content: "C".into(),
            images: vec![],
            last_saved: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let store = MemoryDraftStore::new();
        assert_eq!(store.load_draft("postDraft").await.unwrap(), None);

        store.save_draft("postDraft", &record()).await.unwrap();
        assert_eq!(store.load_draft("postDraft").await.unwrap(), Some(record()));

        store.clear_draft("postDraft").await.unwrap();
        assert_eq!(store.load_draft("postDraft").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDraftStore::new(dir.path().join("drafts"));

        assert_eq!(store.load_draft("postDraft").await.unwrap(), None);
        store.save_draft("postDraft", &record()).await.unwrap();
        assert!(dir.path().join("drafts/postDraft.json").exists());
        assert_eq!(store.load_draft("postDraft").await.unwrap(), Some(record()));

        store.clear_draft("postDraft").await.unwrap();
        store.clear_draft("postDraft").await.unwrap();
        assert_eq!(store.load_draft("postDraft").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDraftStore::new(dir.path());
        assert_eq!(
            store.path_for("../etc/passwd"),
            dir.path().join(".._etc_passwd.json")
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDraftStore::new(dir.path());
        tokio::fs::write(dir.path().join("postDraft.json"), b"{not json")
            .await
            .unwrap();
        let err = store.load_draft("postDraft").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Serde { .. }));
    }
}
