//! Append-only gallery persistence.
//!
//! The store is a single JSON document holding every saved item,
//! rewritten whole on each append. Writes are serialized by a mutex so
//! concurrent saves cannot interleave the read-modify-write cycle.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::item::GalleryItem;

/// Gallery persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("gallery I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("gallery serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of an append.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved(GalleryItem),
    /// An item with the same image URL already exists; nothing written.
    AlreadySaved,
}

/// Persistence boundary for saved artifacts.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Append an item unless its image URL is already present.
    async fn append(&self, item: GalleryItem) -> Result<SaveOutcome, GalleryError>;

    /// Every saved item, oldest first.
    async fn list_all(&self) -> Result<Vec<GalleryItem>, GalleryError>;

    /// Whether any saved item carries this image URL.
    async fn exists_by_url(&self, url: &str) -> Result<bool, GalleryError>;
}

/// [`GalleryStore`] backed by one JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes the read-modify-write cycle of [`append`](GalleryStore::append).
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document. A missing file is an empty gallery;
    /// unreadable content is treated as empty rather than wedging every
    /// future save.
    async fn read_items(&self) -> Result<Vec<GalleryItem>, GalleryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(items) => Ok(items),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "corrupt gallery store, starting empty");
                Ok(Vec::new())
            }
        }
    }

    async fn write_items(&self, items: &[GalleryItem]) -> Result<(), GalleryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

fn holds_url(item: &GalleryItem, url: &str) -> bool {
    item.thumbnail_url == url || item.images.iter().any(|i| i == url)
}

#[async_trait]
impl GalleryStore for JsonFileStore {
    async fn append(&self, item: GalleryItem) -> Result<SaveOutcome, GalleryError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_items().await?;
        if items.iter().any(|existing| holds_url(existing, &item.thumbnail_url)) {
            return Ok(SaveOutcome::AlreadySaved);
        }
        items.push(item.clone());
        self.write_items(&items).await?;
        tracing::info!(id = %item.id, title = %item.title, "gallery item saved");
        Ok(SaveOutcome::Saved(item))
    }

    async fn list_all(&self) -> Result<Vec<GalleryItem>, GalleryError> {
        self.read_items().await
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool, GalleryError> {
        let items = self.read_items().await?;
        Ok(items.iter().any(|item| holds_url(item, url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::GalleryKind;
    use assert_matches::assert_matches;

    fn item(url: &str) -> GalleryItem {
        GalleryItem::new(
            "Photoshoot",
            "fashn",
            url,
            vec![url.to_string()],
            GalleryKind::AllInOne,
        )
    }

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("gallery.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn append_then_list_round_trips() {
        let (_dir, store) = store();
        assert!(store.list_all().await.unwrap().is_empty());

        store.append(item("https://img/1.png")).await.unwrap();
        store.append(item("https://img/2.png")).await.unwrap();

        let items = store.list_all().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].thumbnail_url, "https://img/1.png");
        assert!(store.exists_by_url("https://img/2.png").await.unwrap());
        assert!(!store.exists_by_url("https://img/3.png").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_url_is_a_no_op() {
        let (_dir, store) = store();
        assert_matches!(
            store.append(item("https://img/1.png")).await.unwrap(),
            SaveOutcome::Saved(_)
        );
        assert_matches!(
            store.append(item("https://img/1.png")).await.unwrap(),
            SaveOutcome::AlreadySaved
        );
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_store_content_is_treated_as_empty() {
        let (_dir, store) = store();
        tokio::fs::write(store.path(), b"not json {{{").await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());

        // Saving over a corrupt store starts a fresh document.
        store.append(item("https://img/1.png")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deep/gallery.json"));
        store.append(item("https://img/1.png")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
