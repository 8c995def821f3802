//! File-backed JSON documents.
//!
//! Each document is one file under the data directory. Plain reads tolerate a
//! missing or corrupt file by falling back to the default document. Updates
//! refuse to run over a file they cannot parse, so a corrupt document is left
//! on disk for inspection instead of being replaced by an empty one. Every
//! read-modify-write holds the document's mutex for its whole duration and
//! replaces the file through a temporary sibling, so concurrent requests in
//! this process never interleave their updates.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

pub struct JsonStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current document
    pub async fn load(&self) -> T {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Current document, failing on an unreadable or malformed file
    pub async fn try_load(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        self.read_strict_unlocked().await
    }

    /// Apply `f` to the document and persist the result atomically.
    ///
    /// Fails without writing when the existing file is unreadable or malformed.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_strict_unlocked().await?;
        let out = f(&mut doc);
        self.write_unlocked(&doc).await?;
        Ok(out)
    }

    async fn read_unlocked(&self) -> T {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!("Failed to read {}: {}; treating as empty", self.path.display(), e);
                return T::default();
            }
        };

        if contents.trim().is_empty() {
            return T::default();
        }

        match serde_json::from_str(&contents) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring malformed document {}: {}", self.path.display(), e);
                T::default()
            }
        }
    }

    async fn read_strict_unlocked(&self) -> Result<T> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        if contents.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Refusing to overwrite malformed document {}", self.path.display()))
    }

    async fn write_unlocked(&self, doc: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    type Counters = BTreeMap<String, u32>;

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<Counters> = JsonStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store: JsonStore<Counters> = JsonStore::new(&path);
        assert!(store.load().await.is_empty());
        assert!(store.try_load().await.is_err());
    }

    #[tokio::test]
    async fn update_leaves_malformed_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"a\": 1, \"b\": \"oops\"}").unwrap();

        let store: JsonStore<Counters> = JsonStore::new(&path);
        let mut ran = false;
        let res = store
            .update(|doc| {
                ran = true;
                doc.insert("c".into(), 3)
            })
            .await;

        assert!(res.is_err());
        assert!(!ran);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"a\": 1, \"b\": \"oops\"}"
        );
        assert!(!dir.path().join("broken.json.tmp").exists());
    }

    #[tokio::test]
    async fn update_treats_empty_file_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "  \n").unwrap();

        let store: JsonStore<Counters> = JsonStore::new(&path);
        store.update(|doc| doc.insert("a".into(), 1)).await.unwrap();
        assert_eq!(store.load().await.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<JsonStore<Counters>> =
            Arc::new(JsonStore::new(dir.path().join("nested/counter.json")));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(|doc| *doc.entry("hits".into()).or_insert(0) += 1)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.load().await.get("hits"), Some(&20));
        assert!(!dir.path().join("nested/counter.json.tmp").exists());
    }
}
