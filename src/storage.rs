use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::error;

/// Browsers give each origin roughly this much local storage.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist store: {0}")]
    Io(#[from] std::io::Error),
}

/// String-keyed persistent store owned by one device.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`. On error the previous value is left in place.
    fn set_item(
        &mut self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    items: BTreeMap<String, String>,
    quota: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            quota,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    async fn set_item(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        check_quota(&self.items, key, &value, self.quota)?;
        self.items.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a single JSON file holding every key.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    items: BTreeMap<String, String>,
    quota: usize,
}

impl FileStore {
    pub async fn open(path: PathBuf, quota: usize) -> Self {
        let items = load_items(&path).await;
        Self { path, items, quota }
    }

    /// Writes the whole map to a staging file, then renames it over the store.
    async fn flush(&self) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(&self.items)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    async fn set_item(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        check_quota(&self.items, key, &value, self.quota)?;
        let previous = self.items.insert(key.to_string(), value);

        if let Err(err) = self.flush().await {
            match previous {
                Some(previous) => self.items.insert(key.to_string(), previous),
                None => self.items.remove(key),
            };
            return Err(err);
        }

        Ok(())
    }
}

pub async fn load_items(path: &Path) -> BTreeMap<String, String> {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(items) => items,
            Err(err) => {
                error!("failed to parse store file: {err}");
                BTreeMap::new()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(err) => {
            error!("failed to read store file: {err}");
            BTreeMap::new()
        }
    }
}

fn check_quota(
    items: &BTreeMap<String, String>,
    key: &str,
    value: &str,
    quota: usize,
) -> Result<(), StoreError> {
    let used: usize = items
        .iter()
        .filter(|(existing, _)| existing.as_str() != key)
        .map(|(existing, stored)| existing.len() + stored.len())
        .sum();
    let needed = used + key.len() + value.len();

    if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_store_path() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("eraya_store_{}_{}.json", std::process::id(), nanos));
        path
    }

    #[tokio::test]
    async fn quota_rejection_keeps_previous_value() {
        let mut store = MemoryStore::with_quota(32);
        store.set_item("k", "small".to_string()).await.unwrap();

        let err = store.set_item("k", "x".repeat(64)).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        assert_eq!(store.get_item("k").as_deref(), Some("small"));
    }

    #[tokio::test]
    async fn replacing_a_key_does_not_count_its_old_value() {
        let mut store = MemoryStore::with_quota(20);
        store.set_item("k", "x".repeat(15)).await.unwrap();
        store.set_item("k", "y".repeat(15)).await.unwrap();
        assert_eq!(store.get_item("k").unwrap().len(), 15);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = unique_store_path();
        let mut store = FileStore::open(path.clone(), DEFAULT_QUOTA_BYTES).await;
        store
            .set_item("erayaUser", r#"{"email":"a@x.com"}"#.to_string())
            .await
            .unwrap();

        let reopened = FileStore::open(path.clone(), DEFAULT_QUOTA_BYTES).await;
        assert_eq!(
            reopened.get_item("erayaUser").as_deref(),
            Some(r#"{"email":"a@x.com"}"#)
        );

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unreadable_store_file_opens_empty() {
        let path = unique_store_path();
        std::fs::write(&path, b"not json").unwrap();

        let store = FileStore::open(path.clone(), DEFAULT_QUOTA_BYTES).await;
        assert!(store.get_item("erayaUser").is_none());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_flush_rolls_back() {
        let mut path = unique_store_path();
        path.push("missing-dir");
        path.push("store.json");
        let mut store = FileStore::open(path, DEFAULT_QUOTA_BYTES).await;

        assert!(matches!(
            store.set_item("k", "v".to_string()).await,
            Err(StoreError::Io(_))
        ));
        assert!(store.get_item("k").is_none());
    }

    #[tokio::test]
    async fn file_store_leaves_no_staging_file_behind() {
        let path = unique_store_path();
        let mut store = FileStore::open(path.clone(), DEFAULT_QUOTA_BYTES).await;
        store.set_item("k", "v".to_string()).await.unwrap();
        store.set_item("k", "w".to_string()).await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let on_disk = load_items(&path).await;
        assert_eq!(on_disk.get("k").map(String::as_str), Some("w"));

        let _ = std::fs::remove_file(path);
    }
}
