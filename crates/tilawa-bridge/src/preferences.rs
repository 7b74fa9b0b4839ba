//! Key-value store for user preferences.
//!
//! Both the host and controllers write to it. Writes are last-write-wins and a
//! write is not guaranteed to be visible to another component's immediately
//! following read.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::{
    fs::{OpenOptions, create_dir_all, read_to_string, rename},
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
};

pub use toml::Value;

/// Preference keys shared between components.
pub mod keys {
    pub const RECITER_ID: &str = "reciter_id";
    pub const MOSHAF_ID: &str = "moshaf_id";
    pub const SURAH_ID: &str = "surah_id";
    pub const VOLUME: &str = "volume";
    pub const LANGUAGE: &str = "language";
}

/// Errors that can occur while reading or writing the preference file.
#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("failed to access preferences: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to deserialize preferences: {0}")]
    DeserializeError(#[from] toml::de::Error),
    #[error("failed to serialize preferences: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

struct StoreInner {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, Value>>,
    /// Held from taking a snapshot until it is on disk, so files are written
    /// in the same order as the snapshots they hold.
    writer: Mutex<()>,
}

/// Shared handle to the preference store.
#[derive(Clone)]
pub struct PreferenceStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PreferenceStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl PreferenceStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: None,
                values: RwLock::new(BTreeMap::new()),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Opens `preferences.toml` in the user's configuration directory.
    pub async fn open_default() -> Result<Self, PreferenceError> {
        Self::open(crate::config::config_dir()?.join("preferences.toml")).await
    }

    /// Opens a file-backed store. A missing file starts out empty.
    pub async fn open(path: PathBuf) -> Result<Self, PreferenceError> {
        let values = if path.exists() {
            let contents = read_to_string(&path).await?;
            toml::from_str::<BTreeMap<String, Value>>(&contents)?
        } else {
            BTreeMap::new()
        };
        log::info!("Opened preferences at {path:?} with {} key(s)", values.len());

        Ok(Self {
            inner: Arc::new(StoreInner {
                path: Some(path),
                values: RwLock::new(values),
                writer: Mutex::new(()),
            }),
        })
    }

    /// Returns the stored values for the requested keys. Missing keys are
    /// absent from the result.
    pub async fn get(&self, keys: &[&str]) -> BTreeMap<String, Value> {
        let values = self.inner.values.read().await;
        keys.iter()
            .filter_map(|key| {
                values
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }

    /// Returns a single value.
    pub async fn get_one(&self, key: &str) -> Option<Value> {
        self.inner.values.read().await.get(key).cloned()
    }

    /// Merges `entries` into the store and persists the result.
    ///
    /// The file is replaced atomically: a new version is written next to it
    /// and renamed over the old one.
    pub async fn set(&self, entries: BTreeMap<String, Value>) -> Result<(), PreferenceError> {
        let _writer = self.inner.writer.lock().await;
        let snapshot = {
            let mut values = self.inner.values.write().await;
            values.extend(entries);
            values.clone()
        };

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }
        let contents = toml::to_string_pretty(&snapshot)?;
        let staging = path.with_extension("toml.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        rename(&staging, path).await?;

        Ok(())
    }

    /// Stores a single value.
    pub async fn set_one(
        &self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), PreferenceError> {
        self.set(BTreeMap::from([(key.to_string(), value.into())]))
            .await
    }

    /// Reads a float, accepting integers as well.
    pub async fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get_one(key).await? {
            Value::Float(value) => Some(value),
            Value::Integer(value) => Some(value as f64),
            _ => None,
        }
    }

    pub async fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get_one(key).await? {
            Value::Integer(value) => u32::try_from(value).ok(),
            _ => None,
        }
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        match self.get_one(key).await? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_only_present_keys() {
        let store = PreferenceStore::in_memory();
        store.set_one(keys::VOLUME, 0.5).await.unwrap();

        let values = store.get(&[keys::VOLUME, keys::SURAH_ID]).await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[keys::VOLUME], Value::Float(0.5));
    }

    #[tokio::test]
    async fn typed_getters() {
        let store = PreferenceStore::in_memory();
        store
            .set(BTreeMap::from([
                (keys::RECITER_ID.to_string(), Value::Integer(102)),
                (keys::LANGUAGE.to_string(), Value::String("ar".to_string())),
                (keys::VOLUME.to_string(), Value::Integer(1)),
            ]))
            .await
            .unwrap();

        assert_eq!(store.get_u32(keys::RECITER_ID).await, Some(102));
        assert_eq!(store.get_string(keys::LANGUAGE).await.as_deref(), Some("ar"));
        assert_eq!(store.get_f64(keys::VOLUME).await, Some(1.0));
        assert_eq!(store.get_u32(keys::LANGUAGE).await, None);
        assert_eq!(store.get_u32(keys::MOSHAF_ID).await, None);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = PreferenceStore::in_memory();
        store.set_one(keys::VOLUME, 0.2).await.unwrap();
        store.set_one(keys::VOLUME, 0.9).await.unwrap();
        assert_eq!(store.get_f64(keys::VOLUME).await, Some(0.9));
    }

    #[tokio::test]
    async fn persists_between_openings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");

        let store = PreferenceStore::open(path.clone()).await.unwrap();
        store.set_one(keys::SURAH_ID, 36i64).await.unwrap();
        store.set_one(keys::VOLUME, 0.75).await.unwrap();

        let reopened = PreferenceStore::open(path).await.unwrap();
        assert_eq!(reopened.get_u32(keys::SURAH_ID).await, Some(36));
        assert_eq!(reopened.get_f64(keys::VOLUME).await, Some(0.75));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_all_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        let store = PreferenceStore::open(path.clone()).await.unwrap();

        for round in 0..20 {
            let writes: Vec<_> = (0..6)
                .map(|key| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store
                            .set_one(&format!("round{round}_key{key}"), i64::from(key))
                            .await
                    })
                })
                .collect();
            for write in writes {
                write.await.unwrap().unwrap();
            }

            let reopened = PreferenceStore::open(path.clone()).await.unwrap();
            for key in 0..6 {
                assert_eq!(
                    reopened.get_u32(&format!("round{round}_key{key}")).await,
                    Some(key),
                    "round {round} lost key {key} on disk"
                );
            }
        }
        assert!(!path.with_extension("toml.tmp").exists());
    }
}
