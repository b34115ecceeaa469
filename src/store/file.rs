// src/store/file.rs
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{fs, sync::Mutex};

use super::{ContentStore, Expected, StoreError, Versioned};

/// One JSON file per key under `dir`. Writes go through a temp file + rename.
/// The internal lock makes compare-and-swap atomic within this process.
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u64,
    value: Value,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_name_for(key)))
    }

    async fn read(&self, key: &str) -> Result<Option<Envelope>, StoreError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Serde {
                    key: key.to_string(),
                    source,
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn check(key: &str, expected: Expected, current: Option<u64>) -> Result<(), StoreError> {
        if expected.admits(current) {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                found: current,
            })
        }
    }
}

/// Keys contain ':' and may contain other characters unfit for file names.
fn file_name_for(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl ContentStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let _g = self.lock.lock().await;
        Ok(self.read(key).await?.map(|e| Versioned {
            version: e.version,
            value: e.value,
        }))
    }

    async fn put(&self, key: &str, value: Value, expected: Expected) -> Result<u64, StoreError> {
        let _g = self.lock.lock().await;
        let current = self.read(key).await?.map(|e| e.version);
        Self::check(key, expected, current)?;

        let version = current.unwrap_or(0) + 1;
        let bytes = serde_json::to_vec_pretty(&Envelope { version, value }).map_err(|source| {
            StoreError::Serde {
                key: key.to_string(),
                source,
            }
        })?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let io = |source: std::io::Error| StoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::write(&tmp, bytes).await.map_err(io)?;
        fs::rename(&tmp, &path).await.map_err(io)?;
        Ok(version)
    }

    async fn delete(&self, key: &str, expected: Expected) -> Result<(), StoreError> {
        let _g = self.lock.lock().await;
        let current = self.read(key).await?.map(|e| e.version);
        Self::check(key, expected, current)?;
        if current.is_none() {
            return Ok(());
        }
        fs::remove_file(self.path_for(key))
            .await
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{get_json, put_json};

    #[test]
    fn file_names_are_escaped() {
        assert_eq!(file_name_for("batch:b1"), "batch%3Ab1");
        assert_eq!(file_name_for("processed_news_ids"), "processed_news_ids");
    }

    #[tokio::test]
    async fn values_survive_reopen_and_versions_advance() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(tmp.path()).await.unwrap();
            put_json(&store, "batch:b1", &vec!["a", "b"]).await.unwrap();
            let v = store
                .put("batch:b1", serde_json::json!(["c"]), Expected::Version(1))
                .await
                .unwrap();
            assert_eq!(v, 2);
        }
        let store = FileStore::open(tmp.path()).await.unwrap();
        let got: Option<Vec<String>> = get_json(&store, "batch:b1").await.unwrap();
        assert_eq!(got, Some(vec!["c".to_string()]));

        let stale = store
            .put("batch:b1", serde_json::json!([]), Expected::Version(1))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { found: Some(2), .. })));
    }
}
