//! 持久化网关
//!
//! 与浏览器扩展的 `storage.local` 语义一致的键值存储：整值读写，没有字段级更新。
//! 一次 `set` 调用内的所有键要么全部写入，要么全部不写入。
//!
//! ⚠️ 没有事务隔离：并发的"读整表-修改-写整表"可能丢失更新，这是可接受的尽力一致性。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::BookmarkRecord;
use crate::stats::StatsSnapshot;

/// 存储键
pub mod keys {
    pub const BOOKMARKS: &str = "bookmarks";
    pub const STATS: &str = "stats";
    pub const FREQUENT_BOOKMARKS: &str = "frequentBookmarks";
    pub const LAST_SYNC_TIME: &str = "lastSyncTime";
    pub const HEALTH_CHECK_PROGRESS: &str = "healthCheckProgress";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value under key '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 键值存储接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 读取若干键，不存在的键不出现在结果中
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError>;

    /// 原子地写入一组键
    async fn set(&self, entries: Map<String, Value>) -> Result<(), StorageError>;
}

/// 一次写入的键值集合
#[derive(Debug, Default)]
pub struct Entries(Map<String, Value>);

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Result<Self, StorageError> {
        let encoded = serde_json::to_value(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.0.insert(key.to_string(), encoded);
        Ok(self)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

fn decode<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Result<Option<T>, StorageError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
    }
}

/// 读取书签列表 (不存在时为空列表)
pub async fn load_bookmarks(store: &dyn Storage) -> Result<Vec<BookmarkRecord>, StorageError> {
    let mut map = store.get(&[keys::BOOKMARKS]).await?;
    Ok(decode(&mut map, keys::BOOKMARKS)?.unwrap_or_default())
}

/// 读取统计信息和上次同步时间
pub async fn load_stats(store: &dyn Storage) -> Result<(StatsSnapshot, Option<i64>), StorageError> {
    let mut map = store.get(&[keys::STATS, keys::LAST_SYNC_TIME]).await?;
    let stats = decode(&mut map, keys::STATS)?.unwrap_or_default();
    let last_sync = decode(&mut map, keys::LAST_SYNC_TIME)?;
    Ok((stats, last_sync))
}

pub async fn load_progress(store: &dyn Storage) -> Result<Option<u8>, StorageError> {
    let mut map = store.get(&[keys::HEALTH_CHECK_PROGRESS]).await?;
    decode(&mut map, keys::HEALTH_CHECK_PROGRESS)
}

pub async fn load_frequent(store: &dyn Storage) -> Result<BTreeMap<String, u64>, StorageError> {
    let mut map = store.get(&[keys::FREQUENT_BOOKMARKS]).await?;
    Ok(decode(&mut map, keys::FREQUENT_BOOKMARKS)?.unwrap_or_default())
}

/// 内存存储 (测试和一次性运行)
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已完成的 `set` 调用次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let data = self.data.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StorageError> {
        let mut data = self.data.lock().await;
        data.extend(entries);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 基于单个 JSON 文件的存储
///
/// 每次写入都会读入整个文件、合并后写临时文件再重命名，保证写入的原子性。
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            key: "*".to_string(),
            source,
        })
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl Storage for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        Ok(keys
            .iter()
            .filter_map(|k| all.remove(*k).map(|v| (k.to_string(), v)))
            .collect())
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        let written: Vec<String> = entries.keys().cloned().collect();
        all.extend(entries);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        let content = serde_json::to_string_pretty(&all).map_err(|source| StorageError::Encode {
            key: "*".to_string(),
            source,
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!("💾 Stored keys {:?} in {:?}", written, self.path);
        Ok(())
    }
}
