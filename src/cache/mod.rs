//! 缓存模块
//!
//! 按 (库, 工作流步骤) 缓存获取到的文档。目录结构：
//!
//! - `index.json`：缓存索引（格式化 JSON）
//! - `{library}_{step}.md`：文档正文
//! - `.lock`：仅用于建议性文件锁
//!
//! 索引的每次读写都在锁内完成。获取锁失败时读路径视为缓存为空，写路径跳过持久化。

pub mod lock;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use lock::CacheLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 索引文件名
pub const INDEX_FILE: &str = "index.json";

/// 锁文件名
pub const LOCK_FILE: &str = ".lock";

/// 构建缓存键
#[must_use]
pub fn cache_key(library: &str, step: &str) -> String {
    format!("{library}_{step}")
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 缓存键（`{library}_{step}`）
    #[serde(default)]
    pub cache_key: String,

    /// 写入时间（ISO-8601）
    pub timestamp: String,

    /// Context7 库 ID
    pub library_id: String,
}

impl CacheEntry {
    /// 以给定时间创建条目
    #[must_use]
    pub fn new(cache_key: String, library_id: String, now: DateTime<Utc>) -> Self {
        Self {
            cache_key,
            timestamp: now.to_rfc3339(),
            library_id,
        }
    }

    /// 解析写入时间；不带时区的时间戳按本地时间处理
    #[must_use]
    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// 条目在 `now` 时是否仍有效（严格小于有效期）
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.cached_at().is_some_and(|cached| now - cached < ttl)
    }
}

/// 缓存索引
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheIndex {
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    /// 从磁盘读取索引。文件不存在或已损坏时返回空索引。
    ///
    /// 调用方必须持有缓存锁。
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(index) => Ok(index),
            Err(e) => {
                tracing::warn!("Cache index corrupted, resetting: {e}");
                Ok(Self::default())
            }
        }
    }

    /// 写入索引。调用方必须持有缓存锁。
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 查找条目
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// 插入或覆盖条目
    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.cache_key.clone(), entry);
    }

    /// 条目数量
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按键顺序遍历条目
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }
}

/// 已缓存文档的概要信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDocument {
    /// 缓存键
    pub cache_key: String,
    /// 正文大小（字节）
    pub size_bytes: u64,
}

/// 文档缓存服务
#[derive(Debug)]
pub struct DocCache {
    dir: PathBuf,
    ttl: chrono::Duration,
    lock_timeout: Duration,
    index: CacheIndex,
}

impl DocCache {
    /// 创建缓存，确保目录存在
    ///
    /// # Errors
    ///
    /// 无法创建缓存目录时返回错误
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let ttl = i64::try_from(config.ttl_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .ok_or_else(|| Error::Config(format!("缓存有效期过大: {}", config.ttl_days)))?;
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir.clone(),
            ttl,
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
            index: CacheIndex::default(),
        })
    }

    /// 缓存目录
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 最近一次从磁盘读到的索引
    #[must_use]
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.md"))
    }

    async fn lock(&self) -> Result<CacheLock> {
        CacheLock::acquire(&self.lock_path(), self.lock_timeout).await
    }

    /// 读取缓存的文档
    ///
    /// 条目缺失、过期、正文文件丢失或无法获取锁时都返回 `None`。
    pub async fn lookup(&mut self, library: &str, step: &str) -> Option<String> {
        let key = cache_key(library, step);

        let _guard = match self.lock().await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!("Could not acquire lock for reading cache ({key}): {e}");
                return None;
            }
        };

        match CacheIndex::load(&self.index_path()) {
            Ok(index) => self.index = index,
            Err(e) => {
                tracing::warn!("Could not read cache index: {e}");
                return None;
            }
        }

        let entry = self.index.get(&key)?;
        if !entry.is_valid_at(Utc::now(), self.ttl) {
            tracing::debug!("Cache entry expired: {key}");
            return None;
        }

        let body_path = self.body_path(&key);
        match fs::read_to_string(&body_path) {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!("Cache body missing for {key} ({}): {e}", body_path.display());
                None
            }
        }
    }

    /// 写入文档并更新索引
    ///
    /// 返回是否成功持久化；失败只记录日志。
    pub async fn store(&mut self, library: &str, step: &str, body: &str, library_id: &str) -> bool {
        let key = cache_key(library, step);

        let _guard = match self.lock().await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("Could not acquire lock for caching docs ({key}): {e}");
                return false;
            }
        };

        match self.write_entry(&key, body, library_id) {
            Ok(()) => {
                tracing::debug!("Cached documentation for {library} (ID: {library_id})");
                true
            }
            Err(e) => {
                tracing::error!("Could not write cache entry {key}: {e}");
                false
            }
        }
    }

    fn write_entry(&mut self, key: &str, body: &str, library_id: &str) -> Result<()> {
        fs::write(self.body_path(key), body)?;

        let index_path = self.index_path();
        let mut index = CacheIndex::load(&index_path)?;
        index.insert(CacheEntry::new(key.to_string(), library_id.to_string(), Utc::now()));
        index.save(&index_path)?;

        self.index = index;
        Ok(())
    }

    /// 清空缓存内容（保留锁文件）
    ///
    /// # Errors
    ///
    /// 无法获取锁或删除文件失败时返回错误
    pub async fn clear(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let _guard = self.lock().await?;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name() == LOCK_FILE {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }

        self.index = CacheIndex::default();
        Ok(())
    }

    /// 列出已缓存的文档正文，按键排序
    ///
    /// # Errors
    ///
    /// 无法读取缓存目录时返回错误
    pub fn cached_documents(&self) -> Result<Vec<CachedDocument>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                if let Some(stem) = path.file_stem() {
                    docs.push(CachedDocument {
                        cache_key: stem.to_string_lossy().into_owned(),
                        size_bytes: entry.metadata()?.len(),
                    });
                }
            }
        }
        docs.sort_by(|a, b| a.cache_key.cmp(&b.cache_key));
        Ok(docs)
    }
}
