//! # Trend Store
//!
//! Persistent record of every item seen and whether it has been notified,
//! plus a small key/value settings table (the worker's "active" toggle).
//!
//! - `notified` is monotonic: upserts never clear it, only `mark_notified` sets it.
//! - Each mutation is all-or-nothing: the new snapshot is written to a temp
//!   file, synced, and renamed over the old one before memory is updated.
//! - A corrupt or empty state file is an error at open time. Only a missing
//!   file starts a fresh store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::item::{Category, Item};

/// Settings key consulted by the worker every tick.
pub const ACTIVE_KEY: &str = "bot_active";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file {path} exists but is empty")]
    Empty { path: PathBuf },

    #[error("serializing state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Filter for [`TrendStore::list`]. Results are ordered by engagement score, descending.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub category: Option<Category>,
    pub notified_only: bool,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn top(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_items: usize,
    pub notified_items: usize,
}

#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Insert or update by id, keeping an existing `notified = true`.
    async fn upsert(&self, item: &Item) -> StoreResult<()>;

    /// Same as `upsert` for every item; implementations may write once.
    async fn upsert_all(&self, items: &[Item]) -> StoreResult<()> {
        for it in items {
            self.upsert(it).await?;
        }
        Ok(())
    }

    async fn is_notified(&self, id: &str) -> StoreResult<bool>;

    /// Irreversible. Unknown ids are ignored.
    async fn mark_notified(&self, id: &str) -> StoreResult<()>;

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<Item>>;

    /// Notified items, most recently seen first.
    async fn reports(&self, limit: usize) -> StoreResult<Vec<Item>>;

    async fn stats(&self) -> StoreResult<StoreStats>;

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Active unless the toggle is explicitly set to something other than "1"/"true".
    async fn is_active(&self) -> StoreResult<bool> {
        Ok(self
            .get_setting(ACTIVE_KEY)
            .await?
            .map_or(true, |v| is_truthy(&v)))
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    items: BTreeMap<String, Item>,
    #[serde(default)]
    settings: BTreeMap<String, String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(ACTIVE_KEY.to_string(), "1".to_string());
        Self {
            items: BTreeMap::new(),
            settings,
        }
    }
}

impl Snapshot {
    fn apply_upsert(&mut self, incoming: &Item) {
        match self.items.get_mut(&incoming.id) {
            Some(existing) => {
                let notified = existing.notified || incoming.notified;
                let first_seen = existing.first_seen_at.or(incoming.first_seen_at);
                let insight = incoming.insight.clone().or_else(|| existing.insight.take());
                let category = incoming.category.or(existing.category);
                *existing = incoming.clone();
                existing.notified = notified;
                existing.first_seen_at = first_seen;
                existing.insight = insight;
                existing.category = category;
            }
            None => {
                let mut it = incoming.clone();
                if it.first_seen_at.is_none() {
                    it.first_seen_at = it.last_seen_at;
                }
                self.items.insert(it.id.clone(), it);
            }
        }
    }
}

/// JSON-file backed store. `path = None` keeps everything in memory.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    state: Mutex<Snapshot>,
}

impl JsonFileStore {
    /// Open (or create on first write) the state file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                return Err(StoreError::Empty { path });
            }
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        tracing::info!(
            path = %path.display(),
            items = snapshot.items.len(),
            "trend store opened"
        );
        Ok(Self {
            path: Some(path),
            state: Mutex::new(snapshot),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Snapshot::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        let mut f = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        f.write_all(&bytes).await.map_err(io_err)?;
        f.sync_all().await.map_err(io_err)?;
        drop(f);
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }

    /// Apply `f` to a copy, persist it, then commit it in memory.
    async fn mutate<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        f(&mut next);
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }
}

fn by_engagement_desc(a: &Item, b: &Item) -> std::cmp::Ordering {
    b.engagement_score.total_cmp(&a.engagement_score)
}

#[async_trait]
impl TrendStore for JsonFileStore {
    async fn upsert(&self, item: &Item) -> StoreResult<()> {
        self.mutate(|s| s.apply_upsert(item)).await
    }

    async fn upsert_all(&self, items: &[Item]) -> StoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.mutate(|s| {
            for it in items {
                s.apply_upsert(it);
            }
        })
        .await
    }

    async fn is_notified(&self, id: &str) -> StoreResult<bool> {
        let guard = self.state.lock().await;
        Ok(guard.items.get(id).is_some_and(|it| it.notified))
    }

    async fn mark_notified(&self, id: &str) -> StoreResult<()> {
        {
            let guard = self.state.lock().await;
            match guard.items.get(id) {
                Some(it) if it.notified => return Ok(()),
                Some(_) => {}
                None => {
                    tracing::warn!(item_id = id, "mark_notified on unknown item ignored");
                    return Ok(());
                }
            }
        }
        self.mutate(|s| {
            if let Some(it) = s.items.get_mut(id) {
                it.notified = true;
            }
        })
        .await
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<Item>> {
        let guard = self.state.lock().await;
        let mut out: Vec<Item> = guard
            .items
            .values()
            .filter(|it| query.category.map_or(true, |c| it.category == Some(c)))
            .filter(|it| !query.notified_only || it.notified)
            .cloned()
            .collect();
        out.sort_by(by_engagement_desc);
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn reports(&self, limit: usize) -> StoreResult<Vec<Item>> {
        let guard = self.state.lock().await;
        let mut out: Vec<Item> = guard
            .items
            .values()
            .filter(|it| it.notified)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let guard = self.state.lock().await;
        Ok(StoreStats {
            total_items: guard.items.len(),
            notified_items: guard.items.values().filter(|it| it.notified).count(),
        })
    }

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let guard = self.state.lock().await;
        Ok(guard.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.mutate(|s| {
            s.settings.insert(key.to_string(), value.to_string());
        })
        .await
    }
}
