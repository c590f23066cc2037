use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::flatten::flatten;
use crate::merge::merge;
use crate::model::now_millis;
use crate::provider::BookmarkProvider;
use crate::state::{RunOutcome, SyncState};
use crate::stats::StatsSnapshot;
use crate::storage::{self, keys, Entries, Storage, StorageError};
use crate::usage;

/// 一次同步的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub bookmarks: usize,
    pub added: usize,
    pub removed: usize,
    pub stats: StatsSnapshot,
    pub synced_at: i64,
}

/// 把原生书签树同步到本地列表
///
/// 读树 → 扁平化 → 与旧列表合并 → 统计 → 一次性写入 (书签、统计、常用书签、同步时间)。
/// 任何一步失败都不会留下部分写入。
pub struct SyncEngine {
    provider: Arc<dyn BookmarkProvider>,
    store: Arc<dyn Storage>,
    state: Arc<SyncState>,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn BookmarkProvider>,
        store: Arc<dyn Storage>,
        state: Arc<SyncState>,
    ) -> Self {
        Self {
            provider,
            store,
            state,
        }
    }

    pub fn state(&self) -> &Arc<SyncState> {
        &self.state
    }

    /// 执行一次同步；已有同步在运行时直接返回 Skipped
    pub async fn sync(&self) -> Result<RunOutcome<SyncReport>> {
        let Some(_ticket) = self.state.sync.try_begin() else {
            info!("⏳ Sync already in progress, ignoring trigger");
            return Ok(RunOutcome::Skipped);
        };

        match self.run().await {
            Ok(report) => {
                info!(
                    "✅ Sync complete: {} bookmarks (+{} / -{})",
                    report.bookmarks, report.added, report.removed
                );
                Ok(RunOutcome::Completed(report))
            }
            Err(e) => {
                error!("❌ Sync failed: {:#}", e);
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<SyncReport> {
        info!("📖 Reading bookmark tree from {}", self.provider.name());
        let tree = self
            .provider
            .get_tree()
            .await
            .context("failed to read native bookmark tree")?;

        let synced_at = now_millis();
        let fresh = flatten(&tree, synced_at);
        debug!("Flattened {} bookmarks", fresh.len());

        let previous = match storage::load_bookmarks(self.store.as_ref()).await {
            Ok(previous) => previous,
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!("⚠️  Stored bookmarks are unreadable, rebuilding from scratch: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e).context("failed to read stored bookmarks"),
        };

        let fresh_ids: HashSet<&str> = fresh.iter().map(|f| f.id.as_str()).collect();
        let removed = previous
            .iter()
            .filter(|p| !fresh_ids.contains(p.id.as_str()))
            .count();
        let previous_ids: HashSet<&str> = previous.iter().map(|p| p.id.as_str()).collect();
        let added = fresh
            .iter()
            .filter(|f| !previous_ids.contains(f.id.as_str()))
            .count();

        let merged = merge(fresh, &previous);
        let stats = StatsSnapshot::from_bookmarks(&merged);

        let entries = Entries::new()
            .put(keys::BOOKMARKS, &merged)?
            .put(keys::STATS, &stats)?
            .put(keys::FREQUENT_BOOKMARKS, &usage::frequent_map(&merged))?
            .put(keys::LAST_SYNC_TIME, &synced_at)?;
        self.store
            .set(entries.into_map())
            .await
            .context("failed to store synchronized bookmarks")?;

        Ok(SyncReport {
            bookmarks: merged.len(),
            added,
            removed,
            stats,
            synced_at,
        })
    }
}
