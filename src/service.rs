//! 触发分发与守护进程装配
//!
//! 文件监听 → 防抖 → 分发器；闹钟 → 分发器。分发器为每个触发启动任务，
//! 并发的重复触发由 `SyncState` 中的运行守卫拒绝。

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::debounce::Debouncer;
use crate::health::HealthChecker;
use crate::provider::BookmarkEvent;
use crate::scheduler;
use crate::sync::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Sync,
    HealthCheck,
}

/// 接收触发并启动对应的运行
#[derive(Clone)]
pub struct Dispatcher {
    sync: Arc<SyncEngine>,
    health: Arc<HealthChecker>,
}

impl Dispatcher {
    pub fn new(sync: Arc<SyncEngine>, health: Arc<HealthChecker>) -> Self {
        Self { sync, health }
    }

    /// 通道关闭后退出
    pub fn spawn(self, mut rx: mpsc::Receiver<Trigger>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(trigger) = rx.recv().await {
                debug!("Dispatching {:?}", trigger);
                self.dispatch(trigger);
            }
            debug!("Trigger channel closed, dispatcher stopping");
        })
    }

    pub fn dispatch(&self, trigger: Trigger) -> JoinHandle<()> {
        match trigger {
            Trigger::Sync => {
                let sync = self.sync.clone();
                tokio::spawn(async move {
                    // 失败已在 SyncEngine 中记录
                    let _ = sync.sync().await;
                })
            }
            Trigger::HealthCheck => {
                let health = self.health.clone();
                tokio::spawn(async move {
                    let _ = health.run().await;
                })
            }
        }
    }
}

/// 把文件系统事件映射为书签事件；与书签无关的事件返回 None
pub fn classify_fs_event(kind: &EventKind) -> Option<BookmarkEvent> {
    match kind {
        EventKind::Create(_) => Some(BookmarkEvent::Created),
        EventKind::Remove(_) => Some(BookmarkEvent::Removed),
        EventKind::Modify(ModifyKind::Name(_)) => Some(BookmarkEvent::Moved),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(BookmarkEvent::Changed),
        _ => None,
    }
}

/// 事件路径是否属于被监听的书签文件 (包括 SQLite 的 -wal/-journal 伴随文件)
fn touches(target: &Path, paths: &[PathBuf]) -> bool {
    let Some(name) = target.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    paths.iter().any(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(name))
            .unwrap_or(false)
    })
}

/// 监听书签文件所在目录，变化送入防抖器
///
/// 浏览器通常以"写临时文件再重命名"的方式保存，所以监听目录而不是文件本身。
pub fn watch_bookmarks(path: &Path, debouncer: Debouncer) -> Result<RecommendedWatcher> {
    let dir = path
        .parent()
        .with_context(|| format!("{:?} has no parent directory", path))?
        .to_path_buf();
    let target = path.to_path_buf();

    let mut watcher = notify::recommended_watcher(
        move |res: std::result::Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !touches(&target, &event.paths) {
                    return;
                }
                if let Some(change) = classify_fs_event(&event.kind) {
                    debouncer.notify(change);
                }
            }
            Err(e) => warn!("⚠️  Bookmark watcher error: {}", e),
        },
    )
    .context("failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {:?}", dir))?;
    info!("👀 Watching {:?} for bookmark changes", path);
    Ok(watcher)
}

/// 守护进程：启动同步、文件监听、闹钟，直到 Ctrl+C
pub async fn run_daemon(
    settings: &Settings,
    sync: Arc<SyncEngine>,
    health: Arc<HealthChecker>,
    watch_path: Option<PathBuf>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel(16);
    let dispatcher = Dispatcher::new(sync, health);
    let dispatcher_handle = dispatcher.clone().spawn(rx);

    if settings.sync_on_startup {
        info!("🚀 Initial sync on startup");
        if let Err(e) = dispatcher.dispatch(Trigger::Sync).await {
            error!("❌ Startup sync task failed: {}", e);
        }
    }

    let (debouncer, debounce_handle) = Debouncer::spawn(settings.debounce(), tx.clone());
    let watcher = match (&watch_path, settings.auto_sync) {
        (Some(path), true) => match watch_bookmarks(path, debouncer.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("⚠️  Change detection disabled: {:#}", e);
                None
            }
        },
        (None, true) => {
            info!("ℹ️  Bookmark source cannot be watched, relying on periodic sync");
            None
        }
        (_, false) => None,
    };

    let mut alarms = scheduler::start_alarms(scheduler::alarms_from_settings(settings), tx).await?;

    info!("🔄 Running as daemon. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down...");

    alarms.shutdown().await?;
    drop(watcher);
    drop(debouncer);
    let _ = debounce_handle.await;
    dispatcher_handle.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn test_classify_fs_event() {
        assert_eq!(
            classify_fs_event(&EventKind::Create(CreateKind::File)),
            Some(BookmarkEvent::Created)
        );
        assert_eq!(
            classify_fs_event(&EventKind::Remove(RemoveKind::File)),
            Some(BookmarkEvent::Removed)
        );
        assert_eq!(
            classify_fs_event(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(BookmarkEvent::Moved)
        );
        assert_eq!(
            classify_fs_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(BookmarkEvent::Changed)
        );
        assert_eq!(
            classify_fs_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime))),
            None
        );
        assert_eq!(classify_fs_event(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn test_touches_companion_files() {
        let target = Path::new("/profile/places.sqlite");
        assert!(touches(target, &[PathBuf::from("/profile/places.sqlite-wal")]));
        assert!(!touches(target, &[PathBuf::from("/profile/cookies.sqlite")]));

        let chrome = Path::new("/Default/Bookmarks");
        assert!(touches(chrome, &[PathBuf::from("/Default/Bookmarks.bak")]));
        assert!(!touches(chrome, &[PathBuf::from("/Default/History")]));
    }
}
