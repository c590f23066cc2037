//! 书签变更的防抖
//!
//! 每次 `notify` 都会取消尚未触发的同步并重新计时，只有静默 `delay` 之后才发出一次触发。
//! 连续不断的变更不会导致同步频率高于每个窗口一次。所有句柄释放后，未到期的同步被丢弃。

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::provider::BookmarkEvent;
use crate::service::Trigger;

/// 防抖窗口
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<BookmarkEvent>,
}

impl Debouncer {
    /// 启动后台计时任务，静默期结束后向 `target` 发送 `Trigger::Sync`
    pub fn spawn(delay: Duration, target: mpsc::Sender<Trigger>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(delay, rx, target));
        (Self { tx }, handle)
    }

    /// 可从任意线程调用 (包括文件监听回调)
    pub fn notify(&self, event: BookmarkEvent) {
        if self.tx.send(event).is_err() {
            debug!("Debouncer stopped, dropping {:?}", event);
        }
    }
}

async fn run(
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<BookmarkEvent>,
    target: mpsc::Sender<Trigger>,
) {
    while let Some(first) = rx.recv().await {
        debug!("Bookmark {:?}, scheduling sync in {:?}", first, delay);

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(event) => {
                        debug!("Bookmark {:?}, restarting debounce window", event);
                    }
                    None => {
                        // 所有句柄都已释放 (关闭中)，未到期的同步不再发出
                        debug!("Debouncer closed, dropping pending sync");
                        return;
                    }
                },
                _ = tokio::time::sleep(delay) => break,
            }
        }

        if target.send(Trigger::Sync).await.is_err() {
            return;
        }
    }
}
