//! CogniMark: 浏览器书签的本地镜像
//!
//! 从浏览器读取书签树并扁平化，与本地记录合并 (保留健康状态、快照、点击次数)，
//! 分批检查链接健康，统计各状态数量，并提供搜索、常用书签与页面快照。

pub mod config;
pub mod debounce;
pub mod flatten;
pub mod health;
pub mod merge;
pub mod model;
pub mod page_text;
pub mod progress;
pub mod provider;
pub mod router;
pub mod scheduler;
pub mod search;
pub mod service;
pub mod state;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod usage;

pub use health::{HealthCheckConfig, HealthChecker, HttpProber, ProbeOutcome, Prober};
pub use model::{BookmarkNode, BookmarkRecord, FlatBookmark, HealthStatus};
pub use provider::{BookmarkEvent, BookmarkProvider};
pub use state::{RunOutcome, SyncState};
pub use stats::StatsSnapshot;
pub use storage::{JsonFileStore, MemoryStore, Storage, StorageError};
pub use sync::{SyncEngine, SyncReport};
