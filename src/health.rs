//! 书签健康检查
//!
//! 将书签列表按固定大小分批，每批内并发探测，每个探测单独受超时约束。
//! 每批完成后更新状态、对整个列表重新统计、写入进度；批与批之间固定延迟，限制对外请求速率。
//!
//! 分类规则：
//! - 2xx → healthy
//! - 3xx → redirect (不跟随重定向)
//! - >= 400 → broken
//! - 超时 → timeout
//! - 其他传输错误 (DNS、连接被拒、TLS) → error

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::model::{now_millis, HealthStatus};
use crate::state::{RunOutcome, SyncState};
use crate::stats::StatsSnapshot;
use crate::storage::{self, keys, Entries, Storage};

/// 探测请求使用的 User-Agent
pub const USER_AGENT: &str = "CogniMark/1.0";

/// 单次探测的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// 收到 HTTP 响应
    Status(u16),
    /// 超过探测超时
    TimedOut,
    /// 其他传输层失败
    Failed(String),
}

impl ProbeOutcome {
    pub fn classify(&self) -> HealthStatus {
        match self {
            ProbeOutcome::Status(code) => match *code {
                200..=299 => HealthStatus::Healthy,
                300..=399 => HealthStatus::Redirect,
                400..=u16::MAX => HealthStatus::Broken,
                _ => HealthStatus::Unknown,
            },
            ProbeOutcome::TimedOut => HealthStatus::Timeout,
            ProbeOutcome::Failed(_) => HealthStatus::Error,
        }
    }
}

/// 链接探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// 不能通过 HTTP 探测的 URL，返回原因
pub fn unsupported_reason(url: &str) -> Option<&'static str> {
    let url_lower = url.trim().to_lowercase();

    if url_lower.is_empty() {
        return Some("Empty URL");
    }
    if url_lower.starts_with("javascript:") {
        return Some("JavaScript URL");
    }
    if url_lower.starts_with("data:") {
        return Some("Data URL");
    }
    if url_lower.starts_with("file:") {
        return Some("Local file");
    }
    if url_lower.starts_with("about:")
        || url_lower.starts_with("chrome://")
        || url_lower.starts_with("brave://")
        || url_lower.starts_with("edge://")
    {
        return Some("Browser internal URL");
    }
    if !(url_lower.starts_with("http://") || url_lower.starts_with("https://")) {
        return Some("Unsupported scheme");
    }

    None
}

/// 基于 reqwest 的探测器
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn from_error(e: reqwest::Error) -> ProbeOutcome {
        if e.is_timeout() {
            ProbeOutcome::TimedOut
        } else {
            ProbeOutcome::Failed(e.to_string())
        }
    }

    /// 仅取响应头，不读取 body
    async fn get_status(&self, url: &str) -> ProbeOutcome {
        match self.client.get(url).send().await {
            Ok(response) => ProbeOutcome::Status(response.status().as_u16()),
            Err(e) => Self::from_error(e),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    /// 先 HEAD，返回 405 时回退到 GET
    async fn probe(&self, url: &str) -> ProbeOutcome {
        if let Some(reason) = unsupported_reason(url) {
            return ProbeOutcome::Failed(reason.to_string());
        }

        match self.client.head(url).send().await {
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!("HEAD returned 405, retrying with GET: {}", url);
                self.get_status(url).await
            }
            Ok(response) => ProbeOutcome::Status(response.status().as_u16()),
            Err(e) => Self::from_error(e),
        }
    }
}

/// 健康检查参数
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub batch_size: usize,
    pub probe_timeout: Duration,
    pub batch_delay: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            probe_timeout: Duration::from_secs(10),
            batch_delay: Duration::from_secs(2),
        }
    }
}

/// 一次完整检查的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub checked: usize,
    pub stats: StatsSnapshot,
}

/// 每批完成后的回调: (已完成数, 总数)
pub type ProgressObserver = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub struct HealthChecker {
    store: Arc<dyn Storage>,
    prober: Arc<dyn Prober>,
    state: Arc<SyncState>,
    config: HealthCheckConfig,
    observer: Option<ProgressObserver>,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn Storage>,
        prober: Arc<dyn Prober>,
        state: Arc<SyncState>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            store,
            prober,
            state,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> &Arc<SyncState> {
        &self.state
    }

    /// 执行一次健康检查；已有检查在运行时直接返回 Skipped
    pub async fn run(&self) -> Result<RunOutcome<HealthSummary>> {
        let Some(_ticket) = self.state.health.try_begin() else {
            info!("⏳ Health check already in progress, ignoring trigger");
            return Ok(RunOutcome::Skipped);
        };

        self.state.health_started();
        match self.run_batches().await {
            Ok(summary) => {
                self.state.health_finished();
                info!("✅ Health check complete: {}", summary.stats.summary_line());
                Ok(RunOutcome::Completed(summary))
            }
            Err(e) => {
                error!("❌ Health check failed: {:#}", e);
                self.state.health_failed();
                Err(e)
            }
        }
    }

    async fn run_batches(&self) -> Result<HealthSummary> {
        let initial = storage::load_bookmarks(self.store.as_ref())
            .await
            .context("failed to list bookmarks for health check")?;
        let ids: Vec<String> = initial.into_iter().map(|b| b.id).collect();
        let total = ids.len();
        info!("🩺 Starting health check: {} bookmarks", total);

        let batch_size = self.config.batch_size.max(1);
        let mut completed = 0;
        let mut last_stats = None;

        for (index, batch) in ids.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let listed = storage::load_bookmarks(self.store.as_ref())
                .await
                .context("failed to reload bookmarks")?;
            let urls: HashMap<&str, &str> = listed
                .iter()
                .map(|b| (b.id.as_str(), b.url.as_str()))
                .collect();
            let targets: Vec<(String, String)> = batch
                .iter()
                .filter_map(|id| urls.get(id.as_str()).map(|url| (id.clone(), url.to_string())))
                .collect();

            let outcomes = join_all(targets.iter().map(|(id, url)| async move {
                (id.as_str(), url.as_str(), self.probe_bounded(url).await)
            }))
            .await;

            // 探测期间可能有同步完成，结果按 id 写回最新的列表，已删除的书签直接跳过
            let mut current = storage::load_bookmarks(self.store.as_ref())
                .await
                .context("failed to reload bookmarks")?;
            let positions: HashMap<String, usize> = current
                .iter()
                .enumerate()
                .map(|(i, b)| (b.id.clone(), i))
                .collect();

            let checked_at = now_millis();
            for (id, url, outcome) in outcomes {
                if let ProbeOutcome::Failed(reason) = &outcome {
                    warn!("⚠️  Probe failed for {}: {}", url, reason);
                }
                match positions.get(id) {
                    Some(&i) => current[i].mark_checked(outcome.classify(), checked_at),
                    None => debug!("Bookmark {} removed during health check", id),
                }
            }

            completed += batch.len();
            let stats = StatsSnapshot::from_bookmarks(&current);
            let progress = progress_percent(completed, total);
            let entries = Entries::new()
                .put(keys::BOOKMARKS, &current)?
                .put(keys::STATS, &stats)?
                .put(keys::HEALTH_CHECK_PROGRESS, &progress)?;
            self.store
                .set(entries.into_map())
                .await
                .context("failed to store health check progress")?;

            self.state.health_progress(progress);
            if let Some(observer) = &self.observer {
                observer(completed, total);
            }
            info!("🩺 Health check progress: {}/{}", completed, total);
            last_stats = Some(stats);
        }

        let stats = match last_stats {
            Some(stats) => stats,
            None => {
                let current = storage::load_bookmarks(self.store.as_ref()).await?;
                StatsSnapshot::from_bookmarks(&current)
            }
        };

        self.store
            .set(Entries::new().put(keys::HEALTH_CHECK_PROGRESS, &100u8)?.into_map())
            .await
            .context("failed to store final health check progress")?;

        Ok(HealthSummary {
            checked: completed,
            stats,
        })
    }

    async fn probe_bounded(&self, url: &str) -> ProbeOutcome {
        match tokio::time::timeout(self.config.probe_timeout, self.prober.probe(url)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("Probe timed out after {:?}: {}", self.config.probe_timeout, url);
                ProbeOutcome::TimedOut
            }
        }
    }
}

/// 已完成百分比 (四舍五入)
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(ProbeOutcome::Status(200).classify(), HealthStatus::Healthy);
        assert_eq!(ProbeOutcome::Status(204).classify(), HealthStatus::Healthy);
        assert_eq!(ProbeOutcome::Status(301).classify(), HealthStatus::Redirect);
        assert_eq!(ProbeOutcome::Status(404).classify(), HealthStatus::Broken);
        assert_eq!(ProbeOutcome::Status(503).classify(), HealthStatus::Broken);
        assert_eq!(ProbeOutcome::Status(101).classify(), HealthStatus::Unknown);
        assert_eq!(ProbeOutcome::TimedOut.classify(), HealthStatus::Timeout);
        assert_eq!(
            ProbeOutcome::Failed("connection refused".to_string()).classify(),
            HealthStatus::Error
        );
    }

    #[test]
    fn test_unsupported_reason() {
        assert!(unsupported_reason("javascript:void(0)").is_some());
        assert!(unsupported_reason("chrome://settings").is_some());
        assert!(unsupported_reason("file:///tmp/a.html").is_some());
        assert!(unsupported_reason("ftp://host/file").is_some());
        assert!(unsupported_reason("").is_some());
        assert!(unsupported_reason("https://example.com").is_none());
        assert!(unsupported_reason("HTTP://EXAMPLE.COM").is_none());
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 3), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[tokio::test]
    async fn test_http_prober_rejects_non_http_without_network() {
        let prober = HttpProber::new(Duration::from_secs(1)).unwrap();
        let outcome = prober.probe("javascript:alert(1)").await;
        assert_eq!(outcome, ProbeOutcome::Failed("JavaScript URL".to_string()));
        assert_eq!(outcome.classify(), HealthStatus::Error);
    }
}
