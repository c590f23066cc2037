//! JSON 消息路由
//!
//! 请求形如 `{"action": "triggerSync"}`，响应总是带 `success` 字段的 JSON 对象。

use anyhow::{anyhow, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::health::HealthChecker;
use crate::page_text::{self, PageTextSource};
use crate::search::SearchQuery;
use crate::state::RunOutcome;
use crate::storage::{self, Storage};
use crate::sync::SyncEngine;
use crate::usage::{self, FREQUENT_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    TriggerSync,
    TriggerHealthCheck,
    #[serde(rename_all = "camelCase")]
    GetFullText {
        #[serde(deserialize_with = "string_or_number")]
        tab_id: String,
    },
    GetStats,
    GetHealthStatus,
    RecordClick {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    Search {
        #[serde(default)]
        query: String,
        #[serde(default)]
        regex: bool,
        #[serde(default)]
        full_text: bool,
    },
    GetFrequent,
    CaptureSnapshot {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
    },
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

pub struct Router {
    store: Arc<dyn Storage>,
    /// 未配置书签来源时为 None，triggerSync 返回错误
    sync: Option<Arc<SyncEngine>>,
    health: Arc<HealthChecker>,
    pages: Arc<dyn PageTextSource>,
}

impl Router {
    pub fn new(
        store: Arc<dyn Storage>,
        sync: Option<Arc<SyncEngine>>,
        health: Arc<HealthChecker>,
        pages: Arc<dyn PageTextSource>,
    ) -> Self {
        Self {
            store,
            sync,
            health,
            pages,
        }
    }

    /// 处理任意 JSON 消息；无法识别的消息得到 `{success:false, error}`
    pub async fn handle_value(&self, message: Value) -> Value {
        let request: Request = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                warn!("⚠️  Rejected message: {}", e);
                return failure(format!("Unknown or malformed request: {}", e));
            }
        };
        debug!("Handling {:?}", request);

        match self.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("❌ Request failed: {:#}", e);
                failure(format!("{:#}", e))
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Result<Value> {
        match request {
            Request::TriggerSync => {
                let sync = self
                    .sync
                    .as_ref()
                    .ok_or_else(|| anyhow!("no bookmark source configured"))?;
                match sync.sync().await? {
                    RunOutcome::Completed(report) => Ok(json!({
                        "success": true,
                        "bookmarks": report.bookmarks,
                        "added": report.added,
                        "removed": report.removed,
                    })),
                    RunOutcome::Skipped => Ok(json!({
                        "success": true,
                        "skipped": true,
                    })),
                }
            }
            Request::TriggerHealthCheck => {
                if self.health.state().health.is_running() {
                    info!("⏳ Health check already in progress, ignoring trigger");
                    return Ok(json!({ "success": true, "skipped": true }));
                }
                let health = self.health.clone();
                tokio::spawn(async move {
                    let _ = health.run().await;
                });
                Ok(json!({ "success": true, "message": "Health check started" }))
            }
            Request::GetFullText { tab_id } => {
                let text = self.pages.full_text(&tab_id).await?;
                Ok(json!({ "success": true, "text": text }))
            }
            Request::GetStats => {
                let (stats, last_sync) = storage::load_stats(self.store.as_ref()).await?;
                Ok(json!({
                    "success": true,
                    "stats": stats,
                    "lastSyncTime": last_sync,
                }))
            }
            Request::GetHealthStatus => {
                let report = self.health.state().health_report();
                Ok(json!({
                    "success": true,
                    "status": report.status,
                    "progress": report.progress,
                }))
            }
            Request::RecordClick { id } => match usage::record_click(self.store.as_ref(), &id).await? {
                Some(record) => Ok(json!({ "success": true, "bookmark": record })),
                None => Ok(failure(format!("Bookmark {} not found", id))),
            },
            Request::Search {
                query,
                regex,
                full_text,
            } => {
                let bookmarks = storage::load_bookmarks(self.store.as_ref()).await?;
                let found = SearchQuery::new(query)
                    .regex(regex)
                    .full_text(full_text)
                    .filter(&bookmarks);
                Ok(json!({ "success": true, "bookmarks": found }))
            }
            Request::GetFrequent => {
                let bookmarks = storage::load_bookmarks(self.store.as_ref()).await?;
                let top = usage::top_frequent(&bookmarks, FREQUENT_LIMIT);
                Ok(json!({ "success": true, "bookmarks": top }))
            }
            Request::CaptureSnapshot { id } => {
                let record =
                    page_text::capture_snapshot(self.store.as_ref(), self.pages.as_ref(), &id).await?;
                Ok(json!({
                    "success": true,
                    "id": record.id,
                    "length": record.snapshot.chars().count(),
                }))
            }
        }
    }
}

fn failure(error: String) -> Value {
    json!({ "success": false, "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let r: Request = serde_json::from_value(json!({"action": "getFullText", "tabId": 42})).unwrap();
        assert_eq!(r, Request::GetFullText { tab_id: "42".to_string() });

        let r: Request =
            serde_json::from_value(json!({"action": "search", "query": "rust", "fullText": true}))
                .unwrap();
        assert_eq!(
            r,
            Request::Search {
                query: "rust".to_string(),
                regex: false,
                full_text: true
            }
        );

        let r: Request = serde_json::from_value(json!({"action": "getStats"})).unwrap();
        assert_eq!(r, Request::GetStats);
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_value::<Request>(json!({"action": "selfDestruct"})).is_err());
        assert!(serde_json::from_value::<Request>(json!({"noAction": true})).is_err());
        assert!(serde_json::from_value::<Request>(json!({"action": "recordClick"})).is_err());
    }
}
