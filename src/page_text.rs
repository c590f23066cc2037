//! 页面全文提取与快照

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::health::{unsupported_reason, USER_AGENT};
use crate::model::BookmarkRecord;
use crate::storage::{self, keys, Entries, Storage};

/// 快照最大字符数
pub const MAX_TEXT_CHARS: usize = 5000;

const SKIPPED_TAGS: [&str; 6] = ["script", "style", "noscript", "nav", "footer", "aside"];
const MAIN_CONTENT: &str = "main, article, .content, #content, .post, .article";

/// 页面文本来源
#[async_trait]
pub trait PageTextSource: Send + Sync {
    /// `target` 为书签 id 或 URL
    async fn full_text(&self, target: &str) -> Result<String>;
}

/// 通过 HTTP 抓取页面并提取正文
pub struct HttpPageText {
    client: Client,
    store: Arc<dyn Storage>,
}

impl HttpPageText {
    pub fn new(store: Arc<dyn Storage>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, store })
    }

    async fn resolve(&self, target: &str) -> Result<String> {
        let bookmarks = storage::load_bookmarks(self.store.as_ref()).await?;
        if let Some(b) = bookmarks.iter().find(|b| b.id == target) {
            return Ok(b.url.clone());
        }
        Ok(target.to_string())
    }
}

#[async_trait]
impl PageTextSource for HttpPageText {
    async fn full_text(&self, target: &str) -> Result<String> {
        let url = self.resolve(target).await?;
        if let Some(reason) = unsupported_reason(&url) {
            bail!("cannot fetch '{}': {}", url, reason);
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;
        if !response.status().is_success() {
            bail!("{} answered HTTP {}", url, response.status().as_u16());
        }
        let body = response.text().await?;
        Ok(extract_text(&body))
    }
}

/// 提取可见正文：去掉脚本/样式/导航等，优先主内容区，压缩空白并截断
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let root = Selector::parse(MAIN_CONTENT)
        .ok()
        .and_then(|s| document.select(&s).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|s| document.select(&s).next())
        })
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| SKIPPED_TAGS.contains(&el.value().name()));
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT_CHARS).collect()
}

/// 抓取书签页面文本并写入 `snapshot`
///
/// 读整表-修改-写整表，与并发同步之间可能丢失更新。
pub async fn capture_snapshot(
    store: &dyn Storage,
    pages: &dyn PageTextSource,
    id: &str,
) -> Result<BookmarkRecord> {
    let bookmarks = storage::load_bookmarks(store).await?;
    let url = bookmarks
        .iter()
        .find(|b| b.id == id)
        .map(|b| b.url.clone())
        .ok_or_else(|| anyhow!("bookmark {} not found", id))?;

    let text = pages.full_text(&url).await?;

    let mut bookmarks = storage::load_bookmarks(store).await?;
    let record = bookmarks
        .iter_mut()
        .find(|b| b.id == id)
        .ok_or_else(|| anyhow!("bookmark {} was removed while capturing", id))?;
    record.snapshot = text;
    let updated = record.clone();

    store
        .set(Entries::new().put(keys::BOOKMARKS, &bookmarks)?.into_map())
        .await
        .context("failed to store snapshot")?;

    info!("📸 Snapshot stored for {} ({} chars)", id, updated.snapshot.chars().count());
    Ok(updated)
}
