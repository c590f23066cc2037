//! 书签数据模型
//!
//! `BookmarkNode` 是浏览器原生书签树的节点，`FlatBookmark` 是扁平化后的叶子，
//! `BookmarkRecord` 是持久化列表中的一条记录（附带健康状态等本地可变字段）。

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// 根目录书签的文件夹标签
pub const ROOT_FOLDER_LABEL: &str = "Bookmarks Bar";

/// 缺少标题时的占位
pub const UNTITLED_BOOKMARK: &str = "Untitled";

/// 原生书签树节点 (与 `bookmarks.getTree()` 结构一致)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date_added: Option<i64>,
    #[serde(default)]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn folder(id: &str, title: &str, children: Vec<BookmarkNode>) -> Self {
        Self {
            id: id.to_string(),
            title: Some(title.to_string()),
            url: None,
            date_added: None,
            children: Some(children),
        }
    }

    pub fn leaf(id: &str, title: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            date_added: None,
            children: None,
        }
    }

    pub fn with_date_added(mut self, date_added: i64) -> Self {
        self.date_added = Some(date_added);
        self
    }
}

/// 链接健康状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Broken,
    Redirect,
    Timeout,
    Error,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 6] = [
        HealthStatus::Unknown,
        HealthStatus::Healthy,
        HealthStatus::Broken,
        HealthStatus::Redirect,
        HealthStatus::Timeout,
        HealthStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Broken => "broken",
            HealthStatus::Redirect => "redirect",
            HealthStatus::Timeout => "timeout",
            HealthStatus::Error => "error",
        }
    }

    /// 无法识别的值一律视为 unknown
    pub fn parse_lossy(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .unwrap_or_default()
    }

    pub fn icon(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "❤️",
            HealthStatus::Broken => "❌",
            HealthStatus::Redirect => "➡️",
            HealthStatus::Timeout => "⏱️",
            HealthStatus::Error => "⚠️",
            HealthStatus::Unknown => "❔",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HealthStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // 非字符串 (数字、对象、null) 一律视为 unknown，不让整个列表变成不可读
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(raw) => Ok(HealthStatus::parse_lossy(&raw)),
            _ => Ok(HealthStatus::Unknown),
        }
    }
}

/// 扁平化后的书签 (只含原生字段)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub folder: String,
    pub date_added: i64,
}

/// 持久化的书签记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub date_added: i64,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub last_checked: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub snapshot: String,
    #[serde(default)]
    pub click_count: u64,
}

impl BookmarkRecord {
    /// 统一的默认值填充：原生字段取自 `flat`，可变字段取自 `previous`，缺省时用默认值
    pub fn hydrate(flat: FlatBookmark, previous: Option<&BookmarkRecord>) -> Self {
        let (health_status, last_checked, snapshot, click_count) = match previous {
            Some(old) => (
                old.health_status,
                old.last_checked,
                old.snapshot.clone(),
                old.click_count,
            ),
            None => (HealthStatus::Unknown, None, String::new(), 0),
        };

        Self {
            id: flat.id,
            title: flat.title,
            url: flat.url,
            folder: flat.folder,
            date_added: flat.date_added,
            health_status,
            last_checked,
            snapshot,
            click_count,
        }
    }

    /// 记录一次健康检查结果
    pub fn mark_checked(&mut self, status: HealthStatus, checked_at: i64) {
        self.health_status = status;
        self.last_checked = Some(checked_at);
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// 当前时间 (Unix 毫秒)
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
