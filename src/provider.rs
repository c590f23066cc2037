//! 原生书签来源
//!
//! 从浏览器自己的书签存储中读出 `getTree` 形状的书签森林：
//! - Chromium 系 (Chrome / Brave / Chromium / Edge) 的 `Bookmarks` JSON 文件
//! - Firefox 系 (Firefox / Waterfox) 的 `places.sqlite`
//! - 已经是 `getTree` 形状的 JSON 文件

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::BookmarkNode;

/// 书签变更事件 (负载不被检查，只表示"有变化")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkEvent {
    Created,
    Removed,
    Changed,
    Moved,
}

#[async_trait]
pub trait BookmarkProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 读取完整书签森林
    async fn get_tree(&self) -> Result<Vec<BookmarkNode>>;

    /// 需要监听变化的文件 (没有则不监听)
    fn watch_path(&self) -> Option<&Path> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserKind {
    Chrome,
    Brave,
    Chromium,
    Edge,
    Firefox,
    Waterfox,
}

impl BrowserKind {
    pub const ALL: [BrowserKind; 6] = [
        BrowserKind::Chrome,
        BrowserKind::Brave,
        BrowserKind::Chromium,
        BrowserKind::Edge,
        BrowserKind::Firefox,
        BrowserKind::Waterfox,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "Chrome",
            BrowserKind::Brave => "Brave",
            BrowserKind::Chromium => "Chromium",
            BrowserKind::Edge => "Edge",
            BrowserKind::Firefox => "Firefox",
            BrowserKind::Waterfox => "Waterfox",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "chrome" | "google-chrome" => Some(BrowserKind::Chrome),
            "brave" => Some(BrowserKind::Brave),
            "chromium" => Some(BrowserKind::Chromium),
            "edge" | "msedge" => Some(BrowserKind::Edge),
            "firefox" => Some(BrowserKind::Firefox),
            "waterfox" => Some(BrowserKind::Waterfox),
            _ => None,
        }
    }

    fn is_firefox_family(&self) -> bool {
        matches!(self, BrowserKind::Firefox | BrowserKind::Waterfox)
    }

    /// 浏览器用户数据目录 (Chromium) 或 profiles 目录 (Firefox)
    fn data_dir(&self) -> Result<PathBuf> {
        let home = PathBuf::from(std::env::var("HOME").context("HOME is not set")?);

        #[cfg(target_os = "macos")]
        let relative = match self {
            BrowserKind::Chrome => "Library/Application Support/Google/Chrome",
            BrowserKind::Brave => "Library/Application Support/BraveSoftware/Brave-Browser",
            BrowserKind::Chromium => "Library/Application Support/Chromium",
            BrowserKind::Edge => "Library/Application Support/Microsoft Edge",
            BrowserKind::Firefox => "Library/Application Support/Firefox/Profiles",
            BrowserKind::Waterfox => "Library/Application Support/Waterfox/Profiles",
        };

        #[cfg(not(target_os = "macos"))]
        let relative = match self {
            BrowserKind::Chrome => ".config/google-chrome",
            BrowserKind::Brave => ".config/BraveSoftware/Brave-Browser",
            BrowserKind::Chromium => ".config/chromium",
            BrowserKind::Edge => ".config/microsoft-edge",
            BrowserKind::Firefox => ".mozilla/firefox",
            BrowserKind::Waterfox => ".waterfox",
        };

        Ok(home.join(relative))
    }

    /// 定位书签文件
    pub fn detect_bookmark_path(&self) -> Result<PathBuf> {
        let dir = self.data_dir()?;
        if !dir.exists() {
            bail!("{} profile directory not found: {:?}", self.name(), dir);
        }

        if self.is_firefox_family() {
            return find_file(&dir, "places.sqlite", Some("default-release"))
                .ok_or_else(|| anyhow!("{} places.sqlite not found under {:?}", self.name(), dir));
        }

        let default_profile = dir.join("Default").join("Bookmarks");
        if default_profile.exists() {
            debug!("Found {} bookmarks at: {:?}", self.name(), default_profile);
            return Ok(default_profile);
        }
        find_file(&dir, "Bookmarks", None)
            .ok_or_else(|| anyhow!("{} Bookmarks file not found under {:?}", self.name(), dir))
    }
}

/// 在目录下两层以内查找文件，优先路径中包含 `prefer` 的
fn find_file(dir: &Path, file_name: &str, prefer: Option<&str>) -> Option<PathBuf> {
    let found: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.into_path())
        .collect();

    prefer
        .and_then(|p| {
            found
                .iter()
                .find(|path| path.to_string_lossy().contains(p))
                .cloned()
        })
        .or_else(|| found.into_iter().next())
}

/// 列出本机检测到的浏览器
pub fn detect_browsers() -> Vec<(BrowserKind, Result<PathBuf>)> {
    BrowserKind::ALL
        .into_iter()
        .map(|kind| (kind, kind.detect_bookmark_path()))
        .collect()
}

/// 根据浏览器名或文件路径打开书签来源
pub fn open_source(source: &str) -> Result<Arc<dyn BookmarkProvider>> {
    if let Some(kind) = BrowserKind::parse(source) {
        let path = kind.detect_bookmark_path()?;
        return Ok(if kind.is_firefox_family() {
            Arc::new(FirefoxProvider::new(path))
        } else {
            Arc::new(ChromiumProvider::new(path))
        });
    }

    let path = PathBuf::from(source);
    if !path.exists() {
        bail!("Unknown browser or missing bookmark file: {}", source);
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    if extension.as_deref() == Some("sqlite") {
        return Ok(Arc::new(FirefoxProvider::new(path)));
    }
    if path.file_name().and_then(|n| n.to_str()) == Some("Bookmarks") {
        return Ok(Arc::new(ChromiumProvider::new(path)));
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read bookmark file {:?}", path))?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("Bookmark file {:?} is not JSON", path))?;
    if json.get("roots").is_some() {
        Ok(Arc::new(ChromiumProvider::new(path)))
    } else {
        Ok(Arc::new(JsonTreeProvider::new(path)))
    }
}

// Chromium `Bookmarks` JSON

/// Chromium 时间戳是 1601-01-01 起的微秒数
const WEBKIT_EPOCH_OFFSET_MS: i64 = 11_644_473_600_000;

const CHROMIUM_ROOT_ORDER: [&str; 3] = ["bookmark_bar", "other", "synced"];

pub struct ChromiumProvider {
    path: PathBuf,
}

impl ChromiumProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BookmarkProvider for ChromiumProvider {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn get_tree(&self) -> Result<Vec<BookmarkNode>> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let json: Value = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;
        parse_chromium_bookmarks(&json)
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

pub fn parse_chromium_bookmarks(json: &Value) -> Result<Vec<BookmarkNode>> {
    let roots = json
        .get("roots")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("Chromium bookmarks file has no 'roots' object"))?;

    let mut keys: Vec<&str> = CHROMIUM_ROOT_ORDER
        .iter()
        .copied()
        .filter(|k| roots.contains_key(*k))
        .collect();
    keys.extend(
        roots
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !CHROMIUM_ROOT_ORDER.contains(k)),
    );

    let children = keys
        .into_iter()
        .filter_map(|k| roots.get(k))
        .filter(|v| v.is_object())
        .filter_map(parse_chromium_node)
        .collect();

    Ok(vec![BookmarkNode {
        id: "0".to_string(),
        title: Some(String::new()),
        url: None,
        date_added: None,
        children: Some(children),
    }])
}

fn parse_chromium_node(node: &Value) -> Option<BookmarkNode> {
    let id = match node.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    let title = node.get("name").and_then(|v| v.as_str()).map(|s| s.to_string());
    let date_added = node
        .get("date_added")
        .and_then(|v| match v {
            Value::String(s) => s.parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        })
        .and_then(webkit_micros_to_unix_ms);

    match node.get("type").and_then(|v| v.as_str()) {
        Some("url") => Some(BookmarkNode {
            id,
            title,
            url: node.get("url").and_then(|v| v.as_str()).map(|s| s.to_string()),
            date_added,
            children: None,
        }),
        _ => {
            let children = node
                .get("children")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().filter_map(parse_chromium_node).collect())
                .unwrap_or_default();
            Some(BookmarkNode {
                id,
                title,
                url: None,
                date_added,
                children: Some(children),
            })
        }
    }
}

pub fn webkit_micros_to_unix_ms(micros: i64) -> Option<i64> {
    if micros <= 0 {
        return None;
    }
    Some(micros / 1000 - WEBKIT_EPOCH_OFFSET_MS)
}

// Firefox `places.sqlite`

const FIREFOX_TAGS_GUID: &str = "tags________";

pub struct FirefoxProvider {
    path: PathBuf,
}

impl FirefoxProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BookmarkProvider for FirefoxProvider {
    fn name(&self) -> &str {
        "firefox"
    }

    async fn get_tree(&self) -> Result<Vec<BookmarkNode>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_firefox_tree(&path))
            .await
            .context("Firefox reader task panicked")?
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[derive(Debug)]
struct PlacesRow {
    id: i64,
    parent: i64,
    kind: i32,
    title: Option<String>,
    url: Option<String>,
    date_added: Option<i64>,
    guid: Option<String>,
}

/// 浏览器运行时数据库可能被锁定，此时复制一份再读
fn read_firefox_tree(db_path: &Path) -> Result<Vec<BookmarkNode>> {
    match query_places(db_path) {
        Ok(rows) => build_firefox_tree(rows),
        Err(e) => {
            warn!("⚠️  Direct read of {:?} failed ({}), reading a copy", db_path, e);
            let copy = std::env::temp_dir().join(format!("cognimark-places-{}.sqlite", std::process::id()));
            std::fs::copy(db_path, &copy)
                .with_context(|| format!("Failed to copy {:?}", db_path))?;
            let rows = query_places(&copy);
            let _ = std::fs::remove_file(&copy);
            build_firefox_tree(rows?)
        }
    }
}

fn query_places(db_path: &Path) -> Result<Vec<PlacesRow>> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
    )
    .with_context(|| format!("Failed to open {:?}", db_path))?;

    let mut stmt = conn.prepare(
        "SELECT b.id, b.parent, b.type, b.title, p.url, b.dateAdded, b.guid
         FROM moz_bookmarks b
         LEFT JOIN moz_places p ON b.fk = p.id
         WHERE b.type IN (1, 2)
         ORDER BY b.parent, b.position",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(PlacesRow {
            id: row.get(0)?,
            parent: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            url: row.get(4)?,
            date_added: row.get(5)?,
            guid: row.get(6)?,
        })
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    debug!("Read {} rows from {:?}", result.len(), db_path);
    Ok(result)
}

fn firefox_root_title(guid: Option<&str>) -> Option<&'static str> {
    match guid? {
        "menu________" => Some("Bookmarks Menu"),
        "toolbar_____" => Some("Bookmarks Toolbar"),
        "unfiled_____" => Some("Other Bookmarks"),
        "mobile______" => Some("Mobile Bookmarks"),
        _ => None,
    }
}

fn build_firefox_tree(rows: Vec<PlacesRow>) -> Result<Vec<BookmarkNode>> {
    let root_id = rows
        .iter()
        .find(|r| r.parent == 0 || r.guid.as_deref() == Some("root________"))
        .map(|r| r.id)
        .ok_or_else(|| anyhow!("places database has no bookmarks root"))?;

    let mut by_parent: HashMap<i64, Vec<&PlacesRow>> = HashMap::new();
    for row in &rows {
        if row.id != root_id {
            by_parent.entry(row.parent).or_default().push(row);
        }
    }

    let children = firefox_children(root_id, &by_parent);
    Ok(vec![BookmarkNode {
        id: root_id.to_string(),
        title: Some(String::new()),
        url: None,
        date_added: None,
        children: Some(children),
    }])
}

fn firefox_children(parent: i64, by_parent: &HashMap<i64, Vec<&PlacesRow>>) -> Vec<BookmarkNode> {
    let Some(rows) = by_parent.get(&parent) else {
        return Vec::new();
    };

    rows.iter()
        .filter(|r| r.guid.as_deref() != Some(FIREFOX_TAGS_GUID))
        .map(|row| {
            let title = firefox_root_title(row.guid.as_deref())
                .map(|t| t.to_string())
                .or_else(|| row.title.clone());
            let date_added = row.date_added.filter(|d| *d > 0).map(|d| d / 1000);
            if row.kind == 2 {
                BookmarkNode {
                    id: row.id.to_string(),
                    title,
                    url: None,
                    date_added,
                    children: Some(firefox_children(row.id, by_parent)),
                }
            } else {
                BookmarkNode {
                    id: row.id.to_string(),
                    title,
                    url: row.url.clone(),
                    date_added,
                    children: None,
                }
            }
        })
        .collect()
}

// `getTree` 形状的 JSON

pub struct JsonTreeProvider {
    path: PathBuf,
}

impl JsonTreeProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BookmarkProvider for JsonTreeProvider {
    fn name(&self) -> &str {
        "json-tree"
    }

    async fn get_tree(&self) -> Result<Vec<BookmarkNode>> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let json: Value = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;
        let nodes = match json {
            Value::Array(_) => serde_json::from_value(json)?,
            Value::Object(_) => vec![serde_json::from_value(json)?],
            _ => bail!("{:?} does not contain a bookmark tree", self.path),
        };
        Ok(nodes)
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;

    fn chromium_fixture() -> Value {
        serde_json::json!({
            "checksum": "x",
            "version": 1,
            "roots": {
                "other": {
                    "id": "2", "name": "Other bookmarks", "type": "folder", "children": [
                        {"id": "20", "name": "Docs", "type": "url", "url": "https://docs.rs", "date_added": "0"}
                    ]
                },
                "bookmark_bar": {
                    "id": "1", "name": "Bookmarks bar", "type": "folder", "children": [
                        {"id": "10", "name": "Rust", "type": "url", "url": "https://www.rust-lang.org",
                         "date_added": "13300000000000000"},
                        {"id": "11", "name": "Work", "type": "folder", "children": [
                            {"id": "12", "name": "CI", "type": "url", "url": "https://ci.example"}
                        ]}
                    ]
                },
                "synced": {"id": "3", "name": "Mobile bookmarks", "type": "folder", "children": []}
            }
        })
    }

    #[test]
    fn test_parse_chromium_roots_in_browser_order() {
        let tree = parse_chromium_bookmarks(&chromium_fixture()).unwrap();
        let flat = flatten(&tree, 5);
        let ids: Vec<&str> = flat.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "12", "20"]);
        assert_eq!(flat[0].folder, "Bookmarks bar");
        assert_eq!(flat[1].folder, "Bookmarks bar/Work");
        assert_eq!(flat[2].folder, "Other bookmarks");
        assert_eq!(flat[0].date_added, 13_300_000_000_000 - WEBKIT_EPOCH_OFFSET_MS);
        assert_eq!(flat[2].date_added, 5);
    }

    #[test]
    fn test_parse_chromium_without_roots_fails() {
        assert!(parse_chromium_bookmarks(&serde_json::json!({"version": 1})).is_err());
    }

    #[tokio::test]
    async fn test_open_source_infers_formats() {
        let dir = tempfile::tempdir().unwrap();

        let chromium = dir.path().join("Bookmarks");
        std::fs::write(&chromium, chromium_fixture().to_string()).unwrap();
        let provider = open_source(chromium.to_str().unwrap()).unwrap();
        assert_eq!(provider.name(), "chromium");
        assert_eq!(flatten(&provider.get_tree().await.unwrap(), 0).len(), 3);

        let tree = dir.path().join("tree.json");
        let nodes = vec![BookmarkNode::folder(
            "1",
            "Reading",
            vec![BookmarkNode::leaf("2", "Blog", "https://blog.example")],
        )];
        std::fs::write(&tree, serde_json::to_string(&nodes).unwrap()).unwrap();
        let provider = open_source(tree.to_str().unwrap()).unwrap();
        assert_eq!(provider.name(), "json-tree");
        let flat = flatten(&provider.get_tree().await.unwrap(), 0);
        assert_eq!(flat[0].folder, "Reading");

        assert!(open_source(dir.path().join("missing.json").to_str().unwrap()).is_err());
    }

    fn create_places(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url TEXT);
             CREATE TABLE moz_bookmarks (
                id INTEGER PRIMARY KEY, type INTEGER, fk INTEGER, parent INTEGER,
                position INTEGER, title TEXT, dateAdded INTEGER, guid TEXT);
             INSERT INTO moz_places VALUES (1, 'https://mozilla.org'), (2, 'https://tagged.example'),
                                           (3, 'https://news.example');
             INSERT INTO moz_bookmarks VALUES
                (1, 2, NULL, 0, 0, '', 0, 'root________'),
                (2, 2, NULL, 1, 0, 'menu', 0, 'menu________'),
                (3, 2, NULL, 1, 1, 'toolbar', 0, 'toolbar_____'),
                (4, 2, NULL, 1, 2, 'tags', 0, 'tags________'),
                (5, 2, NULL, 4, 0, 'rust', 0, 'tagfolder001'),
                (6, 1, 2, 5, 0, 'Tagged', 0, 'tagentry0001'),
                (7, 1, 1, 3, 1, 'Mozilla', 1700000000000000, 'bm0000000001'),
                (8, 2, NULL, 3, 0, 'News', 0, 'folder000001'),
                (9, 1, 3, 8, 0, 'Daily', 0, 'bm0000000002');",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_firefox_tree_skips_tags_and_names_roots() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("places.sqlite");
        create_places(&db);

        let provider = FirefoxProvider::new(&db);
        let flat = flatten(&provider.get_tree().await.unwrap(), 0);
        let summary: Vec<(&str, &str)> = flat
            .iter()
            .map(|b| (b.id.as_str(), b.folder.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("9", "Bookmarks Toolbar/News"), ("7", "Bookmarks Toolbar")]
        );
        assert_eq!(flat[1].date_added, 1_700_000_000_000);
    }

    #[test]
    fn test_browser_kind_parse() {
        assert_eq!(BrowserKind::parse("Brave"), Some(BrowserKind::Brave));
        assert_eq!(BrowserKind::parse("waterfox"), Some(BrowserKind::Waterfox));
        assert_eq!(BrowserKind::parse("/tmp/Bookmarks"), None);
    }
}
