//! 书签树扁平化
//!
//! 先序遍历原生书签森林，把每个带 URL 的叶子转换为 `FlatBookmark`，
//! 文件夹路径按 `/` 拼接。

use crate::model::{BookmarkNode, FlatBookmark, ROOT_FOLDER_LABEL, UNTITLED_BOOKMARK};

/// 文件夹路径分隔符
pub const FOLDER_SEPARATOR: &str = "/";

/// 非根文件夹缺少标题时的占位
pub const UNTITLED_FOLDER: &str = "Untitled Folder";

/// 扁平化书签森林
///
/// `now` 用于填充缺失的 `dateAdded`。既没有 URL 也没有子节点的节点按空文件夹处理并跳过。
pub fn flatten(nodes: &[BookmarkNode], now: i64) -> Vec<FlatBookmark> {
    let mut out = Vec::new();
    let mut path: Vec<String> = Vec::new();
    for node in nodes {
        flatten_node(node, &mut path, 0, now, &mut out);
    }
    out
}

fn flatten_node(
    node: &BookmarkNode,
    path: &mut Vec<String>,
    depth: usize,
    now: i64,
    out: &mut Vec<FlatBookmark>,
) {
    if let Some(children) = &node.children {
        let segment = folder_segment(node, depth);
        let pushed = segment.is_some();
        if let Some(segment) = segment {
            path.push(segment);
        }
        for child in children {
            flatten_node(child, path, depth + 1, now, out);
        }
        if pushed {
            path.pop();
        }
        return;
    }

    let Some(url) = node.url.as_deref() else {
        return;
    };

    let folder = if path.is_empty() {
        ROOT_FOLDER_LABEL.to_string()
    } else {
        path.join(FOLDER_SEPARATOR)
    };

    out.push(FlatBookmark {
        id: node.id.clone(),
        title: non_empty(node.title.as_deref())
            .unwrap_or(UNTITLED_BOOKMARK)
            .to_string(),
        url: url.to_string(),
        folder,
        date_added: node.date_added.unwrap_or(now),
    });
}

/// 顶层的无标题节点 (树根) 不占路径段
fn folder_segment(node: &BookmarkNode, depth: usize) -> Option<String> {
    match non_empty(node.title.as_deref()) {
        Some(title) => Some(title.to_string()),
        None if depth == 0 => None,
        None => Some(UNTITLED_FOLDER.to_string()),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
