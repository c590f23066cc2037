//! 点击计数与常用书签

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::debug;

use crate::model::BookmarkRecord;
use crate::storage::{self, keys, Entries, Storage};

/// 常用书签列表的长度
pub const FREQUENT_LIMIT: usize = 5;

/// id → clickCount，只包含点击过的书签 (可由书签列表推导)
pub fn frequent_map(bookmarks: &[BookmarkRecord]) -> BTreeMap<String, u64> {
    bookmarks
        .iter()
        .filter(|b| b.click_count > 0)
        .map(|b| (b.id.clone(), b.click_count))
        .collect()
}

/// 点击次数最多的前 `limit` 个书签，次数相同保持列表顺序
pub fn top_frequent(bookmarks: &[BookmarkRecord], limit: usize) -> Vec<&BookmarkRecord> {
    let mut clicked: Vec<&BookmarkRecord> = bookmarks.iter().filter(|b| b.click_count > 0).collect();
    clicked.sort_by(|a, b| b.click_count.cmp(&a.click_count));
    clicked.truncate(limit);
    clicked
}

/// 记录一次用户打开书签，返回更新后的记录；id 不存在时返回 None
///
/// 读整表-修改-写整表，与并发同步之间可能丢失更新。
pub async fn record_click(store: &dyn Storage, id: &str) -> Result<Option<BookmarkRecord>> {
    let mut bookmarks = storage::load_bookmarks(store).await?;
    let Some(record) = bookmarks.iter_mut().find(|b| b.id == id) else {
        return Ok(None);
    };
    record.click_count += 1;
    let updated = record.clone();

    let entries = Entries::new()
        .put(keys::BOOKMARKS, &bookmarks)?
        .put(keys::FREQUENT_BOOKMARKS, &frequent_map(&bookmarks))?;
    store
        .set(entries.into_map())
        .await
        .context("failed to store click count")?;

    debug!("Bookmark {} opened {} times", id, updated.click_count);
    Ok(Some(updated))
}
