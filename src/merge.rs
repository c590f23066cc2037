//! 扁平化结果与已持久化列表的合并
//!
//! 按 id 建索引 (线性时间)，新列表决定顺序和原生字段，旧记录只贡献可变字段。
//! 旧列表中已不存在于新列表的 id 被直接丢弃。

use std::collections::HashMap;

use crate::model::{BookmarkRecord, FlatBookmark};

/// 合并新扁平化列表与旧记录
pub fn merge(fresh: Vec<FlatBookmark>, previous: &[BookmarkRecord]) -> Vec<BookmarkRecord> {
    let mut index: HashMap<&str, &BookmarkRecord> = HashMap::with_capacity(previous.len());
    for record in previous {
        index.entry(record.id.as_str()).or_insert(record);
    }

    fresh
        .into_iter()
        .map(|flat| {
            let old = index.get(flat.id.as_str()).copied();
            BookmarkRecord::hydrate(flat, old)
        })
        .collect()
}
