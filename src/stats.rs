use serde::{Deserialize, Serialize};

use crate::model::{BookmarkRecord, HealthStatus};

/// 健康状态统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: usize,
    #[serde(default)]
    pub healthy: usize,
    #[serde(default)]
    pub broken: usize,
    #[serde(default)]
    pub redirect: usize,
    #[serde(default)]
    pub unknown: usize,
    #[serde(default)]
    pub error: usize,
    #[serde(default)]
    pub timeout: usize,
}

impl StatsSnapshot {
    /// 对整个列表做一次完整计数
    pub fn from_bookmarks(bookmarks: &[BookmarkRecord]) -> Self {
        let mut stats = Self {
            total: bookmarks.len(),
            ..Default::default()
        };
        for bookmark in bookmarks {
            *stats.slot(bookmark.health_status) += 1;
        }
        stats
    }

    pub fn count(&self, status: HealthStatus) -> usize {
        match status {
            HealthStatus::Unknown => self.unknown,
            HealthStatus::Healthy => self.healthy,
            HealthStatus::Broken => self.broken,
            HealthStatus::Redirect => self.redirect,
            HealthStatus::Timeout => self.timeout,
            HealthStatus::Error => self.error,
        }
    }

    fn slot(&mut self, status: HealthStatus) -> &mut usize {
        match status {
            HealthStatus::Unknown => &mut self.unknown,
            HealthStatus::Healthy => &mut self.healthy,
            HealthStatus::Broken => &mut self.broken,
            HealthStatus::Redirect => &mut self.redirect,
            HealthStatus::Timeout => &mut self.timeout,
            HealthStatus::Error => &mut self.error,
        }
    }

    /// 各分类之和
    pub fn category_sum(&self) -> usize {
        HealthStatus::ALL.iter().map(|s| self.count(*s)).sum()
    }

    /// 分类之和必须等于总数
    pub fn is_consistent(&self) -> bool {
        self.category_sum() == self.total
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Total: {} | {} {} | {} {} | {} {} | {} {} | {} {} | {} {}",
            self.total,
            HealthStatus::Healthy.icon(),
            self.healthy,
            HealthStatus::Broken.icon(),
            self.broken,
            HealthStatus::Redirect.icon(),
            self.redirect,
            HealthStatus::Timeout.icon(),
            self.timeout,
            HealthStatus::Error.icon(),
            self.error,
            HealthStatus::Unknown.icon(),
            self.unknown,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlatBookmark;
    use proptest::prelude::*;

    fn record(id: usize, status: HealthStatus) -> BookmarkRecord {
        let mut r = BookmarkRecord::hydrate(
            FlatBookmark {
                id: id.to_string(),
                title: String::new(),
                url: String::new(),
                folder: String::new(),
                date_added: 0,
            },
            None,
        );
        r.health_status = status;
        r
    }

    #[test]
    fn test_empty_list() {
        let stats = StatsSnapshot::from_bookmarks(&[]);
        assert_eq!(stats, StatsSnapshot::default());
        assert!(stats.is_consistent());
    }

    #[test]
    fn test_counts_per_status() {
        let list = vec![
            record(1, HealthStatus::Healthy),
            record(2, HealthStatus::Healthy),
            record(3, HealthStatus::Timeout),
            record(4, HealthStatus::Unknown),
        ];
        let stats = StatsSnapshot::from_bookmarks(&list);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.healthy, 2);
        assert_eq!(stats.timeout, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.broken, 0);
    }

    #[test]
    fn test_serialized_shape() {
        let stats = StatsSnapshot::from_bookmarks(&[record(1, HealthStatus::Broken)]);
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["broken"], 1);
        assert_eq!(value["timeout"], 0);
    }

    proptest! {
        #[test]
        fn prop_stats_sum_to_total(statuses in proptest::collection::vec(proptest::sample::select(HealthStatus::ALL.to_vec()), 0..200)) {
            let list: Vec<BookmarkRecord> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| record(i, *s))
                .collect();
            let stats = StatsSnapshot::from_bookmarks(&list);
            prop_assert_eq!(stats.total, list.len());
            prop_assert_eq!(stats.category_sum(), stats.total);
            prop_assert!(stats.is_consistent());
        }
    }
}
