//! 书签搜索
//!
//! 普通模式：按空白拆分关键词，所有关键词都要出现在 标题/URL/文件夹 (全文模式再加快照) 中。
//! 正则模式：忽略大小写匹配标题、URL (全文模式再加快照)；无效的正则不匹配任何书签。

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::model::BookmarkRecord;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub regex: bool,
    pub full_text: bool,
}

enum Matcher {
    All,
    Nothing,
    Terms(Vec<String>),
    Pattern(Regex),
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }

    pub fn full_text(mut self, full_text: bool) -> Self {
        self.full_text = full_text;
        self
    }

    fn matcher(&self) -> Matcher {
        let text = self.text.trim();
        if text.is_empty() {
            return Matcher::All;
        }

        if self.regex {
            return match RegexBuilder::new(text).case_insensitive(true).build() {
                Ok(re) => Matcher::Pattern(re),
                Err(e) => {
                    debug!("Invalid search pattern '{}': {}", text, e);
                    Matcher::Nothing
                }
            };
        }

        Matcher::Terms(text.split_whitespace().map(|t| t.to_lowercase()).collect())
    }

    /// 过滤书签，保持原顺序
    pub fn filter<'a>(&self, bookmarks: &'a [BookmarkRecord]) -> Vec<&'a BookmarkRecord> {
        let matcher = self.matcher();
        bookmarks
            .iter()
            .filter(|b| self.matches(&matcher, b))
            .collect()
    }

    fn matches(&self, matcher: &Matcher, b: &BookmarkRecord) -> bool {
        match matcher {
            Matcher::All => true,
            Matcher::Nothing => false,
            Matcher::Pattern(re) => {
                re.is_match(&b.title)
                    || re.is_match(&b.url)
                    || (self.full_text && re.is_match(&b.snapshot))
            }
            Matcher::Terms(terms) => {
                let mut haystack = format!("{} {} {}", b.title, b.url, b.folder);
                if self.full_text {
                    haystack.push(' ');
                    haystack.push_str(&b.snapshot);
                }
                let haystack = haystack.to_lowercase();
                terms.iter().all(|t| haystack.contains(t.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlatBookmark;

    fn record(id: &str, title: &str, url: &str, folder: &str, snapshot: &str) -> BookmarkRecord {
        let mut r = BookmarkRecord::hydrate(
            FlatBookmark {
                id: id.to_string(),
                title: title.to_string(),
                url: url.to_string(),
                folder: folder.to_string(),
                date_added: 0,
            },
            None,
        );
        r.snapshot = snapshot.to_string();
        r
    }

    fn library() -> Vec<BookmarkRecord> {
        vec![
            record("1", "The Rust Book", "https://doc.rust-lang.org/book", "Docs", "ownership borrowing"),
            record("2", "Tokio tutorial", "https://tokio.rs/tokio/tutorial", "Docs/Async", ""),
            record("3", "News", "https://news.example", "Daily", "rust release notes"),
        ]
    }

    fn ids(found: Vec<&BookmarkRecord>) -> Vec<&str> {
        found.into_iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_empty_query_returns_all() {
        let lib = library();
        assert_eq!(SearchQuery::new("   ").filter(&lib).len(), 3);
    }

    #[test]
    fn test_terms_must_all_match() {
        let lib = library();
        assert_eq!(ids(SearchQuery::new("rust book").filter(&lib)), vec!["1"]);
        assert_eq!(ids(SearchQuery::new("DOCS").filter(&lib)), vec!["1", "2"]);
        assert_eq!(ids(SearchQuery::new("async tokio").filter(&lib)), vec!["2"]);
    }

    #[test]
    fn test_full_text_includes_snapshot() {
        let lib = library();
        assert!(SearchQuery::new("release").filter(&lib).is_empty());
        assert_eq!(
            ids(SearchQuery::new("release").full_text(true).filter(&lib)),
            vec!["3"]
        );
    }

    #[test]
    fn test_regex_mode() {
        let lib = library();
        assert_eq!(
            ids(SearchQuery::new(r"^the\s+rust").regex(true).filter(&lib)),
            vec!["1"]
        );
        assert_eq!(
            ids(SearchQuery::new("borrow|release").regex(true).full_text(true).filter(&lib)),
            vec!["1", "3"]
        );
    }

    #[test]
    fn test_invalid_regex_matches_nothing() {
        let lib = library();
        assert!(SearchQuery::new("(unclosed").regex(true).filter(&lib).is_empty());
    }
}
