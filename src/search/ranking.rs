//! 结果排序与上下文格式化

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::search::SearchResult;

/// 小写、按空白切分的关键词
pub fn keywords(message: &str) -> Vec<String> {
    message
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

/// 标题（小写）中出现的关键词个数
pub fn keyword_score(title: &str, keywords: &[String]) -> usize {
    let title = title.to_lowercase();
    keywords.iter().filter(|k| title.contains(k.as_str())).count()
}

/// 按关键词得分降序稳定排序；同分保持原顺序
pub fn rank_by_keywords(mut results: Vec<SearchResult>, message: &str) -> Vec<SearchResult> {
    let keywords = keywords(message);
    results.sort_by_cached_key(|r| Reverse(keyword_score(&r.title, &keywords)));
    results
}

/// 保留每个链接第一次出现的结果
pub fn dedupe_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.link.clone()))
        .collect()
}

/// "Result {i}: {body}\nSource: {link}"，以空行分隔，从 1 编号
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Result {}: {}\nSource: {}", i + 1, r.body, r.link))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> SearchResult {
        SearchResult::new(title, format!("https://x/{}", title), "")
    }

    #[test]
    fn test_rank_orders_by_keyword_hits() {
        let ranked = rank_by_keywords(vec![titled("z"), titled("y"), titled("x y")], "x y");
        let titles: Vec<&str> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["x y", "y", "z"]);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ranked = rank_by_keywords(
            vec![titled("alpha one"), titled("beta"), titled("alpha two"), titled("gamma")],
            "Alpha",
        );
        let titles: Vec<&str> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["alpha one", "alpha two", "beta", "gamma"]);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let a = SearchResult::new("a", "https://same", "1");
        let b = SearchResult::new("b", "https://same", "2");
        let c = SearchResult::new("c", "https://other", "3");
        assert_eq!(dedupe_by_url(vec![a.clone(), b, c.clone()]), vec![a, c]);
    }

    #[test]
    fn test_format_context() {
        let ctx = format_context(&[
            SearchResult::new("t1", "https://a", "body a"),
            SearchResult::new("t2", "https://b", "body b"),
        ]);
        assert_eq!(
            ctx,
            "Result 1: body a\nSource: https://a\n\nResult 2: body b\nSource: https://b"
        );
        assert_eq!(format_context(&[]), "");
    }
}
