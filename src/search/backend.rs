//! 搜索后端抽象与共享 HTTP 客户端

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;

use crate::search::{SearchError, SearchResult};

/// 浏览器 UA，避免被结果页识别为爬虫
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 单个关键词搜索能力
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, SearchError>;

    fn name(&self) -> &str;
}

/// 带超时、UA 与 Accept 头的 reqwest 客户端
pub fn build_client(timeout: Duration) -> Result<Client, SearchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .map_err(SearchError::from)
}

/// 解析 CSS 选择器；失败转为 [`SearchError::Parse`]
pub(crate) fn selector(css: &str) -> Result<scraper::Selector, SearchError> {
    scraper::Selector::parse(css).map_err(|e| SearchError::Parse(format!("{}: {:?}", css, e)))
}

/// 合并元素内全部文本并压缩空白
pub(crate) fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
