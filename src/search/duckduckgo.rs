//! DuckDuckGo HTML 结果页后端（主后端）

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::Html;

use crate::search::backend::{element_text, selector};
use crate::search::{SearchBackend, SearchError, SearchResult};

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

pub struct DuckDuckGoBackend {
    client: Client,
    base_url: String,
}

impl DuckDuckGoBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DUCKDUCKGO_HTML_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await?;

        // 限流时返回 202 与验证页
        if response.status() != StatusCode::OK {
            return Err(SearchError::Status(response.status().as_u16()));
        }
        let html = response.text().await?;
        parse_results(&html, max_results)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// 解析 `.result` 块：标题与链接取 `.result__a`，摘要取 `.result__snippet`
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
    let result_sel = selector(".result")?;
    let link_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        if results.len() >= max_results {
            break;
        }
        let Some(link) = element.select(&link_sel).next() else {
            continue;
        };
        let title = element_text(link);
        let url = normalize_url(link.value().attr("href").unwrap_or(""));
        let body = element
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult::new(title, url, body));
        }
    }

    Ok(results)
}

/// 把 `//duckduckgo.com/l/?uddg=<encoded>` 跳转链接还原为目标地址
pub fn normalize_url(raw_url: &str) -> String {
    let absolute = if raw_url.starts_with("//") {
        format!("https:{}", raw_url)
    } else {
        raw_url.to_string()
    };
    let Ok(parsed) = url::Url::parse(&absolute) else {
        return raw_url.to_string();
    };

    if parsed.domain() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        if let Some((_, value)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
            return value.into_owned();
        }
    }

    absolute
}
