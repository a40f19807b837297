//! Google 结果页抓取（备用后端）

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::Html;

use crate::search::backend::{element_text, selector};
use crate::search::{SearchBackend, SearchError, SearchResult};

pub const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";

pub struct GoogleScrapeBackend {
    client: Client,
    base_url: String,
}

impl GoogleScrapeBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: GOOGLE_SEARCH_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchBackend for GoogleScrapeBackend {
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
        if response.status() != StatusCode::OK {
            return Err(SearchError::Status(response.status().as_u16()));
        }
        let html = response.text().await?;
        parse_results(&html, max_results)
    }

    fn name(&self) -> &str {
        "google"
    }
}

/// 解析 `div.g` 块；标题（h3）、链接（a[href]）、摘要（div.VwiC3b）缺一则跳过
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
    let block_sel = selector("div.g")?;
    let title_sel = selector("h3")?;
    let link_sel = selector("a[href]")?;
    let snippet_sel = selector("div.VwiC3b")?;

    let document = Html::parse_document(html);
    let results = document
        .select(&block_sel)
        .take(max_results)
        .filter_map(|block| {
            let title = block.select(&title_sel).next().map(element_text)?;
            let link = block
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))?;
            let body = block.select(&snippet_sel).next().map(element_text)?;
            Some(SearchResult::new(title, link, body))
        })
        .collect();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_all_parts() {
        let html = r#"
            <div class="g">
              <a href="https://example.com/1"><h3>First</h3></a>
              <div class="VwiC3b">Snippet one</div>
            </div>
            <div class="g">
              <a href="https://example.com/2"><h3>No snippet</h3></a>
            </div>
            <div class="g">
              <a href="https://example.com/3"><h3>Third</h3></a>
              <div class="VwiC3b">Snippet three</div>
            </div>
        "#;
        let results = parse_results(html, 5).unwrap();
        assert_eq!(
            results,
            vec![
                SearchResult::new("First", "https://example.com/1", "Snippet one"),
                SearchResult::new("Third", "https://example.com/3", "Snippet three"),
            ]
        );
    }

    #[test]
    fn test_cap_applies_to_blocks() {
        let block = r#"<div class="g"><a href="u"><h3>t</h3></a><div class="VwiC3b">b</div></div>"#;
        let html = block.repeat(8);
        assert_eq!(parse_results(&html, 5).unwrap().len(), 5);
    }
}
