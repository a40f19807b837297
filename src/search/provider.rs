//! 检索提供者：主后端失败时用同样的查询与上限重试备用后端，永不向上抛错

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::config::SearchSection;
use crate::core::ChatError;
use crate::search::{
    build_client, DuckDuckGoBackend, GoogleScrapeBackend, SearchBackend, SearchError,
    SearchResult,
};

#[derive(Clone)]
pub struct RetrievalProvider {
    primary: Arc<dyn SearchBackend>,
    fallback: Option<Arc<dyn SearchBackend>>,
}

impl RetrievalProvider {
    pub fn new(primary: Arc<dyn SearchBackend>, fallback: Option<Arc<dyn SearchBackend>>) -> Self {
        Self { primary, fallback }
    }

    /// DuckDuckGo 为主、Google 抓取为备用，共用一个 HTTP 客户端
    pub fn from_config(cfg: &SearchSection) -> Result<Self, SearchError> {
        let client = build_client(Duration::from_secs(cfg.timeout_secs))?;
        let primary = DuckDuckGoBackend::new(client.clone()).with_base_url(&cfg.primary_url);
        let fallback = GoogleScrapeBackend::new(client).with_base_url(&cfg.fallback_url);
        Ok(Self::new(Arc::new(primary), Some(Arc::new(fallback))))
    }

    /// 单次检索；两个后端都失败时返回空列表
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let primary_err = match self.primary.search(query, max_results).await {
            Ok(results) => {
                tracing::debug!(
                    backend = self.primary.name(),
                    query,
                    count = results.len(),
                    "Search completed"
                );
                return results;
            }
            Err(e) => e,
        };
        tracing::warn!(
            backend = self.primary.name(),
            query,
            error = %primary_err,
            "Primary search failed, trying fallback"
        );

        let Some(fallback) = &self.fallback else {
            let err = ChatError::from(primary_err);
            tracing::error!(query, error = %err, "No fallback backend configured");
            return Vec::new();
        };
        match fallback.search(query, max_results).await {
            Ok(results) => {
                tracing::info!(
                    backend = fallback.name(),
                    query,
                    count = results.len(),
                    "Fallback search completed"
                );
                results
            }
            Err(e) => {
                let err = ChatError::from(e);
                tracing::error!(
                    backend = fallback.name(),
                    query,
                    kind = err.kind().as_str(),
                    error = %err,
                    "Fallback search failed"
                );
                Vec::new()
            }
        }
    }

    /// 并发检索多个查询；结果顺序与查询顺序一致，单个失败只贡献空列表
    pub async fn search_all(&self, queries: &[String], max_results: usize) -> Vec<Vec<SearchResult>> {
        let searches = queries
            .iter()
            .map(|q| self.search(q, max_results))
            .collect::<Vec<_>>();
        join_all(searches).await
    }
}
