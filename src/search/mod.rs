//! 检索层：搜索后端（DuckDuckGo / Google 抓取）、带备用的检索提供者、排序与搜索编排

pub mod backend;
pub mod duckduckgo;
pub mod google;
pub mod orchestrator;
pub mod provider;
pub mod ranking;
pub mod types;

pub use backend::{build_client, SearchBackend};
pub use duckduckgo::DuckDuckGoBackend;
pub use google::GoogleScrapeBackend;
pub use orchestrator::{DeepSearchOutcome, SearchOrchestrator, SearchRound, SearchSettings};
pub use provider::RetrievalProvider;
pub use types::{SearchError, SearchResult};
