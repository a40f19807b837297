//! 搜索结果与错误类型

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 单条搜索结果；同一链接可能出现多次
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub body: String,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, link: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            body: body.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Http(e.to_string())
    }
}
