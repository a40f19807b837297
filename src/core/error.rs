//! 对话错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：BudgetExceeded → 剪掉最旧消息后重试，其余终止并映射为用户可见的 [`ErrorKind`]。

use std::time::Duration;

use thiserror::Error;

use crate::core::ErrorKind;
use crate::llm::LlmError;
use crate::memory::StorageError;
use crate::search::SearchError;

/// 一次对话 / 深度搜索中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("generation blocked: {reason}")]
    GenerationBlocked { reason: String },

    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// 模型报告或本地预检发现上下文超出预算
    #[error("context budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("max retries ({0}) reached")]
    MaxRetries(usize),

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

impl ChatError {
    /// 用户可见的错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::GenerationBlocked { .. } => ErrorKind::BlockedPrompt,
            ChatError::GenerationTimeout(_) => ErrorKind::Timeout,
            ChatError::BudgetExceeded(_) => ErrorKind::TokenLimit,
            ChatError::MaxRetries(_) => ErrorKind::MaxRetries,
            ChatError::Generation(_) | ChatError::EmptyResponse => ErrorKind::AiError,
            ChatError::RetrievalUnavailable(_) | ChatError::StorageUnavailable(_) => {
                ErrorKind::General
            }
        }
    }
}

impl From<LlmError> for ChatError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(d) => ChatError::GenerationTimeout(d),
            LlmError::BudgetExceeded(msg) => ChatError::BudgetExceeded(msg),
            other => ChatError::Generation(other.to_string()),
        }
    }
}

impl From<StorageError> for ChatError {
    fn from(e: StorageError) -> Self {
        ChatError::StorageUnavailable(e.to_string())
    }
}

impl From<SearchError> for ChatError {
    fn from(e: SearchError) -> Self {
        ChatError::RetrievalUnavailable(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 剪掉最旧的一条历史后重跑本轮
    TrimAndRetry,
    /// 终止本轮，错误交给上层展示
    Abort,
}
