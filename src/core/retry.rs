//! 对话轮次的有界重试
//!
//! 每次尝试从头重跑整轮；上下文超限时先剪掉该用户最旧的一条历史，其余错误直接返回。
//! `max_retries` 是总尝试次数，至少为 1。

use std::future::Future;

use crate::core::{ChatError, RecoveryAction, RecoveryEngine};
use crate::memory::ConversationStore;

#[derive(Debug)]
pub struct RetryController {
    max_retries: usize,
    engine: RecoveryEngine,
}

impl RetryController {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries: max_retries.max(1),
            engine: RecoveryEngine::new(),
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// `turn` 接收当前尝试序号（从 1 开始）
    pub async fn run<T, F, Fut>(
        &self,
        user_id: &str,
        store: &ConversationStore,
        mut turn: F,
    ) -> Result<T, ChatError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ChatError>>,
    {
        for attempt in 1..=self.max_retries {
            let err = match turn(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.engine.handle(&err) {
                RecoveryAction::TrimAndRetry => {
                    let trimmed = store.trim_one(user_id).await;
                    tracing::warn!(
                        user_id,
                        attempt,
                        trimmed = trimmed.is_some(),
                        error = %err,
                        "Context budget exceeded, retrying with trimmed history"
                    );
                }
                RecoveryAction::Abort => {
                    tracing::error!(user_id, attempt, error = %err, "Chat turn failed");
                    return Err(err);
                }
            }
        }
        tracing::error!(user_id, max_retries = self.max_retries, "Max retries reached");
        Err(ChatError::MaxRetries(self.max_retries))
    }
}
