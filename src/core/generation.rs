//! 生成调用守卫
//!
//! 所有模型调用经由这里：本地 prompt 预算预检、超时、安全拦截映射为 [`ChatError`]，
//! prompt 与原始输出写入 `scout::thoughts` 日志目标。

use std::sync::Arc;
use std::time::Duration;

use crate::core::ChatError;
use crate::llm::{generate_with_timeout, Generation, GenerationRequest, TextGenerator};
use crate::memory::TokenEstimator;
use crate::observability::THOUGHTS;

pub struct GenerationGuard {
    generator: Arc<dyn TextGenerator>,
    request_timeout: Duration,
    /// 0 表示不做本地预检
    max_prompt_tokens: usize,
}

impl GenerationGuard {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        request_timeout: Duration,
        max_prompt_tokens: usize,
    ) -> Self {
        Self {
            generator,
            request_timeout,
            max_prompt_tokens,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn backend_name(&self) -> &str {
        self.generator.name()
    }

    /// 使用默认超时生成纯文本
    pub async fn text(&self, task: &str, prompt: String) -> Result<String, ChatError> {
        self.generate(task, &GenerationRequest::new(prompt), self.request_timeout)
            .await
    }

    pub async fn generate(
        &self,
        task: &str,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String, ChatError> {
        let estimated = TokenEstimator::estimate(&request.prompt);
        if self.max_prompt_tokens > 0 && estimated > self.max_prompt_tokens {
            tracing::warn!(
                task,
                estimated,
                limit = self.max_prompt_tokens,
                "Prompt exceeds local token budget"
            );
            return Err(ChatError::BudgetExceeded(format!(
                "prompt has ~{} tokens, limit {}",
                estimated, self.max_prompt_tokens
            )));
        }

        tracing::debug!(target: THOUGHTS, task, prompt = %request.prompt, "Prompt");
        match generate_with_timeout(self.generator.as_ref(), request, timeout).await? {
            Generation::Text(text) => {
                tracing::debug!(target: THOUGHTS, task, output = %text, "Model output");
                Ok(text)
            }
            Generation::Blocked { reason } => {
                tracing::warn!(task, reason = %reason, "Generation blocked");
                Err(ChatError::GenerationBlocked { reason })
            }
        }
    }
}
