//! Mock 文本生成器（用于测试与无 API Key 的本地运行）
//!
//! 默认回显 prompt 的最后一个非空行；测试可通过 `from_fn` 按 prompt 内容编排响应，
//! 并通过 `calls` / `prompts` 检查调用情况。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{Generation, GenerationRequest, LlmError, TextGenerator};

type Responder = dyn Fn(&GenerationRequest) -> Result<Generation, LlmError> + Send + Sync;

/// 可编排的 Mock 生成器
pub struct MockGenerator {
    responder: Arc<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// 回显 prompt 最后一个非空行
    pub fn echo() -> Self {
        Self::from_fn(|req| {
            let last = req
                .prompt
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("(no input)");
            Ok(Generation::Text(last.to_string()))
        })
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<Generation, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(f),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用前等待，用于超时测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for MockGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGenerator")
            .field("delay", &self.delay)
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(request)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_last_line() {
        let gen = MockGenerator::echo();
        let out = gen
            .generate(&GenerationRequest::new("context\n\nUser: hello\n"))
            .await
            .unwrap();
        assert_eq!(out, Generation::Text("User: hello".to_string()));
        assert_eq!(gen.calls(), 1);
        assert_eq!(gen.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_from_fn_can_block() {
        let gen = MockGenerator::from_fn(|_| {
            Ok(Generation::Blocked {
                reason: "SAFETY".into(),
            })
        });
        let out = gen.generate(&GenerationRequest::new("x")).await.unwrap();
        assert!(out.is_blocked());
    }
}
