//! 文本生成抽象
//!
//! 所有后端（Gemini / OpenAI 兼容 / Mock）实现 TextGenerator：输入 prompt（可带二进制附件）与生成参数，
//! 返回生成文本或安全拦截信号。超时由调用方通过 [`generate_with_timeout`] 施加。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 模型边界上的错误（网络、限流、上下文超限、超时）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// 模型侧 token 预算超限；由适配器根据 API 错误码显式构造
    #[error("context budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// 二进制附件（图片 / 视频）
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// 采样参数；None 表示使用后端默认值
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

/// 一次生成请求
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub attachment: Option<Attachment>,
    pub config: Option<GenerationConfig>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
            config: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// 生成结果：文本，或被模型安全策略拦截
#[derive(Clone, Debug, PartialEq)]
pub enum Generation {
    Text(String),
    Blocked { reason: String },
}

impl Generation {
    pub fn text(&self) -> Option<&str> {
        match self {
            Generation::Text(t) => Some(t),
            Generation::Blocked { .. } => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Generation::Blocked { .. })
    }
}

/// 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "generator"
    }
}

/// 带超时的生成调用：超时映射为 [`LlmError::Timeout`]，不会向上抛出原始超时
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<Generation, LlmError> {
    match tokio::time::timeout(timeout, generator.generate(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                backend = generator.name(),
                timeout_ms = timeout.as_millis() as u64,
                "generation timed out"
            );
            Err(LlmError::Timeout(timeout))
        }
    }
}
