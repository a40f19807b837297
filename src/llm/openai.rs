//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 仅支持纯文本 prompt，二进制附件请使用 Gemini 后端。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, FinishReason,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{Generation, GenerationRequest, LlmError, TextGenerator};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：单条 user 消息发送 prompt，取首个 choice
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::default(),
        }
    }

    /// DeepSeek 端点（OpenAI 兼容）；Key 取 DEEPSEEK_API_KEY
    pub fn deepseek(model: Option<&str>) -> Self {
        let api_key = std::env::var("DEEPSEEK_API_KEY").ok();
        Self::new(
            Some(DEEPSEEK_BASE_URL),
            model.unwrap_or(DEEPSEEK_CHAT),
            api_key.as_deref(),
        )
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        if request.attachment.is_some() {
            return Err(LlmError::ApiError(
                "binary attachments are not supported by the OpenAI-compatible backend".into(),
            ));
        }

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.clone())
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let messages: Vec<ChatCompletionRequestMessage> = vec![message.into()];
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if let Some(cfg) = &request.config {
            if let Some(t) = cfg.temperature {
                args.temperature(t);
            }
            if let Some(p) = cfg.top_p {
                args.top_p(p);
            }
            if let Some(max) = cfg.max_output_tokens {
                args.max_completion_tokens(max);
            }
        }
        let chat_request = args
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;

        if matches!(choice.finish_reason, Some(FinishReason::ContentFilter)) {
            return Ok(Generation::Blocked {
                reason: "content_filter".to_string(),
            });
        }

        Ok(Generation::Text(choice.message.content.unwrap_or_default()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// 上下文超限在适配器边界识别为 BudgetExceeded，其余按类别映射
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::ApiError(api) => {
            let code = format!("{:?}", api.code);
            if code.contains("context_length_exceeded") {
                LlmError::BudgetExceeded(api.message)
            } else if code.contains("rate_limit") {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else {
                LlmError::ApiError(api.message)
            }
        }
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        other => LlmError::ApiError(other.to_string()),
    }
}
