//! LLM 层：文本生成抽象与实现（Gemini / OpenAI 兼容 / DeepSeek / Mock）

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use gemini::GeminiClient;
pub use mock::MockGenerator;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{
    generate_with_timeout, Attachment, Generation, GenerationConfig, GenerationRequest, LlmError,
    TextGenerator,
};

/// 按配置创建生成器；对应 provider 的 API Key 缺失时回退到 Mock
pub fn create_generator_from_config(cfg: &AppConfig) -> Arc<dyn TextGenerator> {
    let provider = cfg.llm.provider.to_lowercase();
    let model = cfg.llm.model.as_str();

    match provider.as_str() {
        "gemini" => match std::env::var("GEMINI_API_KEY") {
            Ok(key) => {
                tracing::info!("Using Gemini LLM ({})", model);
                let mut client = GeminiClient::new(model, Some(&key));
                if let Some(base) = cfg.llm.base_url.as_deref() {
                    client = client.with_base_url(base);
                }
                Arc::new(client)
            }
            Err(_) => mock_fallback(&provider),
        },
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => {
                tracing::info!("Using OpenAI LLM ({})", model);
                Arc::new(OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    model,
                    Some(&key),
                ))
            }
            Err(_) => mock_fallback(&provider),
        },
        "deepseek" => {
            if std::env::var("DEEPSEEK_API_KEY").is_ok() {
                tracing::info!("Using DeepSeek LLM ({})", model);
                Arc::new(OpenAiClient::deepseek(Some(model)))
            } else {
                mock_fallback(&provider)
            }
        }
        "mock" => Arc::new(MockGenerator::echo()),
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider");
            mock_fallback(other)
        }
    }
}

fn mock_fallback(provider: &str) -> Arc<dyn TextGenerator> {
    tracing::warn!(provider, "No API key set for provider, using Mock LLM");
    Arc::new(MockGenerator::echo())
}
