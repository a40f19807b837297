//! Gemini 原生 generateContent 客户端
//!
//! 直接调用 REST 接口：支持内联二进制附件（图片 / 视频）、采样参数，
//! 并把 `promptFeedback.blockReason` 与 SAFETY 类 finishReason 映射为 [`Generation::Blocked`]。

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::llm::{Generation, GenerationConfig, GenerationRequest, LlmError, TextGenerator};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_FLASH_LITE: &str = "gemini-2.0-flash-lite";

/// 视为安全拦截的 finishReason
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();
        Self {
            client: Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    /// 覆盖 API 地址（代理或测试用 wiremock）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(request: &GenerationRequest) -> GenerateContentRequest {
        let mut parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];
        if let Some(attachment) = &request.attachment {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: attachment.mime_type.clone(),
                    data: BASE64_STANDARD.encode(&attachment.data),
                },
            });
        }
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: request.config.as_ref().map(WireGenerationConfig::from),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body, retry_after_ms));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        extract_generation(parsed)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn extract_generation(response: GenerateContentResponse) -> Result<Generation, LlmError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Ok(Generation::Blocked { reason });
    }

    let candidate = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| LlmError::InvalidResponse("no candidates in response".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate
            .finish_reason
            .filter(|r| BLOCKING_FINISH_REASONS.contains(&r.as_str()))
        {
            return Ok(Generation::Blocked { reason });
        }
    }

    Ok(Generation::Text(text))
}

/// 把 HTTP 错误映射为 LlmError；token 超限在这里一次性识别为 BudgetExceeded
fn map_http_error(status: StatusCode, body: &str, retry_after_ms: Option<u64>) -> LlmError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| w.error.message)
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited { retry_after_ms };
    }
    if status == StatusCode::BAD_REQUEST && is_token_limit_message(&message) {
        return LlmError::BudgetExceeded(message);
    }
    LlmError::ApiError(format!("{}: {}", status.as_u16(), message))
}

fn is_token_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("token") && (lower.contains("exceed") || lower.contains("limit"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl From<&GenerationConfig> for WireGenerationConfig {
    fn from(c: &GenerationConfig) -> Self {
        Self {
            temperature: c.temperature,
            top_p: c.top_p,
            top_k: c.top_k,
            max_output_tokens: c.max_output_tokens,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Attachment;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new("gemini-test", Some("test-key")).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Hello "}, {"text": "there"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let out = client(&server)
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(out, Generation::Text("Hello there".to_string()));
    }

    #[tokio::test]
    async fn test_prompt_feedback_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let out = client(&server)
            .generate(&GenerationRequest::new("bad"))
            .await
            .unwrap();
        assert_eq!(
            out,
            Generation::Blocked {
                reason: "SAFETY".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_attachment_and_config_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {"topK": 40},
                "contents": [{"role": "user"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "a cat"}]}}]
            })))
            .mount(&server)
            .await;

        let req = GenerationRequest::new("describe")
            .with_attachment(Attachment::new("image/jpeg", vec![0xff, 0xd8]))
            .with_config(GenerationConfig {
                top_k: Some(40),
                ..Default::default()
            });
        let out = client(&server).generate(&req).await.unwrap();
        assert_eq!(out.text(), Some("a cat"));
    }

    #[tokio::test]
    async fn test_token_limit_maps_to_budget_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "The input token count exceeds the maximum number of tokens allowed"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate(&GenerationRequest::new("long"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BudgetExceeded(_)));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate(&GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LlmError::RateLimited {
                retry_after_ms: Some(2000)
            }
        );
    }

    #[test]
    fn test_safety_finish_without_text_is_blocked() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(extract_generation(parsed).unwrap().is_blocked());
    }
}
