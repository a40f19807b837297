//! Agent 命令层
//!
//! 供聊天平台前端（Telegram、REPL 等）调用的无界面入口：
//! - `send`：单轮检索 + 思维链 + 清理两段生成，经 RetryController 有界重试，可选追加表情；
//! - `deep_search`：多轮深度搜索；
//! - `send_media`：图片 / 视频分析；
//! - 偏好设置（表情、语言、时区、人格）。
//!
//! 所有方法都返回 [`Reply`]，错误已映射为本地化文案，不会向上抛出。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{ChatError, ErrorKind, GenerationGuard, RetryController};
use crate::llm::{create_generator_from_config, Attachment, GenerationConfig, GenerationRequest, TextGenerator};
use crate::memory::{ConversationStore, PersonalityProfile, Role, UserProfile};
use crate::prompts::{self, tasks};
use crate::search::{DeepSearchOutcome, RetrievalProvider, SearchOrchestrator, SearchSettings};

/// 打字状态刷新间隔
const TYPING_INTERVAL: Duration = Duration::from_secs(2);

/// 表情后缀最多个数
const MAX_DECORATIONS: usize = 3;

/// 用户输入解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    DeepSearch(String),
    SetDecorations(bool),
    SetLanguage(String),
    SetTimezone(String),
    Invalid(String),
}

/// 解析斜杠命令；`/cmd@bot` 形式会去掉 `@bot`
pub fn parse_command(text: &str) -> Command {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return Command::Chat(trimmed.to_string());
    }
    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let arg = rest.trim();

    match name.as_str() {
        "/deep" | "/derinarama" => Command::DeepSearch(arg.to_string()),
        "/decor" => match arg.to_lowercase().as_str() {
            "on" | "true" | "1" => Command::SetDecorations(true),
            "off" | "false" | "0" => Command::SetDecorations(false),
            _ => Command::Invalid(trimmed.to_string()),
        },
        "/lang" if !arg.is_empty() => Command::SetLanguage(arg.to_lowercase()),
        "/tz" if !arg.is_empty() => Command::SetTimezone(arg.to_string()),
        _ => Command::Invalid(trimmed.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Answer,
    Error(ErrorKind),
}

/// 发给用户的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub kind: ReplyKind,
}

impl Reply {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ReplyKind::Answer,
        }
    }

    pub fn error(kind: ErrorKind, lang: &str) -> Self {
        Self {
            text: kind.message(lang).to_string(),
            kind: ReplyKind::Error(kind),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ReplyKind::Error(_))
    }

    /// 按行切分为不超过 `max_chars` 个字符的片段；超长单行按字符硬切
    pub fn chunks(&self, max_chars: usize) -> Vec<String> {
        let max_chars = max_chars.max(1);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for line in self.text.lines() {
            let line_len = line.chars().count();
            let needed = if current.is_empty() { line_len } else { line_len + 1 };
            if current_len + needed > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if line_len > max_chars {
                let chars: Vec<char> = line.chars().collect();
                for piece in chars.chunks(max_chars) {
                    chunks.push(piece.iter().collect());
                }
                continue;
            }
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// 传输层提供的"正在输入"信号
#[async_trait]
pub trait TypingIndicator: Send + Sync {
    async fn pulse(&self);
}

pub struct Agent {
    store: Arc<ConversationStore>,
    search: SearchOrchestrator,
    guard: Arc<GenerationGuard>,
    retry: RetryController,
    generation: GenerationConfig,
    context_messages: usize,
    typing_interval: Duration,
}

impl Agent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<ConversationStore>,
        provider: RetrievalProvider,
        cfg: &AppConfig,
    ) -> Self {
        let guard = Arc::new(GenerationGuard::new(
            generator,
            cfg.llm.timeouts.request(),
            cfg.llm.max_prompt_tokens,
        ));
        let settings = SearchSettings::from_config(cfg);
        let retry = RetryController::new(cfg.retry.max_retries);
        tracing::info!(
            generator = guard.backend_name(),
            max_iterations = settings.max_iterations,
            max_retries = retry.max_retries(),
            "Agent ready"
        );
        let search = SearchOrchestrator::new(guard.clone(), provider, settings);
        Self {
            store,
            search,
            guard,
            retry,
            generation: cfg.llm.generation.to_generation_config(),
            context_messages: cfg.memory.context_messages,
            typing_interval: TYPING_INTERVAL,
        }
    }

    /// 按配置构建生成器、存储与检索后端
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let generator = create_generator_from_config(cfg);
        let store = ConversationStore::from_config(&cfg.memory)
            .context("Failed to open conversation store")?;
        let provider = RetrievalProvider::from_config(&cfg.search)
            .context("Failed to build search client")?;
        Ok(Self::new(generator, Arc::new(store), provider, cfg))
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.typing_interval = interval;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// 解析并分派一条用户输入
    pub async fn handle(&self, user_id: &str, text: &str) -> Reply {
        match parse_command(text) {
            Command::Chat(message) => self.send(user_id, &message).await,
            Command::DeepSearch(query) => self.deep_search(user_id, &query).await,
            Command::SetDecorations(on) => self.set_decorations(user_id, on).await,
            Command::SetLanguage(code) => self.set_language(user_id, &code).await,
            Command::SetTimezone(tz) => self.set_timezone(user_id, &tz).await,
            Command::Invalid(raw) => {
                tracing::info!(user_id, command = %raw, "Unrecognized command");
                let profile = self.store.profile(user_id).await;
                Reply::error(ErrorKind::Unhandled, profile.effective_language())
            }
        }
    }

    /// 处理期间每隔固定间隔发送"正在输入"，结束（含失败）后停止
    pub async fn send_with_typing(
        &self,
        user_id: &str,
        text: &str,
        indicator: Arc<dyn TypingIndicator>,
    ) -> Reply {
        let token = CancellationToken::new();
        let pulse_token = token.clone();
        let _stop_typing = token.drop_guard();
        let interval = self.typing_interval;

        tokio::spawn(async move {
            loop {
                indicator.pulse().await;
                tokio::select! {
                    _ = pulse_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        self.handle(user_id, text).await
    }

    /// 普通对话轮次
    pub async fn send(&self, user_id: &str, text: &str) -> Reply {
        let profile = self.store.profile(user_id).await;
        let lang = profile.effective_language().to_string();
        if text.trim().is_empty() {
            return Reply::error(ErrorKind::Unhandled, &lang);
        }

        let result = self
            .retry
            .run(user_id, &self.store, |attempt| {
                self.chat_turn(user_id, text, &profile, attempt)
            })
            .await;

        match result {
            Ok(answer) => {
                let answer = if profile.preferences.decorations {
                    self.decorate(&answer).await
                } else {
                    answer
                };
                self.store.append(user_id, Role::User, text).await;
                self.store.append(user_id, Role::Assistant, &answer).await;
                Reply::answer(answer)
            }
            Err(e) => Reply::error(e.kind(), &lang),
        }
    }

    async fn chat_turn(
        &self,
        user_id: &str,
        text: &str,
        profile: &UserProfile,
        attempt: usize,
    ) -> Result<String, ChatError> {
        tracing::debug!(user_id, attempt, "Chat turn");
        let history = self.store.recent_messages(user_id, self.context_messages).await;
        let history_text = self.store.recent_context(user_id, self.context_messages).await;
        let round = self.search.single_round(text, &history).await;
        let search_context = if round.context.trim().len() > 10 {
            round.context
        } else {
            "(none)".to_string()
        };

        let lang = profile.effective_language();
        let persona = prompts::persona_context(profile, Utc::now());
        let request = GenerationRequest::new(prompts::chat_reasoning(
            &persona,
            &history_text,
            &search_context,
            text,
            lang,
        ))
        .with_config(self.generation.clone());
        let reasoning = self
            .guard
            .generate(tasks::CHAT_REASONING, &request, self.guard.request_timeout())
            .await?;

        let answer = self
            .guard
            .text(tasks::CHAT_ANSWER, prompts::chat_answer(text, &reasoning, lang))
            .await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(answer.to_string())
    }

    /// 追加 0–3 个表情；任何失败都原样返回
    async fn decorate(&self, text: &str) -> String {
        match self.guard.text(tasks::DECORATION, prompts::decoration(text)).await {
            Ok(output) => {
                let emojis: Vec<&str> = output
                    .split_whitespace()
                    .filter(|token| token.chars().all(|c| !c.is_alphanumeric() && !c.is_ascii()))
                    .take(MAX_DECORATIONS)
                    .collect();
                if emojis.is_empty() {
                    text.to_string()
                } else {
                    format!("{} {}", text, emojis.join(" "))
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Decoration skipped");
                text.to_string()
            }
        }
    }

    /// 深度搜索命令
    pub async fn deep_search(&self, user_id: &str, query: &str) -> Reply {
        let profile = self.store.profile(user_id).await;
        let lang = profile.effective_language().to_string();
        let query = query.trim();
        if query.is_empty() {
            return Reply::error(ErrorKind::EmptyQuery, &lang);
        }

        let history = self.store.recent_messages(user_id, self.context_messages).await;
        match self.search.deep_search_in(query, &history, &lang).await {
            DeepSearchOutcome::Done { answer, .. } => {
                self.store
                    .append(user_id, Role::User, &format!("/deep {}", query))
                    .await;
                self.store.append(user_id, Role::Assistant, &answer).await;
                Reply::answer(answer)
            }
            DeepSearchOutcome::NoResults { .. } => Reply::error(ErrorKind::NoResults, &lang),
            DeepSearchOutcome::Failed { error, .. } => Reply::error(error.kind(), &lang),
        }
    }

    /// 图片 / 视频分析；说明为空时使用默认分析请求
    pub async fn send_media(&self, user_id: &str, attachment: Attachment, caption: &str) -> Reply {
        let profile = self.store.profile(user_id).await;
        let lang = profile.effective_language().to_string();
        let is_video = attachment.is_video();
        let persona = prompts::persona_context(&profile, Utc::now());
        let request = GenerationRequest::new(prompts::media_analysis(&persona, caption, is_video, &lang))
            .with_attachment(attachment);

        let result = self
            .guard
            .generate(tasks::MEDIA, &request, self.guard.request_timeout())
            .await
            .and_then(|text| {
                let text = text.trim().to_string();
                if text.is_empty() {
                    Err(ChatError::EmptyResponse)
                } else {
                    Ok(text)
                }
            });

        match result {
            Ok(text) => {
                let label = if is_video { "[Video]" } else { "[Image]" };
                let stored = format!("{} {}", label, caption.trim());
                self.store.append(user_id, Role::User, stored.trim()).await;
                self.store.append(user_id, Role::Assistant, &text).await;
                Reply::answer(text)
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Media analysis failed");
                Reply::error(e.kind(), &lang)
            }
        }
    }

    pub async fn set_decorations(&self, user_id: &str, enabled: bool) -> Reply {
        self.store
            .update_profile(user_id, |p| p.preferences.decorations = enabled)
            .await;
        Reply::answer(if enabled {
            "Decorations enabled."
        } else {
            "Decorations disabled."
        })
    }

    pub async fn set_language(&self, user_id: &str, code: &str) -> Reply {
        let code = code.to_string();
        self.store
            .update_profile(user_id, |p| p.preferences.custom_language = Some(code.clone()))
            .await;
        Reply::answer(format!("Language set to {}.", code))
    }

    pub async fn set_timezone(&self, user_id: &str, tz: &str) -> Reply {
        if tz.parse::<chrono_tz::Tz>().is_err() {
            tracing::info!(user_id, timezone = tz, "Rejected unknown timezone");
            return Reply {
                text: format!("Unknown timezone: {}", tz),
                kind: ReplyKind::Error(ErrorKind::General),
            };
        }
        let tz = tz.to_string();
        self.store
            .update_profile(user_id, |p| p.preferences.timezone = tz.clone())
            .await;
        Reply::answer(format!("Timezone set to {}.", tz))
    }

    pub async fn set_personality(&self, user_id: &str, personality: PersonalityProfile) -> Reply {
        self.store
            .update_profile(user_id, |p| p.personality = personality)
            .await;
        Reply::answer("Personality updated.")
    }
}
