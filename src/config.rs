//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__LLM__PROVIDER=gemini`）。
//! 所有字段都有默认值，缺失的键不会导致加载失败。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::GenerationConfig;
use crate::memory::MemoryBudget;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub search: SearchSection,
    pub retry: RetrySection,
    pub delivery: DeliverySection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "scout".to_string(),
        }
    }
}

/// [llm] 段：后端选择、超时与生成参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// gemini / openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 本地估算的 prompt token 上限；超出视为 BudgetExceeded
    pub max_prompt_tokens: usize,
    pub timeouts: LlmTimeoutsSection,
    pub generation: LlmGenerationSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            base_url: None,
            max_prompt_tokens: 700_000,
            timeouts: LlmTimeoutsSection::default(),
            generation: LlmGenerationSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 普通生成调用超时（秒）
    pub request: u64,
    /// 搜索查询生成超时（秒）
    pub query_generation: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            query_generation: 10,
        }
    }
}

impl LlmTimeoutsSection {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request)
    }

    pub fn query_generation(&self) -> Duration {
        Duration::from_secs(self.query_generation)
    }
}

/// [llm.generation] 段：对话首轮（思维链）使用的采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmGenerationSection {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for LlmGenerationSection {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

impl LlmGenerationSection {
    pub fn to_generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            top_k: Some(self.top_k),
            max_output_tokens: None,
        }
    }
}

/// [memory] 段：对话记忆存储与预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// json / sqlite / memory
    pub backend: String,
    /// JSON 后端目录（每用户一个文件）
    pub dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub max_tokens: usize,
    pub max_messages: usize,
    /// 普通对话注入的历史条数
    pub context_messages: usize,
    /// 搜索查询生成时参考的历史条数
    pub search_context_messages: usize,
    /// 内存缓存容量（用户数）；0 表示不缓存
    pub cache_capacity: u64,
    pub default_language: String,
    pub default_timezone: String,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "json".to_string(),
            dir: PathBuf::from("user_memories"),
            sqlite_path: PathBuf::from("user_memories/scout.db"),
            max_tokens: 1_048_576,
            max_messages: 10_000,
            context_messages: 10,
            search_context_messages: 5,
            cache_capacity: 1024,
            default_language: "en".to_string(),
            default_timezone: "UTC".to_string(),
        }
    }
}

impl MemorySection {
    pub fn budget(&self) -> MemoryBudget {
        MemoryBudget::new(self.max_tokens, self.max_messages)
    }
}

/// [search] 段：深度搜索轮数、每查询结果数与后端地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub max_iterations: usize,
    pub results_per_query: usize,
    pub max_queries: usize,
    pub timeout_secs: u64,
    /// 生成搜索查询时要求模型使用的语言
    pub language: String,
    pub primary_url: String,
    pub fallback_url: String,
    /// 合成前按 URL 去重（默认关闭，保持逐轮累积）
    pub dedupe_by_url: bool,
    /// 合成前累积结果上限；0 表示不限
    pub max_accumulated_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            results_per_query: 5,
            max_queries: 3,
            timeout_secs: 15,
            language: "English".to_string(),
            primary_url: "https://html.duckduckgo.com/html/".to_string(),
            fallback_url: "https://www.google.com/search".to_string(),
            dedupe_by_url: false,
            max_accumulated_results: 0,
        }
    }
}

/// [retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: usize,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// [delivery] 段：单条消息最大字符数（如 Telegram 为 4096）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    pub max_message_chars: usize,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            max_message_chars: 4096,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
