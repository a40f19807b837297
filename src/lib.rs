//! Scout - 带检索增强与持久记忆的多语言对话助手
//!
//! 模块划分：
//! - **agent**: 无头命令层（对话、深度搜索、媒体分析、偏好设置）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、生成守卫、有界重试、深度搜索状态
//! - **llm**: 文本生成抽象与实现（Gemini / OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 每用户对话记忆、token 预算与持久化（JSON / SQLite）
//! - **observability**: 日志初始化
//! - **prompts**: Prompt 模板与人格上下文
//! - **search**: 检索后端、查询生成、多轮深度搜索

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod search;

pub use agent::{parse_command, Agent, Command, Reply, ReplyKind, TypingIndicator};
