//! 可观测性
//!
//! 默认 info 级别，可通过 RUST_LOG 覆盖。Prompt 与模型原始输出写入 `scout::thoughts` 目标（debug 级别），
//! 需要查看思考过程时使用 `RUST_LOG=scout::thoughts=debug`。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 思考过程日志目标
pub const THOUGHTS: &str = "scout::thoughts";

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
