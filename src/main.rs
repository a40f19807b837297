//! Scout - 命令行入口
//!
//! 初始化日志与配置，创建 Agent，逐行读取标准输入并打印回复（按单条消息上限分段）。
//! 用户 ID 取自环境变量 `SCOUT_USER`，默认 `local`。

use anyhow::Context;
use scout::{config::load_config, config::AppConfig, observability, Agent};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    let agent = Agent::from_config(&cfg).context("Failed to create agent")?;
    let user_id = std::env::var("SCOUT_USER").unwrap_or_else(|_| "local".to_string());
    tracing::info!(user_id = %user_id, provider = %cfg.llm.provider, "Scout ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = agent.handle(&user_id, &line).await;
        for chunk in reply.chunks(cfg.delivery.max_message_chars) {
            println!("{}\n", chunk);
        }
    }

    Ok(())
}
