//! 错误恢复引擎
//!
//! 根据 ChatError 类型返回 RecoveryAction，供 RetryController 决定是剪枝重试还是终止。

use crate::core::{ChatError, RecoveryAction};

/// 只有上下文超限可以通过剪枝恢复；超时不重试
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ChatError) -> RecoveryAction {
        match err {
            ChatError::BudgetExceeded(_) => RecoveryAction::TrimAndRetry,
            ChatError::GenerationTimeout(_) => RecoveryAction::Abort,
            _ => RecoveryAction::Abort,
        }
    }
}
