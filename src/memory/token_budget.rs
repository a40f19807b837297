//! Token 预算
//!
//! 对话记忆按两条上限约束：总 token 数与消息条数。token 数用空白分词的词数近似。

/// Token 估算器（词数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 按空白分词计数；空文本为 0
    pub fn estimate(text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// 每用户对话记忆的上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    pub max_tokens: usize,
    pub max_messages: usize,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            max_tokens: 1_048_576,
            max_messages: 10_000,
        }
    }
}

impl MemoryBudget {
    pub fn new(max_tokens: usize, max_messages: usize) -> Self {
        Self {
            max_tokens,
            max_messages,
        }
    }

    /// 两条上限是否都满足
    pub fn is_within(&self, total_tokens: usize, message_count: usize) -> bool {
        total_tokens <= self.max_tokens && message_count <= self.max_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_counts_words() {
        assert_eq!(TokenEstimator::estimate(""), 0);
        assert_eq!(TokenEstimator::estimate("   "), 0);
        assert_eq!(TokenEstimator::estimate("hello  world\nagain"), 3);
    }

    #[test]
    fn test_budget_bounds() {
        let b = MemoryBudget::new(10, 2);
        assert!(b.is_within(10, 2));
        assert!(!b.is_within(11, 2));
        assert!(!b.is_within(5, 3));
    }
}
