//! 对话历史
//!
//! 每用户一个 [`ConversationState`]：画像 + 按时间排序的消息队列 + token 总数。
//! 追加后从队首（最旧）淘汰，直到 token 总数与条数都回到 [`MemoryBudget`] 之内。

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::memory::{MemoryBudget, TokenEstimator, UserProfile};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// 旧记录里模型回复的角色名为 "model"
    #[serde(alias = "model")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" | "model" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// 单条消息；创建后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default = "Utc::now", deserialize_with = "de_timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "tokens", default)]
    token_count: usize,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            token_count: TokenEstimator::estimate(&content),
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// 从存储恢复（时间戳与 token 数沿用记录值）
    pub fn restore(
        role: Role,
        content: String,
        timestamp: DateTime<Utc>,
        token_count: usize,
    ) -> Self {
        Self {
            role,
            content,
            timestamp,
            token_count,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }
}

/// 同时接受 RFC 3339 与不带时区的 ISO 时间（旧记录按 UTC 解释）
fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// 每用户的对话状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(default)]
    messages: VecDeque<Message>,
    #[serde(default)]
    total_tokens: usize,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(UserProfile::default())
    }
}

impl ConversationState {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            messages: VecDeque::new(),
            total_tokens: 0,
        }
    }

    /// 从画像与已排序消息构造，token 总数重新计算
    pub fn from_parts(profile: UserProfile, messages: impl IntoIterator<Item = Message>) -> Self {
        let mut state = Self {
            profile,
            messages: messages.into_iter().collect(),
            total_tokens: 0,
        };
        state.recompute();
        state
    }

    pub fn messages(&self) -> &VecDeque<Message> {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// 追加消息并按预算淘汰；返回淘汰条数
    pub fn push(&mut self, message: Message, budget: &MemoryBudget) -> usize {
        self.total_tokens += message.token_count;
        self.messages.push_back(message);
        let mut evicted = 0;
        while self.trim_one(budget).is_some() {
            evicted += 1;
        }
        evicted
    }

    /// 仅在超出预算时淘汰最旧的一条；预算内为 no-op
    pub fn trim_one(&mut self, budget: &MemoryBudget) -> Option<Message> {
        if budget.is_within(self.total_tokens, self.messages.len()) {
            return None;
        }
        self.pop_oldest()
    }

    /// 无条件淘汰最旧的一条
    pub fn pop_oldest(&mut self) -> Option<Message> {
        let removed = self.messages.pop_front()?;
        self.total_tokens = self.total_tokens.saturating_sub(removed.token_count);
        Some(removed)
    }

    /// 按消息重新计算 token 总数；返回原值是否漂移
    pub fn recompute(&mut self) -> bool {
        let actual = self.messages.iter().map(Message::token_count).sum();
        let drifted = actual != self.total_tokens;
        self.total_tokens = actual;
        drifted
    }

    /// 最近 n 条（时间顺序）
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Message> {
        self.messages.iter().skip(self.messages.len().saturating_sub(n))
    }

    /// 最近 n 条格式化为 "User: …" / "Assistant: …" 行
    pub fn format_context(&self, n: usize) -> String {
        self.recent(n)
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    #[test]
    fn test_push_evicts_fifo() {
        let budget = MemoryBudget::new(5, 100);
        let mut state = ConversationState::default();
        state.push(Message::user("a b"), &budget);
        state.push(Message::assistant("c d"), &budget);
        let evicted = state.push(Message::user("e f"), &budget);
        assert_eq!(evicted, 1);
        assert_eq!(state.total_tokens(), 4);
        assert_eq!(state.messages()[0].content(), "c d");
    }

    #[test]
    fn test_message_cap_evicts() {
        let budget = MemoryBudget::new(1000, 2);
        let mut state = ConversationState::default();
        for i in 0..5 {
            state.push(Message::user(format!("m{}", i)), &budget);
        }
        assert_eq!(state.len(), 2);
        assert_eq!(state.messages()[0].content(), "m3");
    }

    #[test]
    fn test_trim_one_idempotent_at_boundary() {
        let budget = MemoryBudget::new(4, 10);
        let mut state = ConversationState::default();
        state.push(Message::user("a b"), &budget);
        state.push(Message::user("c d"), &budget);
        assert_eq!(state.total_tokens(), 4);
        assert!(state.trim_one(&budget).is_none());
        assert!(state.trim_one(&budget).is_none());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_pop_oldest_on_empty() {
        let mut state = ConversationState::default();
        assert!(state.pop_oldest().is_none());
        assert_eq!(state.total_tokens(), 0);
    }

    #[test]
    fn test_oversized_message_is_evicted_too() {
        let budget = MemoryBudget::new(3, 10);
        let mut state = ConversationState::default();
        state.push(Message::user("a"), &budget);
        state.push(Message::user(words(10)), &budget);
        assert!(state.is_empty());
        assert_eq!(state.total_tokens(), 0);
    }

    #[test]
    fn test_format_context_last_n() {
        let budget = MemoryBudget::default();
        let mut state = ConversationState::default();
        state.push(Message::user("hi"), &budget);
        state.push(Message::assistant("hello"), &budget);
        state.push(Message::user("how are you"), &budget);
        assert_eq!(
            state.format_context(2),
            "Assistant: hello\nUser: how are you"
        );
        assert_eq!(state.format_context(10).lines().count(), 3);
        assert_eq!(state.format_context(0), "");
    }

    #[test]
    fn test_legacy_record_loads() {
        let json = r#"{
            "messages": [
                {"role": "user", "content": "merhaba dunya", "timestamp": "2024-03-01T10:00:00.123456", "tokens": 2},
                {"role": "model", "content": "selam", "timestamp": "2024-03-01T10:00:01.000000", "tokens": 1}
            ],
            "language": "tr",
            "current_topic": null,
            "total_tokens": 99,
            "preferences": {"custom_language": null, "timezone": "Europe/Istanbul"}
        }"#;
        let mut state: ConversationState = serde_json::from_str(json).unwrap();
        assert!(state.recompute());
        assert_eq!(state.total_tokens(), 3);
        assert_eq!(state.messages()[1].role(), Role::Assistant);
        assert_eq!(state.profile.language, "tr");
        assert_eq!(state.profile.preferences.timezone, "Europe/Istanbul");
    }

    #[test]
    fn test_round_trip_preserves_messages() {
        let mut state = ConversationState::default();
        state.push(Message::user("one two"), &MemoryBudget::default());
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_after_every_append(
            sizes in proptest::collection::vec(0usize..40, 1..60),
            max_tokens in 1usize..200,
            max_messages in 1usize..20,
        ) {
            let budget = MemoryBudget::new(max_tokens, max_messages);
            let mut state = ConversationState::default();
            for n in sizes {
                state.push(Message::user(words(n)), &budget);
                let sum: usize = state.messages().iter().map(Message::token_count).sum();
                prop_assert_eq!(state.total_tokens(), sum);
                prop_assert!(state.total_tokens() <= budget.max_tokens);
                prop_assert!(state.len() <= budget.max_messages);
            }
        }

        #[test]
        fn prop_eviction_keeps_suffix(count in 1usize..50, cap in 1usize..10) {
            let budget = MemoryBudget::new(usize::MAX, cap);
            let mut state = ConversationState::default();
            for i in 0..count {
                state.push(Message::user(format!("m{}", i)), &budget);
            }
            let kept: Vec<String> = state.messages().iter().map(|m| m.content().to_string()).collect();
            let expected: Vec<String> = (count.saturating_sub(cap)..count).map(|i| format!("m{}", i)).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
