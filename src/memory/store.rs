//! 每用户对话记忆存储
//!
//! 在 [`ConversationBackend`] 之上加一层可选的 moka 缓存（cache-aside）：未命中时从后端加载并放入缓存，
//! 每个用户的状态由一把 `tokio::sync::Mutex` 保护。后端调用在 `spawn_blocking` 中执行，
//! 同一用户的写入按加锁顺序提交。读失败回退为默认状态，写失败只记日志。

use std::sync::Arc;

use moka::future::Cache;
use tokio::sync::Mutex;

use crate::config::MemorySection;
use crate::core::ChatError;
use crate::memory::persistence::{ConversationBackend, InMemoryBackend, JsonFileBackend, StorageError};
use crate::memory::sqlite::SqliteBackend;
use crate::memory::{ConversationState, MemoryBudget, Message, Role, UserProfile};

type Entry = Arc<Mutex<ConversationState>>;

pub struct ConversationStore {
    backend: Arc<dyn ConversationBackend>,
    budget: MemoryBudget,
    defaults: UserProfile,
    cache: Option<Cache<String, Entry>>,
}

impl ConversationStore {
    /// `cache_capacity` 为 0 时不缓存，每次操作都从后端读取
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        budget: MemoryBudget,
        defaults: UserProfile,
        cache_capacity: u64,
    ) -> Self {
        let cache = (cache_capacity > 0).then(|| Cache::new(cache_capacity));
        Self {
            backend,
            budget,
            defaults,
            cache,
        }
    }

    /// 进程内存储，默认画像
    pub fn in_memory(budget: MemoryBudget) -> Self {
        Self::new(
            Arc::new(InMemoryBackend::new()),
            budget,
            UserProfile::default(),
            1024,
        )
    }

    /// 按 [memory] 配置选择后端
    pub fn from_config(cfg: &MemorySection) -> Result<Self, StorageError> {
        let backend: Arc<dyn ConversationBackend> = match cfg.backend.to_lowercase().as_str() {
            "sqlite" => Arc::new(SqliteBackend::open(&cfg.sqlite_path)?),
            "memory" => Arc::new(InMemoryBackend::new()),
            "json" => Arc::new(JsonFileBackend::new(&cfg.dir)),
            other => {
                tracing::warn!(backend = other, "Unknown memory backend, using json");
                Arc::new(JsonFileBackend::new(&cfg.dir))
            }
        };
        tracing::info!(
            backend = backend.name(),
            max_tokens = cfg.max_tokens,
            max_messages = cfg.max_messages,
            "Conversation store ready"
        );
        Ok(Self::new(
            backend,
            cfg.budget(),
            UserProfile::new(&cfg.default_language, &cfg.default_timezone),
            cfg.cache_capacity,
        ))
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    /// 在阻塞线程池中执行后端调用
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&dyn ConversationBackend) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|e| StorageError::Unavailable(format!("storage task failed: {}", e)))?
    }

    async fn entry(&self, user_id: &str) -> Entry {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_with(user_id.to_string(), async {
                        Arc::new(Mutex::new(self.load_or_default(user_id).await))
                    })
                    .await
            }
            None => Arc::new(Mutex::new(self.load_or_default(user_id).await)),
        }
    }

    /// 读取并按当前预算裁剪；记录在更大的预算下写入时，超出部分在这里淘汰并持久化
    async fn load_or_default(&self, user_id: &str) -> ConversationState {
        let key = user_id.to_string();
        match self.blocking(move |b| b.load(&key)).await {
            Ok(Some(mut state)) => {
                if state.recompute() {
                    tracing::warn!(user_id, "Stored total_tokens drifted, recomputed");
                }
                let mut evicted = 0;
                while state.trim_one(&self.budget).is_some() {
                    evicted += 1;
                }
                if evicted > 0 {
                    tracing::info!(
                        user_id,
                        evicted,
                        remaining = state.len(),
                        "Stored conversation exceeded budget, trimmed on load"
                    );
                    self.persist_delete(user_id, evicted, &state).await;
                }
                state
            }
            Ok(None) => {
                let state = ConversationState::new(self.defaults.clone());
                self.persist_profile(user_id, &state).await;
                state
            }
            Err(e) => {
                degraded(user_id, "load", e);
                let state = ConversationState::new(self.defaults.clone());
                self.persist_profile(user_id, &state).await;
                state
            }
        }
    }

    async fn persist_profile(&self, user_id: &str, state: &ConversationState) {
        let key = user_id.to_string();
        let snapshot = state.clone();
        if let Err(e) = self.blocking(move |b| b.save_profile(&key, &snapshot)).await {
            degraded(user_id, "save_profile", e);
        }
    }

    async fn persist_delete(&self, user_id: &str, count: usize, state: &ConversationState) {
        let key = user_id.to_string();
        let snapshot = state.clone();
        if let Err(e) = self
            .blocking(move |b| b.delete_oldest(&key, count, &snapshot))
            .await
        {
            degraded(user_id, "delete_oldest", e);
        }
    }

    /// 当前状态快照（不存在则创建并持久化默认状态）
    pub async fn get(&self, user_id: &str) -> ConversationState {
        self.entry(user_id).await.lock().await.clone()
    }

    /// 追加消息并按预算淘汰；返回淘汰条数
    pub async fn append(&self, user_id: &str, role: Role, content: &str) -> usize {
        let entry = self.entry(user_id).await;
        let mut state = entry.lock().await;
        let message = Message::new(role, content);
        let evicted = state.push(message.clone(), &self.budget);
        tracing::debug!(
            user_id,
            role = role.as_str(),
            tokens = message.token_count(),
            evicted,
            total_tokens = state.total_tokens(),
            "Message appended"
        );

        let key = user_id.to_string();
        let snapshot = state.clone();
        if let Err(e) = self
            .blocking(move |b| b.append_message(&key, &message, evicted, &snapshot))
            .await
        {
            degraded(user_id, "append_message", e);
        }
        evicted
    }

    /// 最近 n 条，格式化为上下文文本
    pub async fn recent_context(&self, user_id: &str, n: usize) -> String {
        self.entry(user_id).await.lock().await.format_context(n)
    }

    pub async fn recent_messages(&self, user_id: &str, n: usize) -> Vec<Message> {
        let entry = self.entry(user_id).await;
        let state = entry.lock().await;
        state.recent(n).cloned().collect()
    }

    /// 无条件淘汰最旧一条（模型报告上下文超限时使用）；历史为空时为 no-op
    pub async fn trim_one(&self, user_id: &str) -> Option<Message> {
        let entry = self.entry(user_id).await;
        let mut state = entry.lock().await;
        let removed = state.pop_oldest()?;
        tracing::info!(
            user_id,
            remaining = state.len(),
            total_tokens = state.total_tokens(),
            "Trimmed oldest message"
        );
        self.persist_delete(user_id, 1, &state).await;
        Some(removed)
    }

    pub async fn profile(&self, user_id: &str) -> UserProfile {
        self.entry(user_id).await.lock().await.profile.clone()
    }

    /// 修改画像并持久化
    pub async fn update_profile<F>(&self, user_id: &str, f: F) -> UserProfile
    where
        F: FnOnce(&mut UserProfile),
    {
        let entry = self.entry(user_id).await;
        let mut state = entry.lock().await;
        f(&mut state.profile);
        self.persist_profile(user_id, &state).await;
        state.profile.clone()
    }

    /// 丢弃缓存项，下次访问从后端重新加载
    pub async fn invalidate(&self, user_id: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(user_id).await;
        }
    }
}

/// 持久化失败不影响内存状态，只记日志
fn degraded(user_id: &str, operation: &str, e: StorageError) {
    let err = ChatError::from(e);
    tracing::warn!(
        user_id,
        operation,
        kind = err.kind().as_str(),
        error = %err,
        "Storage degraded, keeping in-memory state"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(backend: Arc<InMemoryBackend>, budget: MemoryBudget, cache: u64) -> ConversationStore {
        ConversationStore::new(backend, budget, UserProfile::new("en", "UTC"), cache)
    }

    #[tokio::test]
    async fn test_get_creates_default() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(backend.clone(), MemoryBudget::default(), 16);
        let state = store.get("u").await;
        assert!(state.is_empty());
        assert_eq!(state.profile.language, "en");
        assert!(backend.load("u").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_and_context() {
        let store = ConversationStore::in_memory(MemoryBudget::default());
        store.append("u", Role::User, "hello").await;
        store.append("u", Role::Assistant, "hi there").await;
        assert_eq!(
            store.recent_context("u", 10).await,
            "User: hello\nAssistant: hi there"
        );
        assert_eq!(store.recent_messages("u", 1).await[0].content(), "hi there");
    }

    #[tokio::test]
    async fn test_trim_one_forces_eviction() {
        let store = ConversationStore::in_memory(MemoryBudget::default());
        assert!(store.trim_one("u").await.is_none());
        store.append("u", Role::User, "one").await;
        store.append("u", Role::User, "two").await;
        let removed = store.trim_one("u").await.unwrap();
        assert_eq!(removed.content(), "one");
        assert_eq!(store.get("u").await.len(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_falls_back_to_default() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_fail_reads(true);
        let store = store_with(backend, MemoryBudget::default(), 0);
        assert!(store.get("u").await.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(backend.clone(), MemoryBudget::default(), 16);
        store.get("u").await;
        backend.set_fail_writes(true);
        store.append("u", Role::User, "kept in memory").await;
        assert_eq!(store.get("u").await.len(), 1);
        assert_eq!(backend.stored_len("u"), 0);
    }

    #[tokio::test]
    async fn test_invalidate_reloads_from_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(backend.clone(), MemoryBudget::default(), 16);
        store.append("u", Role::User, "persisted").await;
        backend.set_fail_writes(true);
        store.append("u", Role::User, "lost").await;
        assert_eq!(store.get("u").await.len(), 2);

        store.invalidate("u").await;
        backend.set_fail_writes(false);
        let reloaded = store.get("u").await;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.messages()[0].content(), "persisted");
    }

    #[tokio::test]
    async fn test_load_trims_to_current_budget() {
        let backend = Arc::new(InMemoryBackend::new());
        {
            let store = store_with(backend.clone(), MemoryBudget::new(1000, 100), 16);
            for i in 0..10 {
                store.append("u", Role::User, &format!("message {}", i)).await;
            }
        }
        assert_eq!(backend.stored_len("u"), 10);

        let store = store_with(backend.clone(), MemoryBudget::new(1000, 3), 16);
        let state = store.get("u").await;
        assert_eq!(state.len(), 3);
        assert_eq!(state.total_tokens(), 6);
        assert_eq!(state.messages()[0].content(), "message 7");
        assert!(!store.recent_context("u", 10).await.contains("message 6"));
        assert_eq!(backend.stored_len("u"), 3);
    }

    #[tokio::test]
    async fn test_update_profile_persists() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(backend.clone(), MemoryBudget::default(), 0);
        store
            .update_profile("u", |p| p.preferences.custom_language = Some("fr".into()))
            .await;
        assert_eq!(store.profile("u").await.effective_language(), "fr");
    }
}
