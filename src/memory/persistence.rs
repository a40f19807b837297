//! 对话持久化
//!
//! [`ConversationBackend`] 定义存储原语：读取完整状态、保存画像、追加消息（连同淘汰）、删除最旧消息。
//! 实现：每用户一个 JSON 文件（[`JsonFileBackend`]）、SQLite（见 `sqlite` 模块）、进程内（[`InMemoryBackend`]）。

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::memory::{ConversationState, Message, UserProfile};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 记录无法解析（JSON 后端已将原文件改名为 `.corrupt`）
    #[error("corrupt record for user {user_id}: {reason}")]
    Corrupt { user_id: String, reason: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// 存储原语（同步；由 ConversationStore 放到阻塞线程池执行，调用方持有该用户的锁）
pub trait ConversationBackend: Send + Sync {
    /// 读取完整状态；不存在返回 None
    fn load(&self, user_id: &str) -> Result<Option<ConversationState>, StorageError>;

    /// 写入画像与聚合字段（首次创建时也会调用）
    fn save_profile(&self, user_id: &str, state: &ConversationState) -> Result<(), StorageError>;

    /// 追加一条消息，并删除最旧的 `evicted` 条；`state` 为追加与淘汰之后的状态
    fn append_message(
        &self,
        user_id: &str,
        message: &Message,
        evicted: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError>;

    /// 删除最旧的 `count` 条消息；`state` 为删除之后的状态
    fn delete_oldest(
        &self,
        user_id: &str,
        count: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError>;

    fn name(&self) -> &str;
}

/// 文件名只保留字母数字、`-`、`_`
pub(crate) fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 每用户一个 JSON 文件：`{dir}/user_{id}.json`；每次写入整体替换（临时文件 + rename）
#[derive(Debug)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir
            .join(format!("user_{}.json", sanitize_user_id(user_id)))
    }

    fn write_state(&self, user_id: &str, state: &ConversationState) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(user_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl ConversationBackend for JsonFileBackend {
    fn load(&self, user_id: &str) -> Result<Option<ConversationState>, StorageError> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<ConversationState>(&data) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                std::fs::rename(&path, &aside)?;
                tracing::warn!(
                    user_id,
                    moved_to = %aside.display(),
                    "Corrupt conversation file moved aside"
                );
                Err(StorageError::Corrupt {
                    user_id: user_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn save_profile(&self, user_id: &str, state: &ConversationState) -> Result<(), StorageError> {
        self.write_state(user_id, state)
    }

    fn append_message(
        &self,
        user_id: &str,
        _message: &Message,
        _evicted: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError> {
        self.write_state(user_id, state)
    }

    fn delete_oldest(
        &self,
        user_id: &str,
        _count: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError> {
        self.write_state(user_id, state)
    }

    fn name(&self) -> &str {
        "json"
    }
}

#[derive(Default)]
struct StoredUser {
    profile: UserProfile,
    messages: VecDeque<Message>,
}

/// 进程内存储：按原语增量更新；可注入读写故障（测试用）
#[derive(Default)]
pub struct InMemoryBackend {
    users: Mutex<HashMap<String, StoredUser>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 已持久化的消息条数
    pub fn stored_len(&self, user_id: &str) -> usize {
        self.users
            .lock()
            .map(|u| u.get(user_id).map_or(0, |s| s.messages.len()))
            .unwrap_or(0)
    }

    fn with_users<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, StoredUser>) -> T,
    ) -> Result<T, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write failure injected".into()));
        }
        let mut users = self
            .users
            .lock()
            .map_err(|_| StorageError::Unavailable("lock poisoned".into()))?;
        Ok(f(&mut users))
    }
}

impl ConversationBackend for InMemoryBackend {
    fn load(&self, user_id: &str) -> Result<Option<ConversationState>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("read failure injected".into()));
        }
        let users = self
            .users
            .lock()
            .map_err(|_| StorageError::Unavailable("lock poisoned".into()))?;
        Ok(users.get(user_id).map(|u| {
            ConversationState::from_parts(u.profile.clone(), u.messages.iter().cloned())
        }))
    }

    fn save_profile(&self, user_id: &str, state: &ConversationState) -> Result<(), StorageError> {
        self.with_users(|users| {
            users.entry(user_id.to_string()).or_default().profile = state.profile.clone();
        })
    }

    fn append_message(
        &self,
        user_id: &str,
        message: &Message,
        evicted: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError> {
        self.with_users(|users| {
            let user = users.entry(user_id.to_string()).or_default();
            user.profile = state.profile.clone();
            user.messages.push_back(message.clone());
            for _ in 0..evicted {
                user.messages.pop_front();
            }
        })
    }

    fn delete_oldest(
        &self,
        user_id: &str,
        count: usize,
        _state: &ConversationState,
    ) -> Result<(), StorageError> {
        self.with_users(|users| {
            if let Some(user) = users.get_mut(user_id) {
                let count = count.min(user.messages.len());
                user.messages.drain(..count);
            }
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
