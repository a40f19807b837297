//! SQLite 持久化
//!
//! `users` 表存画像（JSON）与 token 总数，`messages` 表按自增 id 保存顺序。
//! 追加与淘汰在同一事务中提交。

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::memory::persistence::{ConversationBackend, StorageError};
use crate::memory::{ConversationState, Message, Role, UserProfile};

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                profile TEXT NOT NULL,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tokens INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".into()))
    }

    fn upsert_user(
        tx: &Transaction<'_>,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<(), StorageError> {
        let profile = serde_json::to_string(&state.profile)?;
        tx.execute(
            "INSERT INTO users (user_id, profile, total_tokens, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                profile = excluded.profile,
                total_tokens = excluded.total_tokens,
                updated_at = excluded.updated_at",
            params![user_id, profile, state.total_tokens() as i64, Utc::now()],
        )?;
        Ok(())
    }

    fn delete_head(tx: &Transaction<'_>, user_id: &str, count: usize) -> Result<(), StorageError> {
        if count == 0 {
            return Ok(());
        }
        tx.execute(
            "DELETE FROM messages WHERE id IN (
                SELECT id FROM messages WHERE user_id = ?1 ORDER BY id ASC LIMIT ?2
            )",
            params![user_id, count as i64],
        )?;
        Ok(())
    }
}

impl ConversationBackend for SqliteBackend {
    fn load(&self, user_id: &str) -> Result<Option<ConversationState>, StorageError> {
        let conn = self.lock()?;
        let profile: Option<String> = conn
            .query_row(
                "SELECT profile FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(profile) = profile else {
            return Ok(None);
        };
        let profile: UserProfile =
            serde_json::from_str(&profile).map_err(|e| StorageError::Corrupt {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })?;

        let mut messages = Vec::new();
        let mut unreadable = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, created_at, tokens FROM messages
                 WHERE user_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;
            for row in rows {
                let (id, role, content, created_at, tokens) = row?;
                match Role::parse(&role) {
                    Some(role) => messages.push(Message::restore(
                        role,
                        content,
                        created_at,
                        tokens.max(0) as usize,
                    )),
                    None => unreadable.push((id, role)),
                }
            }
        }

        // 无法识别的行直接删除，保持表与内存中的顺序一致
        for (id, role) in &unreadable {
            tracing::warn!(user_id, id, role = %role, "Dropping message with unknown role");
            conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        }
        Ok(Some(ConversationState::from_parts(profile, messages)))
    }

    fn save_profile(&self, user_id: &str, state: &ConversationState) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::upsert_user(&tx, user_id, state)?;
        tx.commit()?;
        Ok(())
    }

    fn append_message(
        &self,
        user_id: &str,
        message: &Message,
        evicted: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::upsert_user(&tx, user_id, state)?;
        tx.execute(
            "INSERT INTO messages (user_id, role, content, tokens, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                message.role().as_str(),
                message.content(),
                message.token_count() as i64,
                message.timestamp()
            ],
        )?;
        Self::delete_head(&tx, user_id, evicted)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_oldest(
        &self,
        user_id: &str,
        count: usize,
        state: &ConversationState,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::delete_head(&tx, user_id, count)?;
        Self::upsert_user(&tx, user_id, state)?;
        tx.commit()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBudget;

    fn append(backend: &SqliteBackend, state: &mut ConversationState, budget: &MemoryBudget, text: &str) {
        let msg = Message::user(text);
        let evicted = state.push(msg.clone(), budget);
        backend.append_message("u1", &msg, evicted, state).unwrap();
    }

    #[test]
    fn test_unknown_user_is_none() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.load("nobody").unwrap().is_none());
    }

    #[test]
    fn test_append_and_evict_in_one_transaction() {
        let backend = SqliteBackend::in_memory().unwrap();
        let budget = MemoryBudget::new(100, 2);
        let mut state = ConversationState::default();
        append(&backend, &mut state, &budget, "first message");
        append(&backend, &mut state, &budget, "second");
        append(&backend, &mut state, &budget, "third one here");

        let loaded = backend.load("u1").unwrap().unwrap();
        let contents: Vec<&str> = loaded.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["second", "third one here"]);
        assert_eq!(loaded.total_tokens(), 4);
    }

    #[test]
    fn test_delete_oldest() {
        let backend = SqliteBackend::in_memory().unwrap();
        let budget = MemoryBudget::default();
        let mut state = ConversationState::default();
        append(&backend, &mut state, &budget, "a");
        append(&backend, &mut state, &budget, "b");
        state.pop_oldest();
        backend.delete_oldest("u1", 1, &state).unwrap();

        let loaded = backend.load("u1").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.messages()[0].content(), "b");
    }

    #[test]
    fn test_unknown_role_rows_are_dropped() {
        let backend = SqliteBackend::in_memory().unwrap();
        let budget = MemoryBudget::default();
        let mut state = ConversationState::default();
        append(&backend, &mut state, &budget, "before");
        backend
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO messages (user_id, role, content, tokens, created_at)
                 VALUES ('u1', 'narrator', 'stray line', 2, ?1)",
                params![Utc::now()],
            )
            .unwrap();
        append(&backend, &mut state, &budget, "after");

        let loaded = backend.load("u1").unwrap().unwrap();
        let contents: Vec<&str> = loaded.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["before", "after"]);
        assert_eq!(loaded.total_tokens(), 2);

        let remaining: i64 = backend
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM messages WHERE user_id = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn test_profile_persisted() {
        let backend = SqliteBackend::in_memory().unwrap();
        let mut state = ConversationState::new(UserProfile::new("tr", "Europe/Istanbul"));
        state.profile.preferences.decorations = false;
        backend.save_profile("u1", &state).unwrap();

        let loaded = backend.load("u1").unwrap().unwrap();
        assert_eq!(loaded.profile.language, "tr");
        assert!(!loaded.profile.preferences.decorations);
        assert!(loaded.is_empty());
    }
}
