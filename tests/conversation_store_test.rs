//! 对话记忆集成测试：预算淘汰、顺序、跨重启持久化与损坏文件恢复

use std::path::Path;

use scout::config::MemorySection;
use scout::memory::{ConversationStore, JsonFileBackend, MemoryBudget, Role};

fn long_message(i: usize) -> String {
    format!("m{} {}", i, "w ".repeat(999))
}

fn section(backend: &str, dir: &Path) -> MemorySection {
    MemorySection {
        backend: backend.to_string(),
        dir: dir.to_path_buf(),
        sqlite_path: dir.join("scout.db"),
        ..MemorySection::default()
    }
}

#[tokio::test]
async fn test_budget_holds_under_sustained_appends() {
    let budget = MemoryBudget::new(1_048_576, 1_000_000);
    let store = ConversationStore::in_memory(budget);

    let mut evicted = 0;
    for i in 0..1100 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        evicted += store.append("heavy", role, &long_message(i)).await;
    }

    let state = store.get("heavy").await;
    assert!(state.total_tokens() <= 1_048_576);
    assert!(state.len() < 1_000_000);
    assert_eq!(state.len() + evicted, 1100);
    assert_eq!(state.len(), 1048);

    let first = state.messages().front().unwrap();
    assert_eq!(first.content().split_whitespace().next(), Some("m52"));
    let context = store.recent_context("heavy", state.len()).await;
    assert!(!context.contains("m0 "));
    assert!(context.contains("m1099 "));
}

#[tokio::test]
async fn test_message_cap_evicts_fifo() {
    let store = ConversationStore::in_memory(MemoryBudget::new(1_000_000, 3));
    for text in ["one", "two", "three", "four", "five"] {
        store.append("u", Role::User, text).await;
    }
    let contents: Vec<String> = store
        .recent_messages("u", 10)
        .await
        .iter()
        .map(|m| m.content().to_string())
        .collect();
    assert_eq!(contents, vec!["three", "four", "five"]);
}

#[tokio::test]
async fn test_users_are_isolated() {
    let store = ConversationStore::in_memory(MemoryBudget::default());
    store.append("alice", Role::User, "hello from alice").await;
    store.append("bob", Role::User, "hello from bob").await;
    assert_eq!(store.get("alice").await.len(), 1);
    assert_eq!(
        store.recent_context("bob", 10).await,
        "User: hello from bob"
    );
}

async fn assert_survives_restart(backend: &str) {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = ConversationStore::from_config(&section(backend, dir.path())).unwrap();
        store.append("alice", Role::User, "what is rust").await;
        store.append("alice", Role::Assistant, "a systems language").await;
        store
            .update_profile("alice", |p| p.preferences.timezone = "Europe/Istanbul".into())
            .await;
    }

    let store = ConversationStore::from_config(&section(backend, dir.path())).unwrap();
    let state = store.get("alice").await;
    assert_eq!(state.len(), 2);
    assert_eq!(state.messages()[0].content(), "what is rust");
    assert_eq!(state.messages()[1].role(), Role::Assistant);
    assert_eq!(state.total_tokens(), 6);
    assert_eq!(state.profile.preferences.timezone, "Europe/Istanbul");
}

#[tokio::test]
async fn test_json_backend_survives_restart() {
    assert_survives_restart("json").await;
}

#[tokio::test]
async fn test_sqlite_backend_survives_restart() {
    assert_survives_restart("sqlite").await;
}

#[tokio::test]
async fn test_sqlite_trim_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = ConversationStore::from_config(&section("sqlite", dir.path())).unwrap();
        store.append("u", Role::User, "first").await;
        store.append("u", Role::User, "second").await;
        store.trim_one("u").await;
    }
    let store = ConversationStore::from_config(&section("sqlite", dir.path())).unwrap();
    let state = store.get("u").await;
    assert_eq!(state.len(), 1);
    assert_eq!(state.messages()[0].content(), "second");
}

#[tokio::test]
async fn test_corrupt_json_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = JsonFileBackend::new(dir.path()).path_for("alice");
    std::fs::write(&path, "{ not json").unwrap();

    let store = ConversationStore::from_config(&section("json", dir.path())).unwrap();
    let state = store.get("alice").await;
    assert!(state.is_empty());
    assert_eq!(state.profile.language, "en");
    assert!(path.with_extension("json.corrupt").exists());

    store.append("alice", Role::User, "fresh start").await;
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("fresh start"));
}
