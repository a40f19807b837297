//! 记忆层：每用户对话历史、画像、token 预算与持久化

pub mod conversation;
pub mod persistence;
pub mod profile;
pub mod sqlite;
pub mod store;
pub mod token_budget;

pub use conversation::{ConversationState, Message, Role};
pub use persistence::{ConversationBackend, InMemoryBackend, JsonFileBackend, StorageError};
pub use profile::{
    PersonalityProfile, PersonalityTraits, ResolvedPersonality, UserPreferences, UserProfile,
};
pub use sqlite::SqliteBackend;
pub use store::ConversationStore;
pub use token_budget::{MemoryBudget, TokenEstimator};
