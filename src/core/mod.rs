//! 核心层：错误与恢复、生成调用守卫、用户可见错误文案、有界重试、深度搜索状态

pub mod error;
pub mod generation;
pub mod messages;
pub mod recovery;
pub mod retry;
pub mod state;

pub use error::{ChatError, RecoveryAction};
pub use generation::GenerationGuard;
pub use messages::ErrorKind;
pub use recovery::RecoveryEngine;
pub use retry::RetryController;
pub use state::{SearchPhase, SearchSession};
