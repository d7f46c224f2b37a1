//! Conversation/session management core.
//!
//! Organized leaves-first:
//! - `ids`, `types`, `error`: data model and taxonomy
//! - `store`: persistent relational state and schema migration
//! - `sessions`: lifecycle operations and ownership verification
//! - `orchestrator`: the single entry point for a conversational turn

pub mod error;
pub mod ids;
pub mod orchestrator;
pub mod sessions;
pub mod store;
pub mod types;

pub use error::{ChatError, ChatResult};
pub use ids::{MessageId, SessionId, UserId};
pub use orchestrator::ConversationService;
pub use sessions::{DEFAULT_SESSION_TITLE, SessionManager};
pub use store::{ChatStore, LEGACY_SESSION_TITLE, SqliteChatStore, StoreFuture};
pub use types::{EMPTY_PREVIEW, HistoryEntry, Message, SessionSummary};
