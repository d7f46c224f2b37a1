//! Session lifecycle operations and ownership verification.
//!
//! Every other part of the system that touches session-scoped data gates on
//! [`SessionManager::verify_ownership`] first and treats a negative answer
//! as an authorization failure, not a not-found.

use std::sync::Arc;

use tracing::{debug, info};

use super::error::{ChatError, ChatResult};
use super::ids::{SessionId, UserId};
use super::store::ChatStore;
use super::types::{EMPTY_PREVIEW, HistoryEntry, SessionSummary, truncate_with_ellipsis};

/// Title given to sessions created without an explicit one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Maximum characters kept when deriving a title from the first prompt.
const AUTO_TITLE_LEN: usize = 50;

/// Session lifecycle and ownership layer over the store.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ChatStore>,
}

impl SessionManager {
    /// Create a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Most recently updated session for `owner`, creating a default-titled
    /// one when the owner has none. Used when a conversation endpoint is
    /// entered without an explicit session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn resolve_or_create_default(&self, owner: &UserId) -> ChatResult<SessionId> {
        if let Some(id) = self.store.latest_session(owner).await? {
            return Ok(id);
        }
        let id = self.create(owner, None).await?.id;
        info!(%id, %owner, "created default session");
        Ok(id)
    }

    /// True iff the session exists and `owner` owns it.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn verify_ownership(&self, id: SessionId, owner: &UserId) -> ChatResult<bool> {
        Ok(self
            .store
            .session_owner(id)
            .await?
            .is_some_and(|session_owner| &session_owner == owner))
    }

    /// Create a session, defaulting the title to [`DEFAULT_SESSION_TITLE`].
    ///
    /// Returns the full summary so callers can render the new session
    /// without a follow-up listing.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn create(
        &self,
        owner: &UserId,
        title: Option<&str>,
    ) -> ChatResult<SessionSummary> {
        let title = title.unwrap_or(DEFAULT_SESSION_TITLE);
        let now_ms = now_ms();
        let id = self.store.create_session(owner, title, now_ms).await?;
        debug!(%id, "created session");
        Ok(SessionSummary {
            id,
            title: title.to_string(),
            created_at: now_ms,
            updated_at: now_ms,
            message_count: 0,
            last_message: EMPTY_PREVIEW.to_string(),
        })
    }

    /// Rename a session.
    ///
    /// # Errors
    /// Returns [`ChatError::Validation`] when the new title is empty after
    /// trimming, or a storage error.
    pub async fn rename(&self, id: SessionId, new_title: &str) -> ChatResult<()> {
        let trimmed = new_title.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation("title must not be empty".to_string()));
        }
        self.store.rename_session(id, trimmed).await
    }

    /// Advance a session's `updated_at` to now.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn touch(&self, id: SessionId) -> ChatResult<()> {
        self.store.touch_session(id, now_ms()).await
    }

    /// Delete a session and its messages.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn delete(&self, id: SessionId) -> ChatResult<()> {
        self.store.delete_session(id).await?;
        info!(%id, "deleted session");
        Ok(())
    }

    /// All sessions for `owner` with derived previews, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list(&self, owner: &UserId) -> ChatResult<Vec<SessionSummary>> {
        self.store.list_sessions(owner).await
    }

    /// Full history of a session, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn history(&self, id: SessionId) -> ChatResult<Vec<HistoryEntry>> {
        let messages = self.store.list_messages(id).await?;
        Ok(messages.into_iter().map(HistoryEntry::from).collect())
    }

    /// Remove all messages of a session, keeping the session itself.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn clear(&self, id: SessionId) -> ChatResult<()> {
        self.store.clear_messages(id).await
    }

    /// Derive the session title from its first prompt.
    ///
    /// Fires only on the message that brings the count from 0 to 1; later
    /// messages never alter the title automatically. The title is the prompt
    /// truncated to 50 characters with an ellipsis when cut.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn auto_title_if_first_message(
        &self,
        id: SessionId,
        prompt: &str,
    ) -> ChatResult<()> {
        if self.store.count_messages(id).await? != 1 {
            return Ok(());
        }
        let title = truncate_with_ellipsis(prompt.trim(), AUTO_TITLE_LEN);
        self.store.rename_session(id, &title).await?;
        debug!(%id, "auto-titled session from first message");
        Ok(())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::chat::store::SqliteChatStore;

    async fn manager() -> SessionManager {
        let store = SqliteChatStore::open_in_memory().await.unwrap();
        SessionManager::new(Arc::new(store))
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[tokio::test]
    async fn test_resolve_creates_default_once() {
        let manager = manager().await;
        let owner = alice();

        let first = manager.resolve_or_create_default(&owner).await.unwrap();
        let second = manager.resolve_or_create_default(&owner).await.unwrap();
        assert_eq!(first, second);

        let sessions = manager.list(&owner).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, DEFAULT_SESSION_TITLE);
    }

    #[tokio::test]
    async fn test_create_returns_renderable_summary() {
        let manager = manager().await;
        let owner = alice();

        let summary = manager.create(&owner, Some("Trip planning")).await.unwrap();
        assert_eq!(summary.title, "Trip planning");
        assert_eq!(summary.message_count, 0);
        assert_eq!(summary.last_message, EMPTY_PREVIEW);
        assert_eq!(summary.created_at, summary.updated_at);

        // The returned summary matches what a subsequent listing shows.
        let listed = manager.list(&owner).await.unwrap();
        assert_eq!(listed[0].id, summary.id);
        assert_eq!(listed[0].title, summary.title);
        assert_eq!(listed[0].updated_at, summary.updated_at);
    }

    #[tokio::test]
    async fn test_verify_ownership_cases() {
        let manager = manager().await;
        let owner = alice();
        let id = manager.create(&owner, None).await.unwrap().id;

        assert!(manager.verify_ownership(id, &owner).await.unwrap());
        assert!(!manager.verify_ownership(id, &UserId::from("bob")).await.unwrap());
        assert!(
            !manager
                .verify_ownership(SessionId::new(), &owner)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_rename_rejects_blank_title() {
        let manager = manager().await;
        let id = manager.create(&alice(), None).await.unwrap().id;

        let err = manager.rename(id, "   ").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        manager.rename(id, "  Trip planning  ").await.unwrap();
        let sessions = manager.list(&alice()).await.unwrap();
        assert_eq!(sessions[0].title, "Trip planning");
    }

    #[tokio::test]
    async fn test_auto_title_short_prompt_kept_whole() {
        let manager = manager().await;
        let owner = alice();
        let id = manager.create(&owner, None).await.unwrap().id;

        let prompt = "Hello there, how are you today friend";
        manager
            .store
            .append_message(id, &owner, prompt, "fine", 1_000)
            .await
            .unwrap();
        manager.auto_title_if_first_message(id, prompt).await.unwrap();

        let sessions = manager.list(&owner).await.unwrap();
        assert_eq!(sessions[0].title, prompt);
    }

    #[tokio::test]
    async fn test_auto_title_long_prompt_truncated_at_50() {
        let manager = manager().await;
        let owner = alice();
        let id = manager.create(&owner, None).await.unwrap().id;

        let prompt = "q".repeat(60);
        manager
            .store
            .append_message(id, &owner, &prompt, "fine", 1_000)
            .await
            .unwrap();
        manager.auto_title_if_first_message(id, &prompt).await.unwrap();

        let sessions = manager.list(&owner).await.unwrap();
        let expected = format!("{}...", "q".repeat(50));
        assert_eq!(sessions[0].title, expected);
    }

    #[tokio::test]
    async fn test_auto_title_fires_exactly_once() {
        let manager = manager().await;
        let owner = alice();
        let id = manager.create(&owner, None).await.unwrap().id;

        manager
            .store
            .append_message(id, &owner, "first prompt", "r", 1_000)
            .await
            .unwrap();
        manager
            .auto_title_if_first_message(id, "first prompt")
            .await
            .unwrap();

        manager
            .store
            .append_message(id, &owner, "second prompt", "r", 2_000)
            .await
            .unwrap();
        manager
            .auto_title_if_first_message(id, "second prompt")
            .await
            .unwrap();

        let sessions = manager.list(&owner).await.unwrap();
        assert_eq!(sessions[0].title, "first prompt");
    }

    #[tokio::test]
    async fn test_delete_then_verify_is_false_for_everyone() {
        let manager = manager().await;
        let owner = alice();
        let id = manager.create(&owner, None).await.unwrap().id;
        manager
            .store
            .append_message(id, &owner, "hi", "r", 1_000)
            .await
            .unwrap();

        manager.delete(id).await.unwrap();
        assert!(manager.history(id).await.unwrap().is_empty());
        assert!(!manager.verify_ownership(id, &owner).await.unwrap());
        assert!(!manager.verify_ownership(id, &UserId::from("bob")).await.unwrap());
    }
}
