//! SQLite-backed persistent state for users, sessions, and messages.
//!
//! The store owns the schema and the legacy migration: deployments that
//! predate sessions hold messages without a `session_id` column, and on
//! first startup each affected user receives exactly one synthetic session
//! adopting their orphaned messages. The migration runs during store
//! construction, before any other operation is reachable, and is safe to
//! run on every startup.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::error::{ChatError, ChatResult};
use super::ids::{MessageId, SessionId, UserId};
use super::types::{Message, SessionSummary, build_preview};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Title given to the synthetic session adopting pre-session messages.
pub const LEGACY_SESSION_TITLE: &str = "Previous Conversation";

/// Persistent relational state for the chat subsystem.
///
/// Every implementation must uphold the ownership invariant: a message's
/// denormalized owner always equals its parent session's owner. The SQLite
/// implementation derives the stored owner from the session row inside
/// `append_message` instead of trusting the caller.
pub trait ChatStore: Send + Sync {
    /// Create a session owned by `owner`.
    fn create_session(
        &self,
        owner: &UserId,
        title: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, ChatResult<SessionId>>;

    /// Owner of a session, or `None` if the session does not exist.
    fn session_owner(&self, id: SessionId) -> StoreFuture<'_, ChatResult<Option<UserId>>>;

    /// Most recently updated session for `owner`, if any.
    fn latest_session(&self, owner: &UserId) -> StoreFuture<'_, ChatResult<Option<SessionId>>>;

    /// All sessions for `owner`, newest-updated first, with derived previews.
    fn list_sessions(&self, owner: &UserId) -> StoreFuture<'_, ChatResult<Vec<SessionSummary>>>;

    /// Replace a session's title.
    fn rename_session(&self, id: SessionId, title: &str) -> StoreFuture<'_, ChatResult<()>>;

    /// Advance a session's `updated_at`. Never moves it backwards.
    fn touch_session(&self, id: SessionId, now_ms: i64) -> StoreFuture<'_, ChatResult<()>>;

    /// Delete a session and all of its messages.
    fn delete_session(&self, id: SessionId) -> StoreFuture<'_, ChatResult<()>>;

    /// Append one prompt/reply exchange to a session.
    ///
    /// The stored owner is read from the session row; an absent session or
    /// a caller that is not the owner yields [`ChatError::Authorization`].
    fn append_message(
        &self,
        session_id: SessionId,
        owner: &UserId,
        prompt: &str,
        reply: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, ChatResult<MessageId>>;

    /// Number of messages recorded for a session.
    fn count_messages(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<u64>>;

    /// All messages of a session, oldest first.
    fn list_messages(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<Vec<Message>>>;

    /// Remove all messages of a session, keeping the session itself.
    fn clear_messages(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<()>>;

    /// Adopt pre-session messages into one synthetic session per owner.
    ///
    /// Idempotent: a fully migrated store is a no-op.
    fn migrate_legacy_schema(&self) -> StoreFuture<'_, ChatResult<()>>;
}

/// `SQLite` implementation of [`ChatStore`].
pub struct SqliteChatStore {
    conn: Connection,
}

impl SqliteChatStore {
    /// Open a database file and initialize the store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &str) -> ChatResult<Self> {
        let conn = Connection::open(path).await?;
        Self::new(conn).await
    }

    /// Open an in-memory database, used by tests and ephemeral deployments.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(conn).await
    }

    /// Initialize the store over an existing connection.
    ///
    /// Runs table creation, then the legacy migration, then index creation.
    /// The `(session_id, ...)` index must not be created before the
    /// migration has guaranteed the column exists.
    ///
    /// # Errors
    /// Returns an error if schema setup or migration fails.
    pub async fn new(conn: Connection) -> ChatResult<Self> {
        let store = Self { conn };
        store.create_tables().await?;
        store.migrate_legacy_schema().await?;
        store.create_indexes().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> ChatResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS users (
                        id TEXT PRIMARY KEY,
                        username TEXT UNIQUE,
                        email TEXT UNIQUE,
                        password_hash TEXT,
                        created_at INTEGER
                    );
                    CREATE TABLE IF NOT EXISTS sessions (
                        id TEXT PRIMARY KEY,
                        owner_user_id TEXT NOT NULL,
                        title TEXT NOT NULL DEFAULT '',
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS messages (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        session_id TEXT,
                        owner_user_id TEXT NOT NULL,
                        prompt TEXT NOT NULL,
                        reply TEXT NOT NULL,
                        created_at INTEGER NOT NULL
                    );",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn create_indexes(&self) -> ChatResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE INDEX IF NOT EXISTS idx_sessions_owner_updated
                        ON sessions (owner_user_id, updated_at DESC);
                    CREATE INDEX IF NOT EXISTS idx_messages_session_created
                        ON messages (session_id, created_at);
                    CREATE INDEX IF NOT EXISTS idx_messages_owner_created
                        ON messages (owner_user_id, created_at);",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Parse a session id column, surfacing corruption as a storage error.
fn parse_session_id(raw: &str) -> ChatResult<SessionId> {
    SessionId::from_str(raw)
        .map_err(|err| ChatError::Storage(format!("invalid session id in database: {err}")))
}

impl ChatStore for SqliteChatStore {
    fn create_session(
        &self,
        owner: &UserId,
        title: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, ChatResult<SessionId>> {
        let owner = owner.to_string();
        let title = title.to_string();
        Box::pin(async move {
            let id = SessionId::new();
            let id_str = id.to_string();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO sessions (id, owner_user_id, title, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        rusqlite::params![id_str, owner, title, now_ms],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(id)
        })
    }

    fn session_owner(&self, id: SessionId) -> StoreFuture<'_, ChatResult<Option<UserId>>> {
        Box::pin(async move {
            let id_str = id.to_string();
            let owner = self
                .conn
                .call(move |conn| {
                    let owner: Option<String> = conn
                        .query_row(
                            "SELECT owner_user_id FROM sessions WHERE id = ?1",
                            rusqlite::params![id_str],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(owner)
                })
                .await?;
            Ok(owner.map(UserId::from))
        })
    }

    fn latest_session(&self, owner: &UserId) -> StoreFuture<'_, ChatResult<Option<SessionId>>> {
        let owner = owner.to_string();
        Box::pin(async move {
            let raw = self
                .conn
                .call(move |conn| {
                    let id: Option<String> = conn
                        .query_row(
                            "SELECT id FROM sessions
                             WHERE owner_user_id = ?1
                             ORDER BY updated_at DESC
                             LIMIT 1",
                            rusqlite::params![owner],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(id)
                })
                .await?;
            raw.map(|id| parse_session_id(&id)).transpose()
        })
    }

    fn list_sessions(&self, owner: &UserId) -> StoreFuture<'_, ChatResult<Vec<SessionSummary>>> {
        let owner = owner.to_string();
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT s.id, s.title, s.created_at, s.updated_at,
                                (SELECT COUNT(*) FROM messages m
                                  WHERE m.session_id = s.id),
                                (SELECT m.prompt FROM messages m
                                  WHERE m.session_id = s.id
                                  ORDER BY m.created_at DESC, m.id DESC LIMIT 1),
                                (SELECT m.reply FROM messages m
                                  WHERE m.session_id = s.id
                                  ORDER BY m.created_at DESC, m.id DESC LIMIT 1)
                         FROM sessions s
                         WHERE s.owner_user_id = ?1
                         ORDER BY s.updated_at DESC",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![owner], |row| {
                            let id: String = row.get(0)?;
                            let title: String = row.get(1)?;
                            let created_at: i64 = row.get(2)?;
                            let updated_at: i64 = row.get(3)?;
                            let count: i64 = row.get(4)?;
                            let prompt: Option<String> = row.get(5)?;
                            let reply: Option<String> = row.get(6)?;
                            Ok((id, title, created_at, updated_at, count, prompt, reply))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let mut summaries = Vec::with_capacity(rows.len());
            for (id, title, created_at, updated_at, count, prompt, reply) in rows {
                let last_exchange = match (&prompt, &reply) {
                    (Some(p), Some(r)) => Some((p.as_str(), r.as_str())),
                    (Some(p), None) => Some((p.as_str(), "")),
                    _ => None,
                };
                summaries.push(SessionSummary {
                    id: parse_session_id(&id)?,
                    title,
                    created_at,
                    updated_at,
                    message_count: u64::try_from(count)
                        .map_err(|_| ChatError::Storage("negative message count".to_string()))?,
                    last_message: build_preview(last_exchange),
                });
            }
            Ok(summaries)
        })
    }

    fn rename_session(&self, id: SessionId, title: &str) -> StoreFuture<'_, ChatResult<()>> {
        let title = title.to_string();
        Box::pin(async move {
            let id_str = id.to_string();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "UPDATE sessions SET title = ?1 WHERE id = ?2",
                        rusqlite::params![title, id_str],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn touch_session(&self, id: SessionId, now_ms: i64) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let id_str = id.to_string();
            self.conn
                .call(move |conn| {
                    // MAX keeps updated_at monotone under racing turns.
                    conn.execute(
                        "UPDATE sessions SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
                        rusqlite::params![now_ms, id_str],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn delete_session(&self, id: SessionId) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let id_str = id.to_string();
            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        "DELETE FROM messages WHERE session_id = ?1",
                        rusqlite::params![id_str],
                    )?;
                    tx.execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id_str])?;
                    tx.commit()?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn append_message(
        &self,
        session_id: SessionId,
        owner: &UserId,
        prompt: &str,
        reply: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, ChatResult<MessageId>> {
        let owner = owner.to_string();
        let prompt = prompt.to_string();
        let reply = reply.to_string();
        Box::pin(async move {
            let id_str = session_id.to_string();
            let inserted = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let session_owner: Option<String> = tx
                        .query_row(
                            "SELECT owner_user_id FROM sessions WHERE id = ?1",
                            rusqlite::params![id_str],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let Some(session_owner) = session_owner else {
                        return Ok(None);
                    };
                    if session_owner != owner {
                        return Ok(None);
                    }
                    // The stored owner comes from the session row, never
                    // from the caller.
                    tx.execute(
                        "INSERT INTO messages
                            (session_id, owner_user_id, prompt, reply, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![id_str, session_owner, prompt, reply, now_ms],
                    )?;
                    let rowid = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(Some(rowid))
                })
                .await?;
            inserted.map(MessageId).ok_or(ChatError::Authorization)
        })
    }

    fn count_messages(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<u64>> {
        Box::pin(async move {
            let id_str = session_id.to_string();
            let count = self
                .conn
                .call(move |conn| {
                    let count: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                        rusqlite::params![id_str],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;
            u64::try_from(count)
                .map_err(|_| ChatError::Storage("negative message count".to_string()))
        })
    }

    fn list_messages(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<Vec<Message>>> {
        Box::pin(async move {
            let id_str = session_id.to_string();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, owner_user_id, prompt, reply, created_at
                         FROM messages
                         WHERE session_id = ?1
                         ORDER BY created_at ASC, id ASC",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![id_str], |row| {
                            let id: i64 = row.get(0)?;
                            let owner: String = row.get(1)?;
                            let prompt: String = row.get(2)?;
                            let reply: String = row.get(3)?;
                            let created_at: i64 = row.get(4)?;
                            Ok((id, owner, prompt, reply, created_at))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            Ok(rows
                .into_iter()
                .map(|(id, owner, prompt, reply, created_at)| Message {
                    id: MessageId(id),
                    session_id,
                    owner: UserId::from(owner),
                    prompt,
                    reply,
                    created_at,
                })
                .collect())
        })
    }

    fn clear_messages(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let id_str = session_id.to_string();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "DELETE FROM messages WHERE session_id = ?1",
                        rusqlite::params![id_str],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn migrate_legacy_schema(&self) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let adopted = self
                .conn
                .call(|conn| {
                    let has_session_column = {
                        let mut stmt = conn.prepare("PRAGMA table_info(messages)")?;
                        let mut found = false;
                        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
                        for name in names {
                            if name? == "session_id" {
                                found = true;
                            }
                        }
                        found
                    };

                    let tx = conn.transaction()?;
                    if !has_session_column {
                        tx.execute("ALTER TABLE messages ADD COLUMN session_id TEXT", [])?;
                    }

                    // The backfill runs even when the column already exists,
                    // so a crash between ALTER and backfill cannot strand
                    // unlinked rows.
                    let owners: Vec<String> = {
                        let mut stmt = tx.prepare(
                            "SELECT DISTINCT owner_user_id FROM messages
                             WHERE session_id IS NULL",
                        )?;
                        let owners = stmt
                            .query_map([], |row| row.get(0))?
                            .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                        owners
                    };

                    for owner in &owners {
                        let (first_ms, last_ms): (i64, i64) = tx.query_row(
                            "SELECT MIN(created_at), MAX(created_at) FROM messages
                             WHERE owner_user_id = ?1 AND session_id IS NULL",
                            rusqlite::params![owner],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )?;
                        let session_id = SessionId::new().to_string();
                        tx.execute(
                            "INSERT INTO sessions
                                (id, owner_user_id, title, created_at, updated_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            rusqlite::params![
                                session_id,
                                owner,
                                LEGACY_SESSION_TITLE,
                                first_ms,
                                last_ms
                            ],
                        )?;
                        tx.execute(
                            "UPDATE messages SET session_id = ?1
                             WHERE owner_user_id = ?2 AND session_id IS NULL",
                            rusqlite::params![session_id, owner],
                        )?;
                    }
                    tx.commit()?;
                    Ok(owners.len())
                })
                .await?;

            if adopted > 0 {
                tracing::info!(owners = adopted, "adopted pre-session messages");
            }
            Ok(())
        })
    }
}
