//! The store contract: transactional session storage with a change feed.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{GameCode, Player, PlayerUpdate, Session};

/// Storage error.
///
/// Transient write contention is absorbed inside store implementations by
/// optimistic-concurrency retries and never appears here; what surfaces is
/// either a definite answer about the document or an `Unavailable` that the
/// caller may retry wholesale.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No session document exists for the code.
    #[error("no session for code {0}")]
    NotFound(GameCode),
    /// A document already exists for the code (creation only).
    #[error("a session already exists for code {0}")]
    AlreadyExists(GameCode),
    /// The mutation itself is malformed (e.g. crossing out an index
    /// outside the player's board).
    #[error("invalid player update: {0}")]
    InvalidUpdate(String),
    /// The backend could not be reached. Idempotent operations are safe
    /// to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a conditional player append.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// The player was appended; carries the stored record.
    Appended(Player),
    /// The matcher found an existing entry; nothing was written.
    AlreadyPresent(Player),
}

/// Matcher evaluated inside the append transaction: returns the existing
/// entry that makes the append redundant, or `None` to go ahead.
pub type PlayerMatcher = dyn Fn(&[Player]) -> Option<Player> + Sync;

/// Trait for session storage backends.
///
/// A backend is a keyed document store shared by many independent client
/// processes. All cross-process coordination happens through `create` and
/// `append_player_if_absent`; the core never takes a distributed lock.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a new session document keyed by `session.code`.
    ///
    /// # Errors
    /// [`StoreError::AlreadyExists`] if the code is taken; a code refers
    /// to at most one live session.
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    /// Reads the current document, or `None` if the code is unknown.
    async fn read(&self, code: &GameCode) -> Result<Option<Session>, StoreError>;

    /// Atomically appends `player` unless `existing` finds a conflicting
    /// entry in the current player list.
    ///
    /// Matcher evaluation and the append commit as one transaction
    /// against a single document version; implementations retry
    /// internally under write contention. Two concurrent calls for the
    /// same identity therefore resolve to exactly one
    /// [`AppendOutcome::Appended`] and one
    /// [`AppendOutcome::AlreadyPresent`], never two appends.
    ///
    /// Appending also records `player.id` in the document's `playerIDs`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the document is absent (including when
    /// it was deleted mid-call).
    async fn append_player_if_absent(
        &self,
        code: &GameCode,
        existing: &PlayerMatcher,
        player: Player,
    ) -> Result<AppendOutcome, StoreError>;

    /// Atomically appends one entry to the session's chat log.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the document is absent.
    async fn append_message(&self, code: &GameCode, message: Value) -> Result<(), StoreError>;

    /// Atomically applies an in-place update to one player.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the document or player is absent,
    /// [`StoreError::InvalidUpdate`] if the update fails validation.
    async fn update_player(
        &self,
        code: &GameCode,
        player_id: &str,
        update: PlayerUpdate,
    ) -> Result<(), StoreError>;

    /// Live change feed for one document.
    ///
    /// Emits the current snapshot immediately (`None` while the document
    /// is absent), then one snapshot per committed mutation in commit
    /// order. A consumer that falls behind may observe coalescing to
    /// newer snapshots; this is implementation-defined, and a subscribed
    /// consumer always eventually sees the current state. Delivery stops
    /// when the stream is dropped.
    fn watch(&self, code: &GameCode) -> BoxStream<'static, Option<Session>>;
}
