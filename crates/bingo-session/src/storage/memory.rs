//! In-memory session store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use bingo_core::{
    AppendOutcome, GameCode, Player, PlayerMatcher, PlayerUpdate, Session, SessionStore, StoreError,
};
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Per-document change-feed capacity. A subscriber that lags behind by
/// more than this many commits skips to newer snapshots.
const FEED_CAPACITY: usize = 64;

/// A session document plus its commit counter. Every committed mutation
/// bumps `version`; the conditional append uses it to detect that another
/// writer got in between.
struct VersionedDoc {
    version: u64,
    session: Session,
}

struct Inner {
    docs: HashMap<GameCode, VersionedDoc>,
    /// Change feeds, created lazily on first `watch`. Kept separate from
    /// `docs` so a feed can exist before its document does.
    feeds: HashMap<GameCode, broadcast::Sender<Option<Session>>>,
}

/// In-memory store implementation.
///
/// Useful for development, tests, and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                docs: HashMap::new(),
                feeds: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn publish(
    feeds: &HashMap<GameCode, broadcast::Sender<Option<Session>>>,
    code: &GameCode,
    snapshot: Session,
) {
    if let Some(feed) = feeds.get(code) {
        // A send error just means nobody is watching right now.
        let _ = feed.send(Some(snapshot));
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let inner = &mut *guard;

        let code = session.code.clone();
        if inner.docs.contains_key(&code) {
            return Err(StoreError::AlreadyExists(code));
        }

        publish(&inner.feeds, &code, session.clone());
        inner.docs.insert(
            code.clone(),
            VersionedDoc {
                version: 1,
                session,
            },
        );

        tracing::debug!(%code, "session document created");
        Ok(())
    }

    async fn read(&self, code: &GameCode) -> Result<Option<Session>, StoreError> {
        Ok(self
            .inner
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .docs
            .get(code)
            .map(|doc| doc.session.clone()))
    }

    async fn append_player_if_absent(
        &self,
        code: &GameCode,
        existing: &PlayerMatcher,
        player: Player,
    ) -> Result<AppendOutcome, StoreError> {
        // Optimistic concurrency: evaluate the matcher against one
        // committed version, then commit only if that version is still
        // current. A conflict restarts the whole transaction, so the
        // matcher always sees the players it is judged against.
        loop {
            let (version, players) = {
                let guard = self
                    .inner
                    .read()
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                let doc = guard
                    .docs
                    .get(code)
                    .ok_or_else(|| StoreError::NotFound(code.clone()))?;
                (doc.version, doc.session.players.clone())
            };

            if let Some(present) = existing(&players) {
                return Ok(AppendOutcome::AlreadyPresent(present));
            }

            let mut guard = self
                .inner
                .write()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let inner = &mut *guard;
            let doc = inner
                .docs
                .get_mut(code)
                .ok_or_else(|| StoreError::NotFound(code.clone()))?;

            if doc.version != version {
                tracing::debug!(%code, "conditional append raced a commit, retrying");
                continue;
            }

            doc.session.players.push(player.clone());
            doc.session.player_ids.push(player.id.clone());
            doc.version += 1;
            let snapshot = doc.session.clone();
            publish(&inner.feeds, code, snapshot);

            tracing::info!(%code, player_id = %player.id, "player appended");
            return Ok(AppendOutcome::Appended(player));
        }
    }

    async fn append_message(&self, code: &GameCode, message: Value) -> Result<(), StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let inner = &mut *guard;
        let doc = inner
            .docs
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.clone()))?;

        doc.session.messages.push(message);
        doc.version += 1;
        let snapshot = doc.session.clone();
        publish(&inner.feeds, code, snapshot);
        Ok(())
    }

    async fn update_player(
        &self,
        code: &GameCode,
        player_id: &str,
        update: PlayerUpdate,
    ) -> Result<(), StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let inner = &mut *guard;
        let doc = inner
            .docs
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.clone()))?;

        let player = doc
            .session
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| StoreError::NotFound(code.clone()))?;

        player
            .apply(update)
            .map_err(|e| StoreError::InvalidUpdate(e.to_string()))?;

        doc.version += 1;
        let snapshot = doc.session.clone();
        publish(&inner.feeds, code, snapshot);
        Ok(())
    }

    fn watch(&self, code: &GameCode) -> BoxStream<'static, Option<Session>> {
        // Register the receiver and capture the initial snapshot under the
        // same lock acquisition, so no commit can slip in between the
        // snapshot and the live tail.
        let (initial, rx) = {
            let mut inner = self.inner.write().unwrap();
            let rx = inner
                .feeds
                .entry(code.clone())
                .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
                .subscribe();
            let initial = inner.docs.get(code).map(|doc| doc.session.clone());
            (initial, rx)
        };

        // Lag markers are dropped: a slow consumer coalesces to newer
        // snapshots instead of erroring out.
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        stream::iter(std::iter::once(initial)).chain(live).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(code: &str) -> Session {
        Session {
            code: GameCode::parse(code).unwrap(),
            game_name: "Movie Night".into(),
            sentences: (0..25).map(|i| format!("line {i}")).collect(),
            settings: serde_json::Map::new(),
            player_ids: vec!["u1".into()],
            players: vec![Player::new("u1", "Al", vec!["line 0".into()])],
            messages: Vec::new(),
            created_at: 0,
        }
    }

    fn code(c: &str) -> GameCode {
        GameCode::parse(c).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_read_roundtrips() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        let read = store.read(&code("AAAAA")).await.unwrap().unwrap();
        assert_eq!(read.game_name, "Movie Night");
        assert_eq!(read.players.len(), 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_code_is_rejected() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        let result = store.create(session("AAAAA")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_read_unknown_code_is_none() {
        let store = MemoryStore::new();
        assert!(store.read(&code("ZZZZZ")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_absent_player_is_appended() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        let outcome = store
            .append_player_if_absent(
                &code("AAAAA"),
                &|players: &[Player]| players.iter().find(|p| p.id == "u2").cloned(),
                Player::new("u2", "Bea", vec!["line 1".into()]),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, AppendOutcome::Appended(p) if p.id == "u2"));
        let read = store.read(&code("AAAAA")).await.unwrap().unwrap();
        assert_eq!(read.players.len(), 2);
        assert_eq!(read.player_ids, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_append_present_player_returns_existing_entry() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        let outcome = store
            .append_player_if_absent(
                &code("AAAAA"),
                &|players: &[Player]| players.iter().find(|p| p.id == "u1").cloned(),
                Player::new("u1", "Imposter", vec!["line 9".into()]),
            )
            .await
            .unwrap();

        // The original record wins; nothing is written.
        assert!(matches!(outcome, AppendOutcome::AlreadyPresent(p) if p.name == "Al"));
        let read = store.read(&code("AAAAA")).await.unwrap().unwrap();
        assert_eq!(read.players.len(), 1);
    }

    #[tokio::test]
    async fn test_append_on_unknown_code_is_not_found() {
        let store = MemoryStore::new();

        let result = store
            .append_player_if_absent(
                &code("ZZZZZ"),
                &|_: &[Player]| None,
                Player::new("u2", "Bea", Vec::new()),
            )
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_append_message_grows_log_in_order() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        store
            .append_message(&code("AAAAA"), serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        store
            .append_message(&code("AAAAA"), serde_json::json!({"text": "ho"}))
            .await
            .unwrap();

        let read = store.read(&code("AAAAA")).await.unwrap().unwrap();
        assert_eq!(read.messages.len(), 2);
        assert_eq!(read.messages[0]["text"], "hi");
    }

    #[tokio::test]
    async fn test_update_player_crosses_out_and_completes_once() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        store
            .update_player(
                &code("AAAAA"),
                "u1",
                PlayerUpdate {
                    cross_out: vec![0],
                    completed_at: Some(10),
                    ..PlayerUpdate::default()
                },
            )
            .await
            .unwrap();
        store
            .update_player(
                &code("AAAAA"),
                "u1",
                PlayerUpdate {
                    completed_at: Some(99),
                    ..PlayerUpdate::default()
                },
            )
            .await
            .unwrap();

        let read = store.read(&code("AAAAA")).await.unwrap().unwrap();
        let player = read.player("u1").unwrap();
        assert_eq!(player.crossed_out, vec![0]);
        assert_eq!(player.completed_at, Some(10), "completion never moves");
    }

    #[tokio::test]
    async fn test_update_player_out_of_range_index_is_invalid() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        let result = store
            .update_player(
                &code("AAAAA"),
                "u1",
                PlayerUpdate {
                    cross_out: vec![40],
                    ..PlayerUpdate::default()
                },
            )
            .await;

        assert!(matches!(result, Err(StoreError::InvalidUpdate(_))));
    }

    #[tokio::test]
    async fn test_watch_emits_none_for_absent_document() {
        let store = MemoryStore::new();
        let mut feed = store.watch(&code("ZZZZZ"));

        assert_eq!(feed.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_watch_emits_initial_snapshot_then_commits() {
        let store = MemoryStore::new();
        store.create(session("AAAAA")).await.unwrap();

        let mut feed = store.watch(&code("AAAAA"));
        let initial = feed.next().await.unwrap().unwrap();
        assert_eq!(initial.players.len(), 1);

        store
            .append_player_if_absent(
                &code("AAAAA"),
                &|_: &[Player]| None,
                Player::new("u2", "Bea", vec!["line 1".into()]),
            )
            .await
            .unwrap();

        let next = feed.next().await.unwrap().unwrap();
        assert_eq!(next.players.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_opened_before_create_sees_the_creation() {
        let store = MemoryStore::new();
        let mut feed = store.watch(&code("AAAAA"));
        assert_eq!(feed.next().await, Some(None));

        store.create(session("AAAAA")).await.unwrap();

        let created = feed.next().await.unwrap().unwrap();
        assert_eq!(created.game_name, "Movie Night");
    }
}
