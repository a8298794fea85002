//! Session service: creates and joins sessions on top of a store.

use std::time::{SystemTime, UNIX_EPOCH};

use bingo_core::{
    AppendOutcome, GameCode, Player, PlayerUpdate, Session, SessionStore, StoreError,
    generate_board,
};
use rand::Rng;
use serde_json::{Map, Value};

use crate::subscribe::Subscription;

/// Board size for a full sentence pool. Smaller pools degrade to smaller
/// boards, never to an error.
pub const BOARD_SIZE: usize = 25;

/// Alphabet for generated game codes (uppercase alphanumeric).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many fresh codes to try before giving up on creation.
const MAX_CODE_ATTEMPTS: usize = 8;

/// Session service error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No live session for the code.
    #[error("game not found: {0}")]
    NotFound(GameCode),
    /// The caller's input was rejected before touching the store.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Every generated code collided with a live session. Callers may
    /// simply try again.
    #[error("could not allocate an unused game code")]
    CodeSpaceExhausted,
    /// The store failed in a way the service does not reinterpret.
    #[error(transparent)]
    Store(StoreError),
}

/// Creation parameters beyond the game name and sentence pool.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Authenticated id of the creating user.
    pub creator_id: String,
    /// Display name of the creating user.
    pub creator_name: String,
    /// Opaque per-session configuration, stored verbatim.
    pub settings: Map<String, Value>,
}

/// What a caller gets back from a join: their identity within the session
/// and their personal board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedPlayer {
    pub player_id: String,
    pub board: Vec<String>,
}

/// Orchestrates session creation, idempotent joining, gameplay updates,
/// and live subscriptions over a [`SessionStore`] backend.
pub struct SessionService<S: SessionStore> {
    store: S,
}

impl<S: SessionStore> SessionService<S> {
    /// Create a new service owning the given store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store, for collaborators that need raw reads.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a new session from a newline-delimited sentence pool and
    /// returns its code.
    ///
    /// The creator is seeded as the first player with a board drawn from
    /// the pool. Code generation retries on collision with a live
    /// session, so a returned code always identified a fresh document.
    ///
    /// # Errors
    /// - [`ServiceError::Validation`] for a blank game name, blank
    ///   creator name, empty creator id, or an empty sentence pool.
    /// - [`ServiceError::CodeSpaceExhausted`] after
    ///   `MAX_CODE_ATTEMPTS` collisions.
    /// - [`ServiceError::Store`] for backend failures.
    pub async fn create_session(
        &self,
        name: &str,
        sentences: &str,
        options: CreateOptions,
    ) -> Result<GameCode, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("game name must not be blank".into()));
        }
        let creator_name = options.creator_name.trim();
        if creator_name.is_empty() {
            return Err(ServiceError::Validation(
                "creator name must not be blank".into(),
            ));
        }
        if options.creator_id.is_empty() {
            return Err(ServiceError::Validation("creator id must not be empty".into()));
        }

        let pool = parse_sentence_pool(sentences);
        if pool.is_empty() {
            return Err(ServiceError::Validation("sentence pool is empty".into()));
        }

        let board =
            generate_board(&pool, BOARD_SIZE).map_err(|e| ServiceError::Validation(e.to_string()))?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = random_code();
            let session = Session {
                code: code.clone(),
                game_name: name.to_string(),
                sentences: pool.clone(),
                settings: options.settings.clone(),
                player_ids: vec![options.creator_id.clone()],
                players: vec![Player::new(
                    options.creator_id.clone(),
                    creator_name,
                    board.clone(),
                )],
                messages: Vec::new(),
                created_at: now(),
            };

            match self.store.create(session).await {
                Ok(()) => {
                    tracing::info!(%code, game = name, "session created");
                    return Ok(code);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!(%code, attempt, "game code collision, regenerating");
                }
                Err(other) => return Err(ServiceError::Store(other)),
            }
        }

        tracing::warn!(
            attempts = MAX_CODE_ATTEMPTS,
            "gave up allocating a game code"
        );
        Err(ServiceError::CodeSpaceExhausted)
    }

    /// Joins a session, or returns the existing membership.
    ///
    /// Joining is idempotent per `(code, user_id)`: the first successful
    /// call appends a player with a freshly drawn board; every later call
    /// returns that same player and board, even under concurrent joins of
    /// the same user. The candidate board is drawn before the append and
    /// discarded when the user turns out to be present already.
    ///
    /// # Errors
    /// - [`ServiceError::NotFound`] for an unknown code, including a
    ///   session deleted between the read and the append.
    /// - [`ServiceError::Validation`] for a blank player name or empty
    ///   user id.
    /// - [`ServiceError::Store`] for backend failures.
    pub async fn join_session(
        &self,
        code: &GameCode,
        player_name: &str,
        user_id: &str,
    ) -> Result<JoinedPlayer, ServiceError> {
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(ServiceError::Validation(
                "player name must not be blank".into(),
            ));
        }
        if user_id.is_empty() {
            return Err(ServiceError::Validation("user id must not be empty".into()));
        }

        let session = self
            .store
            .read(code)
            .await
            .map_err(|e| map_store(code, e))?
            .ok_or_else(|| ServiceError::NotFound(code.clone()))?;

        let board = generate_board(&session.sentences, BOARD_SIZE)
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let candidate = Player::new(user_id, player_name, board);

        let matcher_id = user_id.to_owned();
        let outcome = self
            .store
            .append_player_if_absent(
                code,
                &move |players: &[Player]| players.iter().find(|p| p.id == matcher_id).cloned(),
                candidate,
            )
            .await
            .map_err(|e| map_store(code, e))?;

        let player = match outcome {
            AppendOutcome::Appended(player) => {
                tracing::info!(%code, player_id = %player.id, "player joined");
                player
            }
            AppendOutcome::AlreadyPresent(player) => {
                tracing::debug!(
                    %code,
                    player_id = %player.id,
                    "player already in session, returning existing board"
                );
                player
            }
        };

        Ok(JoinedPlayer {
            player_id: player.id,
            board: player.board,
        })
    }

    /// Live feed of session snapshots; see [`Subscription`].
    #[must_use]
    pub fn subscribe(&self, code: &GameCode) -> Subscription {
        Subscription::new(self.store.watch(code))
    }

    /// Crosses out one board square for a player. Already-crossed squares
    /// are a no-op.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] for unknown code or player,
    /// [`ServiceError::Validation`] for an index outside the board.
    pub async fn cross_out(
        &self,
        code: &GameCode,
        user_id: &str,
        index: usize,
    ) -> Result<(), ServiceError> {
        self.store
            .update_player(
                code,
                user_id,
                PlayerUpdate {
                    cross_out: vec![index],
                    ..PlayerUpdate::default()
                },
            )
            .await
            .map_err(|e| map_store(code, e))
    }

    /// Records a player's completion time. Repeated calls keep the first
    /// timestamp.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] for unknown code or player.
    pub async fn mark_completed(&self, code: &GameCode, user_id: &str) -> Result<(), ServiceError> {
        self.store
            .update_player(
                code,
                user_id,
                PlayerUpdate {
                    completed_at: Some(now()),
                    ..PlayerUpdate::default()
                },
            )
            .await
            .map_err(|e| map_store(code, e))
    }

    /// Appends one chat entry to the session log. The entry is opaque to
    /// the core.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] for an unknown code.
    pub async fn send_message(&self, code: &GameCode, message: Value) -> Result<(), ServiceError> {
        self.store
            .append_message(code, message)
            .await
            .map_err(|e| map_store(code, e))
    }
}

/// Splits a newline-delimited pool into trimmed, non-empty sentences.
fn parse_sentence_pool(sentences: &str) -> Vec<String> {
    sentences
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn random_code() -> GameCode {
    let mut rng = rand::rng();
    let text: String = (0..GameCode::LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    GameCode::parse(&text).expect("generated from the code alphabet at the code length")
}

fn map_store(code: &GameCode, err: StoreError) -> ServiceError {
    match err {
        StoreError::NotFound(_) => ServiceError::NotFound(code.clone()),
        StoreError::InvalidUpdate(msg) => ServiceError::Validation(msg),
        other => ServiceError::Store(other),
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use crate::storage::MemoryStore;

    use super::*;

    fn service() -> SessionService<MemoryStore> {
        SessionService::new(MemoryStore::new())
    }

    fn pool(n: usize) -> String {
        (0..n).map(|i| format!("sentence {i}\n")).collect()
    }

    fn options() -> CreateOptions {
        CreateOptions {
            creator_id: "u1".into(),
            creator_name: "Al".into(),
            settings: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_session_rejects_blank_name() {
        let svc = service();
        let result = svc.create_session("   ", &pool(25), options()).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_pool() {
        let svc = service();
        let result = svc.create_session("Movie Night", "\n  \n", options()).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_session_trims_and_drops_empty_lines() {
        let svc = service();
        let code = svc
            .create_session("Movie Night", "  a  \n\nb\n \nc\n", options())
            .await
            .unwrap();

        let session = svc.store().read(&code).await.unwrap().unwrap();
        assert_eq!(session.sentences, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_join_session_unknown_code_is_not_found() {
        let svc = service();
        let code = GameCode::parse("NOPE1").unwrap();

        let result = svc.join_session(&code, "Cy", "u3").await;
        assert!(matches!(result, Err(ServiceError::NotFound(c)) if c == code));
    }

    #[tokio::test]
    async fn test_join_session_rejects_blank_player_name() {
        let svc = service();
        let code = svc
            .create_session("Movie Night", &pool(25), options())
            .await
            .unwrap();

        let result = svc.join_session(&code, "  ", "u2").await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_join_session_twice_returns_same_board() {
        let svc = service();
        let code = svc
            .create_session("Movie Night", &pool(25), options())
            .await
            .unwrap();

        let first = svc.join_session(&code, "Bea", "u2").await.unwrap();
        let second = svc.join_session(&code, "Bea", "u2").await.unwrap();

        assert_eq!(first, second);
        let session = svc.store().read(&code).await.unwrap().unwrap();
        assert_eq!(session.players.len(), 2);
    }

    #[tokio::test]
    async fn test_cross_out_out_of_range_is_validation_error() {
        let svc = service();
        let code = svc
            .create_session("Movie Night", &pool(10), options())
            .await
            .unwrap();

        let result = svc.cross_out(&code, "u1", 10).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_mark_completed_keeps_first_timestamp() {
        let svc = service();
        let code = svc
            .create_session("Movie Night", &pool(10), options())
            .await
            .unwrap();

        svc.mark_completed(&code, "u1").await.unwrap();
        let first = svc
            .store()
            .read(&code)
            .await
            .unwrap()
            .unwrap()
            .player("u1")
            .unwrap()
            .completed_at;
        assert!(first.is_some());

        svc.mark_completed(&code, "u1").await.unwrap();
        let second = svc
            .store()
            .read(&code)
            .await
            .unwrap()
            .unwrap()
            .player("u1")
            .unwrap()
            .completed_at;
        assert_eq!(first, second);
    }
}
