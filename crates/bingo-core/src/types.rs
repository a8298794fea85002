//! Session and player records as persisted by the store.
//!
//! The serde representation of these types is the document schema shared
//! with every other client of the store, so field renames here are
//! load-bearing: `playerIDs`, `crossedOut`, `completedAt` and friends must
//! serialize exactly as written.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// GameCode
// ---------------------------------------------------------------------------

/// Short code identifying one live session.
///
/// Codes are human-typed, so they are case-insensitive on input and
/// normalized to uppercase. The alphabet is `A-Z0-9`, fixed length
/// [`GameCode::LEN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameCode(String);

/// Error produced when parsing a [`GameCode`] from user input.
#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    #[error("game code must be exactly 5 characters, got {got}")]
    Length { got: usize },
    #[error("game code may only contain A-Z and 0-9: {0:?}")]
    Alphabet(String),
}

impl GameCode {
    /// Fixed code length.
    pub const LEN: usize = 5;

    /// Parses and normalizes user input into a code.
    ///
    /// Trims surrounding whitespace and upper-cases the input before
    /// validating length and alphabet.
    ///
    /// # Errors
    /// Returns [`CodeError`] if the normalized input is not `LEN`
    /// characters of `A-Z0-9`.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.chars().count() != Self::LEN {
            return Err(CodeError::Length {
                got: normalized.chars().count(),
            });
        }
        if !normalized
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(CodeError::Alphabet(normalized));
        }
        Ok(Self(normalized))
    }

    /// The normalized code text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GameCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GameCode> for String {
    fn from(code: GameCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One shared bingo session, keyed by its [`GameCode`].
///
/// `sentences`, `game_name`, and `settings` are immutable after creation.
/// `players` is append-only except for in-place progress updates, and
/// `messages` is append-only; both are mutated exclusively through
/// [`SessionStore`](crate::SessionStore) primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: GameCode,
    pub game_name: String,
    /// Shared sentence pool every board is drawn from.
    pub sentences: Vec<String>,
    /// Opaque per-session configuration. The core never interprets it.
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Denormalized list of player ids, kept in lockstep with `players`.
    #[serde(rename = "playerIDs")]
    pub player_ids: Vec<String>,
    pub players: Vec<Player>,
    /// Append-only chat log, opaque to the core.
    #[serde(default)]
    pub messages: Vec<Value>,
    /// Creation time, unix seconds.
    pub created_at: i64,
}

impl Session {
    /// Looks up a player by id.
    #[must_use]
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One participant within a session.
///
/// `id` and `board` are immutable once set. `crossed_out` grows
/// monotonically and `completed_at` is set at most once; both rules are
/// enforced by [`Player::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// External authenticated identity, unique within a session.
    pub id: String,
    pub name: String,
    /// Personal board: `min(25, pool size)` sentences, assigned on join.
    pub board: Vec<String>,
    /// Indices into `board`, sorted and deduplicated.
    #[serde(default)]
    pub crossed_out: Vec<usize>,
    /// Opaque win-detection state maintained by higher layers.
    #[serde(default)]
    pub progress: Map<String, Value>,
    /// Unix seconds; set at most once, never cleared.
    pub completed_at: Option<i64>,
}

impl Player {
    /// Creates a fresh player with an empty progress record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, board: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            board,
            crossed_out: Vec::new(),
            progress: Map::new(),
            completed_at: None,
        }
    }

    /// Applies an in-place update, preserving the player's monotonicity
    /// rules: crossed-out indices only accumulate, and `completed_at`
    /// never changes once set.
    ///
    /// The update is validated up front; on error the player is untouched.
    ///
    /// # Errors
    /// Returns [`PlayerUpdateError::IndexOutOfRange`] if any crossed-out
    /// index does not fall within the board.
    pub fn apply(&mut self, update: PlayerUpdate) -> Result<(), PlayerUpdateError> {
        if let Some(&index) = update.cross_out.iter().find(|&&i| i >= self.board.len()) {
            return Err(PlayerUpdateError::IndexOutOfRange {
                index,
                board_len: self.board.len(),
            });
        }

        for index in update.cross_out {
            if let Err(pos) = self.crossed_out.binary_search(&index) {
                self.crossed_out.insert(pos, index);
            }
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(at) = update.completed_at {
            if self.completed_at.is_none() {
                self.completed_at = Some(at);
            }
        }
        Ok(())
    }
}

/// In-place mutation of a single player.
#[derive(Debug, Clone, Default)]
pub struct PlayerUpdate {
    /// Board indices to add to the crossed-out set.
    pub cross_out: Vec<usize>,
    /// Replacement progress record, if any.
    pub progress: Option<Map<String, Value>>,
    /// Completion timestamp; ignored if the player already completed.
    pub completed_at: Option<i64>,
}

/// Error produced when a [`PlayerUpdate`] cannot be applied.
#[derive(Debug, thiserror::Error)]
pub enum PlayerUpdateError {
    #[error("crossed-out index {index} is outside the board (len {board_len})")]
    IndexOutOfRange { index: usize, board_len: usize },
}
