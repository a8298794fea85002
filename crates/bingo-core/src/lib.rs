//! Core abstractions for shared bingo sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Session` / `Player` - the shared session document and its members
//! - `GameCode` - the short human-typed session identifier
//! - `generate_board` - personal board drawn from the shared sentence pool
//! - `SessionStore` - trait for transactional session storage backends

pub mod board;
pub mod traits;
pub mod types;

pub use board::{BoardError, generate_board};
pub use traits::{AppendOutcome, PlayerMatcher, SessionStore, StoreError};
pub use types::{CodeError, GameCode, Player, PlayerUpdate, PlayerUpdateError, Session};
