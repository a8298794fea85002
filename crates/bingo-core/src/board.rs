//! Personal board generation.

use rand::seq::SliceRandom;

/// Error produced by [`generate_board`].
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board size must be at least 1")]
    InvalidSize,
}

/// Draws a personal board of up to `size` sentences from the shared pool.
///
/// The full pool is shuffled (Fisher-Yates via [`SliceRandom::shuffle`])
/// before truncation, so every `size`-element subset is reachable rather
/// than only a biased prefix. Pools smaller than `size` yield a board of
/// the whole pool; callers must treat short boards as valid.
///
/// Pure aside from thread-local randomness; boards are not reproducible
/// across calls.
///
/// # Errors
/// Returns [`BoardError::InvalidSize`] if `size` is zero.
pub fn generate_board(pool: &[String], size: usize) -> Result<Vec<String>, BoardError> {
    if size == 0 {
        return Err(BoardError::InvalidSize);
    }

    let mut deck = pool.to_vec();
    deck.shuffle(&mut rand::rng());
    deck.truncate(size);
    Ok(deck)
}
