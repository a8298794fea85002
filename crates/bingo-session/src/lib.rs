//! Session orchestration and storage for shared bingo games.
//!
//! Provides:
//! - `SessionService` - Create and join sessions on top of a store
//! - `Subscription` - Cancellable live feed of session snapshots
//! - Storage implementations (memory)

pub mod service;
pub mod storage;
pub mod subscribe;

pub use service::{BOARD_SIZE, CreateOptions, JoinedPlayer, ServiceError, SessionService};
pub use subscribe::{Subscription, SubscriptionHandle};
