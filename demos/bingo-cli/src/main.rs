//! Demo: one full session lifecycle in a single process.
//!
//! Run with: cargo run -p bingo-cli
//!
//! Creates a game, races two joins of the same guest to show that joining
//! is idempotent, then follows the live snapshot feed while the guest
//! plays.

use std::sync::Arc;

use anyhow::Result;
use bingo_core::Session;
use bingo_session::storage::MemoryStore;
use bingo_session::{CreateOptions, SessionService};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const SENTENCES: &str = "\
someone says 'can you hear me'
awkward silence
dog barks in the background
'let's circle back on that'
someone eats on camera
frozen video, moving audio
'sorry, I was on mute'
mystery echo appears
someone joins ten minutes late
screen share shows the wrong window
'I'll be quick' (is not quick)
a cat walks across a keyboard
someone leaves without a word
'can everyone see my screen'
notification ping mid-sentence
someone types very loudly
a doorbell rings
'let's take this offline'
two people talk over each other
someone's camera points at the ceiling
a child makes a cameo
'next slide please'
the meeting runs over
someone asks an already-answered question
'this could have been an email'";

/// Merges the locally known identity with the latest session snapshot.
///
/// This is the UI layer's half of the protocol: the core pushes whole
/// snapshots, the mirror keeps the most recent one next to who we are.
struct ClientMirror {
    user_name: String,
    latest: Option<Session>,
}

impl ClientMirror {
    fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            latest: None,
        }
    }

    fn observe(&mut self, snapshot: Option<Session>) {
        self.latest = snapshot;
    }

    fn describe(&self) -> String {
        self.latest.as_ref().map_or_else(
            || format!("{}: no session", self.user_name),
            |session| {
                let done = session
                    .players
                    .iter()
                    .filter(|p| p.completed_at.is_some())
                    .count();
                format!(
                    "{} sees \"{}\": {} player(s), {} message(s), {} finished",
                    self.user_name,
                    session.game_name,
                    session.players.len(),
                    session.messages.len(),
                    done
                )
            },
        )
    }

    fn player_completed(&self, user_id: &str) -> bool {
        self.latest
            .as_ref()
            .and_then(|s| s.player(user_id))
            .is_some_and(|p| p.completed_at.is_some())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let service = Arc::new(SessionService::new(MemoryStore::new()));

    let host_id = Uuid::new_v4().to_string();
    let code = service
        .create_session(
            "Meeting Bingo",
            SENTENCES,
            CreateOptions {
                creator_id: host_id.clone(),
                creator_name: "Al".into(),
                settings: serde_json::Map::new(),
            },
        )
        .await?;
    tracing::info!(%code, host = "Al", "session ready");
    println!("created game {code}");

    let mut mirror = ClientMirror::new("Al");
    let mut feed = service.subscribe(&code);

    // Two concurrent joins of the same guest resolve to one player with
    // one board.
    let guest_id = Uuid::new_v4().to_string();
    let (first, second) = tokio::join!(
        service.join_session(&code, "Bea", &guest_id),
        service.join_session(&code, "Bea", &guest_id),
    );
    let (first, second) = (first?, second?);
    println!(
        "guest joined twice, same board both times: {}",
        first.board == second.board
    );
    println!("guest board has {} squares", first.board.len());

    service.cross_out(&code, &guest_id, 0).await?;
    service
        .send_message(&code, serde_json::json!({ "from": "Bea", "text": "got one!" }))
        .await?;
    service.mark_completed(&code, &guest_id).await?;

    while let Some(snapshot) = feed.next().await {
        mirror.observe(snapshot);
        println!("{}", mirror.describe());
        if mirror.player_completed(&guest_id) {
            break;
        }
    }

    feed.cancel();
    println!("unsubscribed from {code}");
    Ok(())
}
