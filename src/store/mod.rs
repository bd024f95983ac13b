//! Persistence seam for session records.
//!
//! The protocol only ever talks to [`SessionStore`]; the MySQL adapter is what
//! the server runs on and the in-memory adapter backs the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::game::{GameKind, NewSession, Session, SessionPatch};
use crate::models::user::PlayerRecord;

mod feed;
pub mod memory;
pub mod mysql;

pub use feed::{ChangeFeed, SessionSubscription};
pub use memory::MemorySessionStore;
pub use mysql::MySqlSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {id} changed since version {expected}")]
    Conflict { id: String, expected: u64 },
    #[error("store unavailable")]
    Unavailable,
    #[error("malformed session row: {0}")]
    Malformed(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Last-write-wins partial update.
    async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Session, StoreError>;

    /// Partial update applied only if the row is still at `expected_version`;
    /// otherwise [`StoreError::Conflict`] and nothing is written.
    async fn update_session_if(
        &self,
        id: &str,
        expected_version: u64,
        patch: SessionPatch,
    ) -> Result<Session, StoreError>;

    /// Sessions waiting for a second player, oldest first.
    async fn joinable_sessions(&self, kind: GameKind) -> Result<Vec<Session>, StoreError>;

    /// The caller's most recent session of `kind` that has both seats filled
    /// and no result.
    async fn started_session_for(&self, kind: GameKind, identity: &str) -> Result<Option<Session>, StoreError>;

    /// Unfinished sessions where either player's heartbeat is older than `cutoff`.
    async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, StoreError>;

    async fn player_record(&self, kind: GameKind, identity: &str) -> Result<PlayerRecord, StoreError>;

    /// Change notifications for one session; dropping the subscription
    /// unsubscribes.
    fn subscribe(&self, id: &str) -> SessionSubscription;
}

pub(crate) fn tally(record: &mut PlayerRecord, session: &Session, identity: &str) {
    let (Some(slot), Some(result)) = (session.slot_of(identity), session.result) else {
        return;
    };
    match result.winner() {
        Some(winner) if winner == slot => record.wins += 1,
        Some(_) => record.losses += 1,
        None => record.draws += 1,
    }
}
