use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::game::{GameKind, NewSession, Session, SessionPatch, SessionStatus};
use crate::models::user::PlayerRecord;
use crate::store::{tally, ChangeFeed, SessionStore, SessionSubscription, StoreError};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    // insertion order, oldest first
    order: Vec<String>,
}

impl Inner {
    fn in_order(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }
}

/// Process-local session store. Writes are serialised by one lock, so the
/// compare-and-swap in `update_session_if` is exact.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
    feed: ChangeFeed,
    offline: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    async fn write(&self, id: &str, expected_version: Option<u64>, patch: SessionPatch) -> Result<Session, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(expected) = expected_version {
            if session.version != expected {
                debug!("session {} is at version {}, expected {}", id, session.version, expected);
                return Err(StoreError::Conflict {
                    id: id.to_string(),
                    expected,
                });
            }
        }
        patch.apply_to(session);
        session.version += 1;
        let updated = session.clone();
        drop(inner);
        self.feed.publish(&updated);
        Ok(updated)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        self.check_online()?;
        let session = Session {
            id: Uuid::new_v4().to_string(),
            kind: new.kind,
            player1: new.player1,
            player2: None,
            status: SessionStatus::Waiting,
            board1: None,
            board2: None,
            board: None,
            ready1: None,
            ready2: None,
            turn: None,
            result: None,
            player1_last_active: None,
            player2_last_active: None,
            version: 1,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner.order.push(session.id.clone());
        inner.sessions.insert(session.id.clone(), session.clone());
        drop(inner);
        self.feed.publish(&session);
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.check_online()?;
        Ok(self.inner.read().await.sessions.get(id).cloned())
    }

    async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Session, StoreError> {
        self.write(id, None, patch).await
    }

    async fn update_session_if(
        &self,
        id: &str,
        expected_version: u64,
        patch: SessionPatch,
    ) -> Result<Session, StoreError> {
        self.write(id, Some(expected_version), patch).await
    }

    async fn joinable_sessions(&self, kind: GameKind) -> Result<Vec<Session>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .in_order()
            .filter(|s| s.kind == kind && s.is_joinable())
            .cloned()
            .collect())
    }

    async fn started_session_for(&self, kind: GameKind, identity: &str) -> Result<Option<Session>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .in_order()
            .filter(|s| {
                s.kind == kind
                    && s.status == SessionStatus::Ready
                    && s.result.is_none()
                    && s.slot_of(identity).is_some()
            })
            .last()
            .cloned())
    }

    async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let stale = |at: Option<DateTime<Utc>>| at.map(|at| at < cutoff).unwrap_or(false);
        Ok(inner
            .in_order()
            .filter(|s| s.result.is_none() && (stale(s.player1_last_active) || stale(s.player2_last_active)))
            .cloned()
            .collect())
    }

    async fn player_record(&self, kind: GameKind, identity: &str) -> Result<PlayerRecord, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut record = PlayerRecord::default();
        for session in inner.in_order().filter(|s| s.kind == kind) {
            tally(&mut record, session, identity);
        }
        Ok(record)
    }

    fn subscribe(&self, id: &str) -> SessionSubscription {
        self.feed.subscribe(id)
    }
}
