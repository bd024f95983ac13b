use log::warn;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::game::Session;

// Buffered change events before a slow subscriber starts lagging
const FEED_CAPACITY: usize = 256;

/// Fan-out of every committed session record.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Session>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        ChangeFeed::new(FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChangeFeed { tx }
    }

    pub fn publish(&self, session: &Session) {
        // no subscribers is fine
        let _ = self.tx.send(session.clone());
    }

    pub fn subscribe(&self, id: &str) -> SessionSubscription {
        SessionSubscription {
            id: id.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

/// Receives full records of one session as they are written.
#[derive(Debug)]
pub struct SessionSubscription {
    id: String,
    rx: broadcast::Receiver<Session>,
}

impl SessionSubscription {
    /// Next record for this session, or `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Session> {
        loop {
            match self.rx.recv().await {
                Ok(session) if session.id == self.id => return Some(session),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("subscription to {} skipped {} changes", self.id, skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
