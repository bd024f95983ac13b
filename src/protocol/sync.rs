use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::models::game::Session;
use crate::store::SessionStore;
use crate::tasks::TaskControl;

/// The local copy of one session. Accepts a snapshot only when it is newer
/// than the one held, so duplicate and out-of-order deliveries are no-ops.
#[derive(Debug)]
pub struct SnapshotSink {
    tx: watch::Sender<Session>,
}

impl SnapshotSink {
    pub fn new(initial: Session) -> Self {
        let (tx, _) = watch::channel(initial);
        SnapshotSink { tx }
    }

    /// Returns whether `snapshot` replaced the held record.
    pub fn offer(&self, snapshot: Session) -> bool {
        self.tx.send_if_modified(|held| {
            if snapshot.id != held.id || snapshot.version <= held.version {
                return false;
            }
            *held = snapshot;
            true
        })
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }
}

/// Keeps a [`SnapshotSink`] fed from the change subscription and a fixed
/// interval poll. Either producer alone is enough to converge.
pub struct SessionSync {
    sink: Arc<SnapshotSink>,
    push: TaskControl,
    poll: TaskControl,
}

impl SessionSync {
    pub fn start(store: Arc<dyn SessionStore>, initial: Session, poll_every: Duration) -> SessionSync {
        let id = initial.id.clone();
        let sink = Arc::new(SnapshotSink::new(initial));

        let mut subscription = store.subscribe(&id);
        let push_sink = sink.clone();
        let push = TaskControl::spawn("session push", move |mut stopped| async move {
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    change = subscription.recv() => match change {
                        Some(session) => {
                            push_sink.offer(session);
                        }
                        None => {
                            debug!("change feed closed");
                            break;
                        }
                    },
                }
            }
        });

        let poll_sink = sink.clone();
        let poll = TaskControl::spawn("session poll", move |mut stopped| async move {
            let mut ticker = interval(poll_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => match store.get_session(&id).await {
                        Ok(Some(session)) => {
                            poll_sink.offer(session);
                        }
                        Ok(None) => warn!("session {} disappeared", id),
                        // retried on the next tick
                        Err(err) => warn!("polling session {} failed: {}", id, err),
                    },
                }
            }
        });

        SessionSync { sink, push, poll }
    }

    pub fn sink(&self) -> &Arc<SnapshotSink> {
        &self.sink
    }

    pub fn updates(&self) -> watch::Receiver<Session> {
        self.sink.subscribe()
    }

    pub async fn stop(self) {
        self.push.stop().await;
        self.poll.stop().await;
    }
}
