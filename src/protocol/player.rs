use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::watch;

use crate::config::Timing;
use crate::models::game::{Session, Slot};
use crate::models::ships::ShipBoard;
use crate::protocol::machine::{fresh, ProtocolError, Rejection, TurnMachine};
use crate::protocol::monitor::{ForfeitMonitor, PlacementTimer};
use crate::protocol::rules::{rules_for, Move};
use crate::protocol::slots::{assign_slot, Seat};
use crate::protocol::sync::SessionSync;
use crate::store::SessionStore;
use crate::tasks::TaskControl;

/// One identity's live view of a session: its seat, the synced record and
/// the background clocks that go with being seated.
pub struct PlayerSession {
    id: String,
    seat: Seat,
    machine: TurnMachine,
    sync: SessionSync,
    tasks: Vec<TaskControl>,
}

impl PlayerSession {
    /// Takes (or resumes) a seat in `id` and starts syncing. Seated players
    /// also get the referee, the forfeit monitor and, where the game has a
    /// placement phase, the placement timer.
    pub async fn join(
        store: Arc<dyn SessionStore>,
        id: &str,
        identity: &str,
        timing: Timing,
    ) -> Result<PlayerSession, ProtocolError> {
        let seat = assign_slot(store.as_ref(), id, identity).await?;
        let initial = fresh(store.as_ref(), id).await?;
        let kind = initial.kind;
        let machine = TurnMachine::new(store.clone());
        let sync = SessionSync::start(store, initial, timing.poll_every);

        let mut tasks = Vec::new();
        if let Seat::Player(slot) = seat {
            tasks.push(referee(machine.clone(), sync.updates()));
            tasks.push(ForfeitMonitor::spawn(machine.clone(), slot, sync.updates(), timing));
            if rules_for(kind).map(|rules| rules.needs_placement()).unwrap_or(false) {
                tasks.push(PlacementTimer::spawn(machine.clone(), slot, sync.updates(), timing));
            }
        }
        debug!("{} joined session {} as {:?}", identity, id, seat);

        Ok(PlayerSession {
            id: id.to_string(),
            seat,
            machine,
            sync,
            tasks,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seat(&self) -> Seat {
        self.seat
    }

    pub fn snapshot(&self) -> Session {
        self.sync.sink().current()
    }

    pub fn updates(&self) -> watch::Receiver<Session> {
        self.sync.updates()
    }

    fn slot(&self) -> Result<Slot, ProtocolError> {
        self.seat.slot().ok_or_else(|| Rejection::NotSeated.into())
    }

    // The written record is applied locally straight away
    fn applied(&self, session: Session) -> Session {
        self.sync.sink().offer(session.clone());
        session
    }

    pub async fn place(&self, board: ShipBoard, ready: bool) -> Result<Session, ProtocolError> {
        let session = self.machine.set_ready(&self.id, self.slot()?, Some(board), ready).await?;
        Ok(self.applied(session))
    }

    pub async fn auto_place(&self) -> Result<Session, ProtocolError> {
        let session = self.machine.auto_place(&self.id, self.slot()?).await?;
        Ok(self.applied(session))
    }

    pub async fn play(&self, mv: Move) -> Result<Session, ProtocolError> {
        let session = self.machine.submit_move(&self.id, self.slot()?, mv).await?;
        Ok(self.applied(session))
    }

    pub async fn surrender(&self) -> Result<Session, ProtocolError> {
        let session = self.machine.surrender(&self.id, self.slot()?).await?;
        Ok(self.applied(session))
    }

    /// Stops syncing and every clock.
    pub async fn leave(self) {
        for task in self.tasks {
            task.stop().await;
        }
        self.sync.stop().await;
    }
}

/// Runs the win check on every accepted snapshot until the session ends.
fn referee(machine: TurnMachine, updates: watch::Receiver<Session>) -> TaskControl {
    TaskControl::spawn("referee", move |mut stopped| async move {
        let mut updates = updates;
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.is_terminal() {
                break;
            }
            if let Err(err) = machine.observe(&snapshot).await {
                warn!("win check on {} failed: {}", snapshot.id, err);
            }
            tokio::select! {
                _ = &mut stopped => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
