//! Local clocks of a seated player: the turn countdown that forfeits an idle
//! player, and the placement countdown that places a fleet for them.

use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::config::Timing;
use crate::models::game::{Phase, Session, Slot};
use crate::models::ships;
use crate::protocol::machine::TurnMachine;
use crate::tasks::TaskControl;

fn holds_turn(session: &Session, slot: Slot) -> bool {
    session.phase() == Phase::Active { turn: Some(slot) }
}

/// Forfeits the local player after `forfeit_after` of holding the turn.
///
/// Armed while the session is active and the turn is `slot`'s. While armed it
/// stamps `slot`'s last-active time every `heartbeat_every`. A new position
/// (turn or board change) restarts the countdown; heartbeats do not. When the
/// countdown runs out the monitor forfeits for `slot` and exits, unless the
/// stored position already moved on. It also exits once the session has a
/// result.
pub struct ForfeitMonitor;

impl ForfeitMonitor {
    pub fn spawn(machine: TurnMachine, slot: Slot, updates: watch::Receiver<Session>, timing: Timing) -> TaskControl {
        TaskControl::spawn("forfeit monitor", move |mut stopped| async move {
            let mut updates = updates;
            let mut last = updates.borrow_and_update().clone();
            let id = last.id.clone();
            let arm = || Instant::now() + timing.forfeit_after;
            let mut deadline = if holds_turn(&last, slot) { Some(arm()) } else { None };
            let mut heartbeat = interval_at(Instant::now() + timing.heartbeat_every, timing.heartbeat_every);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while !last.is_terminal() {
                tokio::select! {
                    _ = &mut stopped => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = updates.borrow_and_update().clone();
                        if !holds_turn(&current, slot) {
                            deadline = None;
                        } else if deadline.is_none() || !current.same_position(&last) {
                            deadline = Some(arm());
                            heartbeat.reset();
                        }
                        last = current;
                    }
                    _ = heartbeat.tick(), if deadline.is_some() => {
                        if let Err(err) = machine.heartbeat(&id, slot, Utc::now()).await {
                            error!("Error stamping activity on {}: {}", id, err);
                        }
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        info!("{:?} ran out of time in session {}, forfeiting", slot, id);
                        match machine.forfeit(&last, slot).await {
                            Ok(Some(_)) => break,
                            // the position moved on; the next snapshot re-arms
                            Ok(None) => deadline = None,
                            Err(err) => {
                                error!("Error forfeiting session {}: {}", id, err);
                                break;
                            }
                        }
                    }
                }
            }
            debug!("forfeit monitor for {} done", id);
        })
    }
}

/// Places a fleet for `slot` when placement is not finished in time.
///
/// The countdown starts once both seats are filled; a host waiting alone is
/// never placed for. Runs until `slot` is ready or the session leaves
/// placement. On expiry a complete saved board is readied as it is; anything
/// less is replaced by a random fleet.
pub struct PlacementTimer;

impl PlacementTimer {
    pub fn spawn(machine: TurnMachine, slot: Slot, updates: watch::Receiver<Session>, timing: Timing) -> TaskControl {
        TaskControl::spawn("placement timer", move |mut stopped| async move {
            let mut updates = updates;
            let waiting = |session: &Session| {
                !session.is_ready(slot) && matches!(session.phase(), Phase::Open | Phase::Placement { .. })
            };
            let arm = |session: &Session| match session.phase() {
                Phase::Placement { .. } => Some(Instant::now() + timing.placement_timeout),
                _ => None,
            };
            let mut current = updates.borrow_and_update().clone();
            let mut deadline = arm(&current);

            while waiting(&current) {
                tokio::select! {
                    _ = &mut stopped => return,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        current = updates.borrow_and_update().clone();
                        if deadline.is_none() {
                            deadline = arm(&current);
                        }
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        info!("placement time is up for {:?} in session {}", slot, current.id);
                        let placed = if ships::fleet_complete(&current.ship_board(slot)) {
                            machine.set_ready(&current.id, slot, None, true).await
                        } else {
                            machine.auto_place(&current.id, slot).await
                        };
                        if let Err(err) = placed {
                            error!("Error placing fleet in session {}: {}", current.id, err);
                        }
                        return;
                    }
                }
            }
        })
    }
}
