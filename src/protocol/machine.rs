use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;

use crate::models::game::{GameKind, GameResult, Phase, Session, SessionPatch, Slot};
use crate::models::ships::{self, ShipBoard};
use crate::protocol::rules::{rules_for, Advance, GameRules, Move};
use crate::store::{SessionStore, StoreError};

// Fresh reads before a contended write gives up
const ATTEMPTS: usize = 3;

/// A request the protocol refuses. Nothing is written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("the game is not in progress")]
    NotActive,
    #[error("the game is already over")]
    Finished,
    #[error("you are not a player in this game")]
    NotSeated,
    #[error("that move does not belong to this game")]
    WrongMove,
    #[error("cell ({x}, {y}) was already shot")]
    CellResolved { x: usize, y: usize },
    #[error("move is off the board")]
    OutOfBounds,
    #[error("column {0} is full")]
    ColumnFull(usize),
    #[error("the fleet is not completely placed")]
    IncompleteFleet,
    #[error("this game has no placement phase")]
    NoPlacementPhase,
    #[error("placement is over")]
    PlacementClosed,
    #[error("{} cannot be played yet", .0.as_str())]
    Unsupported(GameKind),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {0} kept changing underneath the write")]
    Contended(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ProtocolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ProtocolError::NotFound(id),
            other => ProtocolError::Store(other),
        }
    }
}

/// Result of one read-decide-write cycle.
#[derive(Debug)]
pub(crate) struct Transition {
    pub session: Session,
    /// Whether this call wrote the record, as opposed to finding nothing to do.
    pub written: bool,
}

/// Reads `id` fresh, lets `decide` pick a patch, and writes it on the version
/// that was read. `Ok(None)` from `decide` means no write is needed. On a
/// version conflict the whole decision runs again.
pub(crate) async fn transition<F>(store: &dyn SessionStore, id: &str, mut decide: F) -> Result<Transition, ProtocolError>
where
    F: FnMut(&Session) -> Result<Option<SessionPatch>, ProtocolError>,
{
    for attempt in 1..=ATTEMPTS {
        let session = fresh(store, id).await?;
        let patch = match decide(&session)? {
            Some(patch) if !patch.is_empty() => patch,
            _ => {
                return Ok(Transition {
                    session,
                    written: false,
                })
            }
        };
        match store.update_session_if(id, session.version, patch).await {
            Ok(session) => {
                return Ok(Transition {
                    session,
                    written: true,
                })
            }
            Err(StoreError::Conflict { .. }) => {
                debug!("write to {} lost a race (attempt {}), re-reading", id, attempt);
            }
            Err(err) => return Err(err.into()),
        }
    }
    warn!("giving up on session {} after {} conflicting writes", id, ATTEMPTS);
    Err(ProtocolError::Contended(id.to_string()))
}

pub(crate) async fn fresh(store: &dyn SessionStore, id: &str) -> Result<Session, ProtocolError> {
    store
        .get_session(id)
        .await?
        .ok_or_else(|| ProtocolError::NotFound(id.to_string()))
}

fn rules(session: &Session) -> Result<&'static dyn GameRules, Rejection> {
    rules_for(session.kind).ok_or(Rejection::Unsupported(session.kind))
}

fn seated(session: &Session, slot: Slot) -> Result<(), Rejection> {
    if session.result.is_some() {
        return Err(Rejection::Finished);
    }
    if session.player(slot).is_none() {
        return Err(Rejection::NotSeated);
    }
    Ok(())
}

/// Placement, turns and results of one session store.
#[derive(Clone)]
pub struct TurnMachine {
    store: Arc<dyn SessionStore>,
}

impl TurnMachine {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        TurnMachine { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// The placement toggle. Writes the player's own board (when given) and
    /// readiness flag. Readying needs a complete fleet. The write that sees
    /// the opponent already ready also hands the first turn to player1.
    pub async fn set_ready(
        &self,
        id: &str,
        slot: Slot,
        board: Option<ShipBoard>,
        ready: bool,
    ) -> Result<Session, ProtocolError> {
        let done = transition(self.store.as_ref(), id, |session| {
            seated(session, slot)?;
            if !rules(session)?.needs_placement() {
                return Err(Rejection::NoPlacementPhase.into());
            }
            if let Phase::Active { .. } = session.phase() {
                return Err(Rejection::PlacementClosed.into());
            }
            let fleet = board.clone().unwrap_or_else(|| session.ship_board(slot));
            if ready && !ships::fleet_complete(&fleet) {
                return Err(Rejection::IncompleteFleet.into());
            }
            let mut patch = SessionPatch::new().ready(slot, ready);
            if let Some(board) = &board {
                patch = patch.ship_board(slot, board.clone());
            }
            if ready && session.is_ready(slot.other()) {
                patch = patch.turn(Some(Slot::Player1));
            }
            Ok(Some(patch))
        })
        .await?;
        if done.session.turn.is_some() && ready {
            info!("session {} placement done, player1 to move", id);
        }
        Ok(done.session)
    }

    /// Replaces the player's board with a random fleet and marks them ready.
    pub async fn auto_place(&self, id: &str, slot: Slot) -> Result<Session, ProtocolError> {
        let board = ships::random_fleet(&mut rand::thread_rng());
        self.set_ready(id, slot, Some(board), true).await
    }

    /// Resolves a move by `slot`. Rejected moves write nothing.
    pub async fn submit_move(&self, id: &str, slot: Slot, mv: Move) -> Result<Session, ProtocolError> {
        let done = transition(self.store.as_ref(), id, |session| {
            seated(session, slot)?;
            let rules = rules(session)?;
            match session.phase() {
                Phase::Active { turn: Some(turn) } if turn == slot => {}
                Phase::Active { .. } => return Err(Rejection::NotYourTurn.into()),
                _ => return Err(Rejection::NotActive.into()),
            }
            let resolution = rules.resolve(session, slot, mv)?;
            let patch = resolution.patch.last_active(slot, Utc::now());
            Ok(Some(match resolution.advance {
                Advance::KeepTurn => patch,
                Advance::PassTurn => patch.turn(Some(slot.other())),
                Advance::Finish(result) => patch.finish(result),
            }))
        })
        .await?;
        if let Some(result) = done.session.result {
            info!("session {} finished by a move: {:?}", id, result);
        }
        Ok(done.session)
    }

    /// Concedes the game for `slot`; the opponent wins.
    pub async fn surrender(&self, id: &str, slot: Slot) -> Result<Session, ProtocolError> {
        let done = transition(self.store.as_ref(), id, |session| {
            seated(session, slot)?;
            if session.player(slot.other()).is_none() {
                return Err(Rejection::NotActive.into());
            }
            Ok(Some(SessionPatch::new().finish(slot.other().into())))
        })
        .await?;
        info!("session {}: {:?} surrendered", id, slot);
        Ok(done.session)
    }

    /// Timeout forfeit for `slot`, decided against the position `seen` when
    /// the countdown started. Writes only if the fresh record still shows that
    /// position with `slot` to move; returns the record when it wrote.
    pub async fn forfeit(&self, seen: &Session, slot: Slot) -> Result<Option<Session>, ProtocolError> {
        let done = transition(self.store.as_ref(), &seen.id, |session| {
            if session.result.is_some() || session.turn != Some(slot) || !session.same_position(seen) {
                return Ok(None);
            }
            Ok(Some(SessionPatch::new().finish(slot.other().into())))
        })
        .await?;
        if !done.written {
            debug!("session {} moved on before {:?} timed out", seen.id, slot);
            return Ok(None);
        }
        info!("session {}: {:?} forfeited on time", seen.id, slot);
        Ok(Some(done.session))
    }

    /// Win check on an observed snapshot. If the board is terminal and no
    /// result is recorded yet, commits the verdict. Returns the result this
    /// call wrote, if any; an already recorded result is left as it is.
    pub async fn observe(&self, snapshot: &Session) -> Result<Option<GameResult>, ProtocolError> {
        if snapshot.result.is_some() {
            return Ok(None);
        }
        let Some(rules) = rules_for(snapshot.kind) else {
            return Ok(None);
        };
        if rules.check_terminal(snapshot).is_none() {
            return Ok(None);
        }
        let done = transition(self.store.as_ref(), &snapshot.id, |session| {
            if session.result.is_some() {
                return Ok(None);
            }
            Ok(rules.check_terminal(session).map(|result| SessionPatch::new().finish(result)))
        })
        .await?;
        if done.written {
            info!("session {} result recorded on observation: {:?}", snapshot.id, done.session.result);
            return Ok(done.session.result);
        }
        Ok(None)
    }

    /// Liveness stamp; last write wins.
    pub async fn heartbeat(&self, id: &str, slot: Slot, at: DateTime<Utc>) -> Result<Session, ProtocolError> {
        Ok(self
            .store
            .update_session(id, SessionPatch::new().last_active(slot, at))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connect4;
    use crate::models::game::{NewSession, SessionStatus};
    use crate::models::ships::{place_ship, Cell, Orientation};
    use crate::store::MemorySessionStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn seated_session(store: &MemorySessionStore, kind: GameKind) -> Session {
        let s = store
            .create_session(NewSession {
                kind,
                player1: Some("alice".to_string()),
            })
            .await
            .unwrap();
        let mut patch = SessionPatch::new()
            .claim(Slot::Player2, "bob")
            .status(SessionStatus::Ready);
        if kind == GameKind::Connect4 {
            patch = patch.turn(Some(Slot::Player1));
        }
        store.update_session(&s.id, patch).await.unwrap()
    }

    fn fleet(seed: u64) -> ShipBoard {
        ships::random_fleet(&mut StdRng::seed_from_u64(seed))
    }

    fn find(board: &ShipBoard, cell: Cell) -> (usize, usize) {
        (0..ships::BOARD_SIZE)
            .flat_map(|y| (0..ships::BOARD_SIZE).map(move |x| (x, y)))
            .find(|&(x, y)| board.get(x, y) == Some(&cell))
            .unwrap()
    }

    fn machine() -> (Arc<MemorySessionStore>, TurnMachine) {
        let store = Arc::new(MemorySessionStore::new());
        (store.clone(), TurnMachine::new(store))
    }

    #[tokio::test]
    async fn second_ready_starts_with_player1() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Ships).await;

        let s1 = machine.set_ready(&s.id, Slot::Player2, Some(fleet(1)), true).await.unwrap();
        assert_eq!(s1.turn, None);
        assert_eq!(s1.phase(), Phase::Placement { ready1: false, ready2: true });

        let s2 = machine.set_ready(&s.id, Slot::Player1, Some(fleet(2)), true).await.unwrap();
        assert_eq!(s2.phase(), Phase::Active { turn: Some(Slot::Player1) });
    }

    #[tokio::test]
    async fn ready_needs_a_full_fleet() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Ships).await;
        let partial = place_ship(&ships::empty_board(), 0, 0, 5, Orientation::Horizontal).unwrap();
        let err = machine.set_ready(&s.id, Slot::Player1, Some(partial.clone()), true).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::IncompleteFleet)));

        // not ready with a partial board is just saving progress
        let saved = machine.set_ready(&s.id, Slot::Player1, Some(partial.clone()), false).await.unwrap();
        assert_eq!(saved.board1, Some(partial));
        assert_eq!(saved.ready1, None);
    }

    #[tokio::test]
    async fn auto_place_readies_a_full_fleet() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Ships).await;
        let s = machine.auto_place(&s.id, Slot::Player2).await.unwrap();
        assert!(s.is_ready(Slot::Player2));
        assert!(ships::fleet_complete(&s.ship_board(Slot::Player2)));
    }

    #[tokio::test]
    async fn connect4_has_no_placement() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Connect4).await;
        let err = machine.set_ready(&s.id, Slot::Player1, None, true).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::NoPlacementPhase)));
    }

    #[tokio::test]
    async fn moves_out_of_turn_write_nothing() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Connect4).await;
        let err = machine
            .submit_move(&s.id, Slot::Player2, Move::Drop { column: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::NotYourTurn)));
        assert_eq!(store.get_session(&s.id).await.unwrap().unwrap().version, s.version);
    }

    #[tokio::test]
    async fn connect4_turns_alternate() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Connect4).await;
        let s = machine.submit_move(&s.id, Slot::Player1, Move::Drop { column: 3 }).await.unwrap();
        assert_eq!(s.turn, Some(Slot::Player2));
        assert!(s.player1_last_active.is_some());
        let s = machine.submit_move(&s.id, Slot::Player2, Move::Drop { column: 3 }).await.unwrap();
        assert_eq!(s.turn, Some(Slot::Player1));
        let board = s.disc_board();
        assert_eq!(board.get(3, 5), Some(&Some(Slot::Player1)));
        assert_eq!(board.get(3, 4), Some(&Some(Slot::Player2)));
    }

    #[tokio::test]
    async fn last_disc_without_a_line_is_a_draw() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Connect4).await;

        // everything but the top of column 6, in a pattern with no four in a row
        let mut board = connect4::empty_board();
        for y in 0..connect4::ROWS {
            for x in 0..connect4::COLUMNS {
                if (x, y) == (6, 0) {
                    continue;
                }
                let slot = if (x + y / 2) % 2 == 0 { Slot::Player1 } else { Slot::Player2 };
                board = board.with_cell(x, y, Some(slot)).unwrap();
            }
        }
        store.update_session(&s.id, SessionPatch::new().disc_board(board)).await.unwrap();

        let s = machine.submit_move(&s.id, Slot::Player1, Move::Drop { column: 6 }).await.unwrap();
        assert!(connect4::is_full(&s.disc_board()));
        assert_eq!(s.result, Some(GameResult::Draw));
        assert_eq!(s.turn, None);
    }

    #[tokio::test]
    async fn battleship_hit_keeps_turn_and_miss_passes() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Ships).await;
        let target = fleet(3);
        machine.set_ready(&s.id, Slot::Player2, Some(target.clone()), true).await.unwrap();
        machine.set_ready(&s.id, Slot::Player1, Some(fleet(4)), true).await.unwrap();

        let ship = find(&target, Cell::Ship);
        let water = find(&target, Cell::Empty);

        let s = machine
            .submit_move(&s.id, Slot::Player1, Move::Shot { x: ship.0, y: ship.1 })
            .await
            .unwrap();
        assert_eq!(s.turn, Some(Slot::Player1));
        let s = machine
            .submit_move(&s.id, Slot::Player1, Move::Shot { x: water.0, y: water.1 })
            .await
            .unwrap();
        assert_eq!(s.turn, Some(Slot::Player2));

        let err = machine
            .submit_move(&s.id, Slot::Player2, Move::Drop { column: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::WrongMove)));
    }

    #[tokio::test]
    async fn forfeit_only_on_the_position_that_timed_out() {
        let (store, machine) = machine();
        let seen = seated_session(&store, GameKind::Connect4).await;

        // player1 moved after the countdown started
        let moved = machine.submit_move(&seen.id, Slot::Player1, Move::Drop { column: 0 }).await.unwrap();
        assert_eq!(machine.forfeit(&seen, Slot::Player1).await.unwrap(), None);
        assert_eq!(machine.forfeit(&moved, Slot::Player1).await.unwrap(), None);
        assert_eq!(store.get_session(&seen.id).await.unwrap().unwrap().version, moved.version);

        let done = machine.forfeit(&moved, Slot::Player2).await.unwrap().unwrap();
        assert_eq!(done.result, Some(GameResult::Player1));
        assert_eq!(done.turn, None);
        assert_eq!(machine.forfeit(&moved, Slot::Player2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn surrender_hands_the_win_over_and_is_final() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Connect4).await;
        let s = machine.surrender(&s.id, Slot::Player2).await.unwrap();
        assert_eq!(s.result, Some(GameResult::Player1));
        assert_eq!(s.turn, None);

        let err = machine.surrender(&s.id, Slot::Player1).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::Finished)));
        let err = machine
            .submit_move(&s.id, Slot::Player1, Move::Drop { column: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::Finished)));
    }

    #[tokio::test]
    async fn observe_commits_once() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Connect4).await;
        let s = store
            .update_session(&s.id, SessionPatch::new().disc_board(bottom_row_for(Slot::Player2)))
            .await
            .unwrap();

        assert_eq!(machine.observe(&s).await.unwrap(), Some(GameResult::Player2));
        // the second observer sees the stored result and leaves it
        assert_eq!(machine.observe(&s).await.unwrap(), None);
        let stored = store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(stored.result, Some(GameResult::Player2));
        assert_eq!(stored.version, s.version + 1);
    }

    fn bottom_row_for(slot: Slot) -> connect4::DiscBoard {
        let mut board = connect4::empty_board();
        for column in 0..4 {
            board = connect4::drop_disc(&board, column, slot).unwrap().0;
        }
        board
    }

    #[tokio::test]
    async fn observe_ignores_ongoing_games() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Ships).await;
        assert_eq!(machine.observe(&s).await.unwrap(), None);
        assert_eq!(store.get_session(&s.id).await.unwrap().unwrap().version, s.version);
    }

    #[tokio::test]
    async fn unknown_session_and_offline_store() {
        let (store, machine) = machine();
        assert!(matches!(
            machine.surrender("nope", Slot::Player1).await,
            Err(ProtocolError::NotFound(_))
        ));
        store.set_offline(true);
        assert!(matches!(
            machine.surrender("nope", Slot::Player1).await,
            Err(ProtocolError::Store(StoreError::Unavailable))
        ));
    }

    #[tokio::test]
    async fn heartbeat_stamps_own_slot() {
        let (store, machine) = machine();
        let s = seated_session(&store, GameKind::Ships).await;
        let now = Utc::now();
        let s = machine.heartbeat(&s.id, Slot::Player2, now).await.unwrap();
        assert_eq!(s.player2_last_active, Some(now));
        assert_eq!(s.player1_last_active, None);
    }
}
