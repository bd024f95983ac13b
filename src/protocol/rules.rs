//! Per-game move resolution behind one interface, so the turn machine never
//! needs to know which board it is driving.

use serde::{Deserialize, Serialize};

use crate::models::board::BoardError;
use crate::models::connect4;
use crate::models::game::{GameKind, GameResult, Session, SessionPatch, Slot};
use crate::models::ships::{self, ShotOutcome};
use crate::protocol::Rejection;

/// A move as submitted by a player.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Move {
    /// Fire at `(x, y)` on the opponent's Battleship board.
    Shot { x: usize, y: usize },
    /// Drop a disc into a Connect-4 column.
    Drop { column: usize },
}

/// What happens to the turn after a resolved move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The mover goes again (a Battleship hit).
    KeepTurn,
    PassTurn,
    Finish(GameResult),
}

/// Board changes of a resolved move plus the turn consequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub patch: SessionPatch,
    pub advance: Advance,
}

pub trait GameRules: Send + Sync {
    fn kind(&self) -> GameKind;

    /// Whether players arrange pieces privately before the first move.
    fn needs_placement(&self) -> bool;

    /// Applies `mv` by `mover` to the boards in `session`. Turn and result
    /// guards are the caller's job; this only judges the move itself.
    fn resolve(&self, session: &Session, mover: Slot, mv: Move) -> Result<Resolution, Rejection>;

    /// The verdict a board position implies, if it is terminal.
    fn check_terminal(&self, session: &Session) -> Option<GameResult>;
}

pub struct Battleship;

impl GameRules for Battleship {
    fn kind(&self) -> GameKind {
        GameKind::Ships
    }

    fn needs_placement(&self) -> bool {
        true
    }

    fn resolve(&self, session: &Session, mover: Slot, mv: Move) -> Result<Resolution, Rejection> {
        let (x, y) = match mv {
            Move::Shot { x, y } => (x, y),
            Move::Drop { .. } => return Err(Rejection::WrongMove),
        };
        let target = mover.other();
        let board = session.ship_board(target);
        if !board.contains(x, y) {
            return Err(Rejection::OutOfBounds);
        }
        let shot = ships::resolve_shot(&board, x, y);
        let advance = match shot.outcome {
            ShotOutcome::Invalid => return Err(Rejection::CellResolved { x, y }),
            ShotOutcome::Miss => Advance::PassTurn,
            ShotOutcome::Hit if ships::all_sunk(&shot.board) => Advance::Finish(mover.into()),
            ShotOutcome::Hit => Advance::KeepTurn,
        };
        Ok(Resolution {
            patch: SessionPatch::new().ship_board(target, shot.board),
            advance,
        })
    }

    fn check_terminal(&self, session: &Session) -> Option<GameResult> {
        if ships::defeated(&session.ship_board(Slot::Player2)) {
            Some(GameResult::Player1)
        } else if ships::defeated(&session.ship_board(Slot::Player1)) {
            Some(GameResult::Player2)
        } else {
            None
        }
    }
}

pub struct ConnectFour;

impl GameRules for ConnectFour {
    fn kind(&self) -> GameKind {
        GameKind::Connect4
    }

    fn needs_placement(&self) -> bool {
        false
    }

    fn resolve(&self, session: &Session, mover: Slot, mv: Move) -> Result<Resolution, Rejection> {
        let column = match mv {
            Move::Drop { column } => column,
            Move::Shot { .. } => return Err(Rejection::WrongMove),
        };
        let (board, _) = connect4::drop_disc(&session.disc_board(), column, mover).map_err(|err| match err {
            BoardError::ColumnFull(column) => Rejection::ColumnFull(column),
            _ => Rejection::OutOfBounds,
        })?;
        let advance = if connect4::check_line(&board, mover) {
            Advance::Finish(mover.into())
        } else if connect4::is_full(&board) {
            Advance::Finish(GameResult::Draw)
        } else {
            Advance::PassTurn
        };
        Ok(Resolution {
            patch: SessionPatch::new().disc_board(board),
            advance,
        })
    }

    fn check_terminal(&self, session: &Session) -> Option<GameResult> {
        let board = session.disc_board();
        if connect4::check_line(&board, Slot::Player1) {
            Some(GameResult::Player1)
        } else if connect4::check_line(&board, Slot::Player2) {
            Some(GameResult::Player2)
        } else if connect4::is_full(&board) {
            Some(GameResult::Draw)
        } else {
            None
        }
    }
}

/// Rules for a game kind; `None` for kinds that are only listed.
pub fn rules_for(kind: GameKind) -> Option<&'static dyn GameRules> {
    match kind {
        GameKind::Ships => Some(&Battleship),
        GameKind::Connect4 => Some(&ConnectFour),
        GameKind::TicTacToe | GameKind::Chess => None,
    }
}
