use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::connect4::{self, DiscBoard};
use crate::models::ships::{self, ShipBoard};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Ships,
    Connect4,
    TicTacToe,
    Chess,
}

impl GameKind {
    pub const ALL: [GameKind; 4] = [GameKind::Ships, GameKind::Connect4, GameKind::TicTacToe, GameKind::Chess];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Ships => "ships",
            GameKind::Connect4 => "connect4",
            GameKind::TicTacToe => "tictactoe",
            GameKind::Chess => "chess",
        }
    }

    pub fn from_name(name: &str) -> Option<GameKind> {
        GameKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    // Tic-tac-toe and chess are listed in the catalogue only
    pub fn is_playable(&self) -> bool {
        matches!(self, GameKind::Ships | GameKind::Connect4)
    }
}

/// The player1/player2 role within a session.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Player1,
    Player2,
}

impl Slot {
    pub fn other(&self) -> Slot {
        match self {
            Slot::Player1 => Slot::Player2,
            Slot::Player2 => Slot::Player1,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Player1,
    Player2,
    Draw,
}

impl GameResult {
    pub fn winner(&self) -> Option<Slot> {
        match self {
            GameResult::Player1 => Some(Slot::Player1),
            GameResult::Player2 => Some(Slot::Player2),
            GameResult::Draw => None,
        }
    }
}

impl From<Slot> for GameResult {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::Player1 => GameResult::Player1,
            Slot::Player2 => GameResult::Player2,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Ready,
}

// Column codes used by the relational store
macro_rules! column_codes {
    ($ty:ty { $($variant:path => $code:literal),+ $(,)? }) => {
        impl From<$ty> for u8 {
            fn from(value: $ty) -> u8 {
                match value { $($variant => $code),+ }
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = u8;

            fn try_from(code: u8) -> Result<Self, u8> {
                match code {
                    $($code => Ok($variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

column_codes!(GameKind { GameKind::Ships => 0, GameKind::Connect4 => 1, GameKind::TicTacToe => 2, GameKind::Chess => 3 });
column_codes!(Slot { Slot::Player1 => 1, Slot::Player2 => 2 });
column_codes!(GameResult { GameResult::Player1 => 1, GameResult::Player2 => 2, GameResult::Draw => 3 });
column_codes!(SessionStatus { SessionStatus::Waiting => 0, SessionStatus::Ready => 1 });

/// Where a session stands in its lifecycle, derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Both seats are not yet filled.
    Open,
    /// Players arrange their fleets; the flags say who is done.
    Placement { ready1: bool, ready2: bool },
    /// Players alternate; `turn` names who may move.
    Active { turn: Option<Slot> },
    Finished(GameResult),
}

/// One persisted game instance shared by two identities.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Session {
    pub id: String,
    pub kind: GameKind,
    pub player1: Option<String>,
    pub player2: Option<String>,
    pub status: SessionStatus,
    pub board1: Option<ShipBoard>,
    pub board2: Option<ShipBoard>,
    pub board: Option<DiscBoard>,
    pub ready1: Option<bool>,
    pub ready2: Option<bool>,
    pub turn: Option<Slot>,
    pub result: Option<GameResult>,
    pub player1_last_active: Option<DateTime<Utc>>,
    pub player2_last_active: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn player(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Player1 => self.player1.as_deref(),
            Slot::Player2 => self.player2.as_deref(),
        }
    }

    pub fn slot_of(&self, identity: &str) -> Option<Slot> {
        if self.player1.as_deref() == Some(identity) {
            Some(Slot::Player1)
        } else if self.player2.as_deref() == Some(identity) {
            Some(Slot::Player2)
        } else {
            None
        }
    }

    // Readiness is tri-state in storage; only `Some(true)` counts
    pub fn is_ready(&self, slot: Slot) -> bool {
        let flag = match slot {
            Slot::Player1 => self.ready1,
            Slot::Player2 => self.ready2,
        };
        flag == Some(true)
    }

    /// The Battleship board belonging to `slot`. A missing board reads as a
    /// fresh empty one.
    pub fn ship_board(&self, slot: Slot) -> ShipBoard {
        let board = match slot {
            Slot::Player1 => self.board1.as_ref(),
            Slot::Player2 => self.board2.as_ref(),
        };
        board.cloned().unwrap_or_else(ships::empty_board)
    }

    pub fn disc_board(&self) -> DiscBoard {
        self.board.clone().unwrap_or_else(connect4::empty_board)
    }

    pub fn last_active(&self, slot: Slot) -> Option<DateTime<Utc>> {
        match slot {
            Slot::Player1 => self.player1_last_active,
            Slot::Player2 => self.player2_last_active,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_joinable(&self) -> bool {
        self.status == SessionStatus::Waiting && self.player2.is_none() && self.result.is_none()
    }

    pub fn phase(&self) -> Phase {
        if let Some(result) = self.result {
            return Phase::Finished(result);
        }
        if self.player1.is_none() || self.player2.is_none() {
            return Phase::Open;
        }
        if self.kind == GameKind::Ships {
            let (ready1, ready2) = (self.is_ready(Slot::Player1), self.is_ready(Slot::Player2));
            if !(ready1 && ready2) {
                return Phase::Placement { ready1, ready2 };
            }
        }
        Phase::Active { turn: self.turn }
    }

    /// True when both records show the same position: same turn holder and
    /// same boards. Heartbeats and seat changes do not count.
    pub fn same_position(&self, other: &Session) -> bool {
        self.turn == other.turn
            && self.result == other.result
            && self.board1 == other.board1
            && self.board2 == other.board2
            && self.board == other.board
    }
}

/// Initial fields for a new session row.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct NewSession {
    pub kind: GameKind,
    pub player1: Option<String>,
}

/// A partial update. The outer `Option` says whether a field is written, the
/// inner one is the (possibly null) value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionPatch {
    pub player1: Option<Option<String>>,
    pub player2: Option<Option<String>>,
    pub status: Option<SessionStatus>,
    pub board1: Option<Option<ShipBoard>>,
    pub board2: Option<Option<ShipBoard>>,
    pub board: Option<Option<DiscBoard>>,
    pub ready1: Option<Option<bool>>,
    pub ready2: Option<Option<bool>>,
    pub turn: Option<Option<Slot>>,
    pub result: Option<Option<GameResult>>,
    pub player1_last_active: Option<Option<DateTime<Utc>>>,
    pub player2_last_active: Option<Option<DateTime<Utc>>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(mut self, slot: Slot, identity: &str) -> Self {
        match slot {
            Slot::Player1 => self.player1 = Some(Some(identity.to_string())),
            Slot::Player2 => self.player2 = Some(Some(identity.to_string())),
        }
        self
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn ship_board(mut self, slot: Slot, board: ShipBoard) -> Self {
        match slot {
            Slot::Player1 => self.board1 = Some(Some(board)),
            Slot::Player2 => self.board2 = Some(Some(board)),
        }
        self
    }

    pub fn disc_board(mut self, board: DiscBoard) -> Self {
        self.board = Some(Some(board));
        self
    }

    /// Not ready is stored as null, never false.
    pub fn ready(mut self, slot: Slot, ready: bool) -> Self {
        let flag = if ready { Some(true) } else { None };
        match slot {
            Slot::Player1 => self.ready1 = Some(flag),
            Slot::Player2 => self.ready2 = Some(flag),
        }
        self
    }

    pub fn turn(mut self, turn: Option<Slot>) -> Self {
        self.turn = Some(turn);
        self
    }

    /// Terminal write: sets the result and clears the turn.
    pub fn finish(mut self, result: GameResult) -> Self {
        self.result = Some(Some(result));
        self.turn = Some(None);
        self
    }

    pub fn last_active(mut self, slot: Slot, at: DateTime<Utc>) -> Self {
        match slot {
            Slot::Player1 => self.player1_last_active = Some(Some(at)),
            Slot::Player2 => self.player2_last_active = Some(Some(at)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == SessionPatch::default()
    }

    /// Applies the written fields to an in-memory record. The version is the
    /// store's business and is left alone.
    pub fn apply_to(&self, session: &mut Session) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        set(&mut session.player1, &self.player1);
        set(&mut session.player2, &self.player2);
        set(&mut session.status, &self.status);
        set(&mut session.board1, &self.board1);
        set(&mut session.board2, &self.board2);
        set(&mut session.board, &self.board);
        set(&mut session.ready1, &self.ready1);
        set(&mut session.ready2, &self.ready2);
        set(&mut session.turn, &self.turn);
        set(&mut session.result, &self.result);
        set(&mut session.player1_last_active, &self.player1_last_active);
        set(&mut session.player2_last_active, &self.player2_last_active);
    }
}
