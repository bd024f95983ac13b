//! The game session protocol: who sits where, whose turn it is, how a move
//! becomes a write, and how a session ends.
//!
//! Every decision follows the same cycle: read the session fresh, decide,
//! write conditionally on the version that was read. A lost race re-runs the
//! decision on the newer record.

pub mod lobby;
pub mod machine;
pub mod monitor;
pub mod player;
pub mod rules;
pub mod slots;
pub mod sweep;
pub mod sync;

pub use machine::{ProtocolError, Rejection, TurnMachine};
pub use rules::{rules_for, GameRules, Move};
pub use slots::{assign_slot, Seat};
