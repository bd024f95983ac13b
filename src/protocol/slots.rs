use log::info;
use serde::Serialize;

use crate::models::game::{SessionPatch, SessionStatus, Slot};
use crate::protocol::machine::{transition, ProtocolError};
use crate::protocol::rules::rules_for;
use crate::store::SessionStore;

/// Where an identity ends up after entering a session.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Player(Slot),
    /// Both seats are held by others, or the game is over.
    Spectator,
}

impl Seat {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Seat::Player(slot) => Some(*slot),
            Seat::Spectator => None,
        }
    }
}

/// Resolves `identity`'s seat in session `id`, claiming a free one if needed.
///
/// An identity already seated keeps its slot and nothing is written. Otherwise
/// the first empty slot is claimed; the claim that fills the second seat also
/// flips `status` to ready and, for games without a placement phase, gives
/// player1 the first turn. Claims are conditional on the version read, so two
/// callers racing for the same seat cannot both win it.
pub async fn assign_slot(store: &dyn SessionStore, id: &str, identity: &str) -> Result<Seat, ProtocolError> {
    let mut claimed = None;
    let done = transition(store, id, |session| {
        claimed = None;
        if session.slot_of(identity).is_some() || session.is_terminal() {
            return Ok(None);
        }
        let slot = match (&session.player1, &session.player2) {
            (None, _) => Slot::Player1,
            (_, None) => Slot::Player2,
            _ => return Ok(None),
        };
        let mut patch = SessionPatch::new().claim(slot, identity);
        if session.player(slot.other()).is_some() {
            patch = patch.status(SessionStatus::Ready);
            let placement = rules_for(session.kind).map(|rules| rules.needs_placement()).unwrap_or(true);
            if !placement {
                patch = patch.turn(Some(Slot::Player1));
            }
        }
        claimed = Some(slot);
        Ok(Some(patch))
    })
    .await?;

    if let Some(slot) = claimed.filter(|_| done.written) {
        info!("{} claimed {:?} in session {}", identity, slot, id);
    }
    Ok(match done.session.slot_of(identity) {
        Some(slot) => Seat::Player(slot),
        None => Seat::Spectator,
    })
}
