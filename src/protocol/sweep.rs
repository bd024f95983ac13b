use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::models::game::{GameResult, Session, SessionPatch, Slot};
use crate::protocol::machine::{transition, ProtocolError};
use crate::store::SessionStore;

// The struct used to respond with what a sweep resolved as json
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub timestamp: DateTime<Utc>,
    pub timeout_minutes: u64,
    /// Sessions resolved per game kind.
    pub resolved: BTreeMap<String, usize>,
    pub total: usize,
}

/// The verdict for an unfinished session given the staleness cutoff. A side
/// is stale only if it has a heartbeat and that heartbeat is older than
/// `cutoff`. Both stale is a draw; one stale loses to the other.
pub fn adjudicate(session: &Session, cutoff: DateTime<Utc>) -> Option<GameResult> {
    if session.result.is_some() {
        return None;
    }
    let stale = |slot: Slot| session.last_active(slot).map(|at| at < cutoff).unwrap_or(false);
    match (stale(Slot::Player1), stale(Slot::Player2)) {
        (true, true) => Some(GameResult::Draw),
        (true, false) => Some(GameResult::Player2),
        (false, true) => Some(GameResult::Player1),
        (false, false) => None,
    }
}

/// Resolves every session abandoned for longer than `timeout` as of `now`.
/// A session that fails to resolve is logged and skipped.
pub async fn sweep_inactive(
    store: &dyn SessionStore,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<SweepReport, ProtocolError> {
    let mut report = SweepReport {
        timestamp: now,
        timeout_minutes: timeout.as_secs() / 60,
        resolved: BTreeMap::new(),
        total: 0,
    };
    // a cutoff before the earliest representable time leaves nothing stale
    let Some(cutoff) = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
    else {
        warn!("sweep timeout of {} minutes reaches past any activity", report.timeout_minutes);
        return Ok(report);
    };

    for stale in store.stale_sessions(cutoff).await? {
        let resolved = transition(store, &stale.id, |session| {
            Ok(adjudicate(session, cutoff).map(|result| SessionPatch::new().finish(result)))
        })
        .await;
        match resolved {
            Ok(done) if done.written => {
                info!("session {} resolved as {:?} after inactivity", stale.id, done.session.result);
                *report.resolved.entry(stale.kind.as_str().to_string()).or_insert(0) += 1;
                report.total += 1;
            }
            Ok(_) => {}
            Err(err) => error!("Error resolving inactive session {}: {}", stale.id, err),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::tests::session;
    use crate::models::game::{GameKind, NewSession};
    use crate::store::MemorySessionStore;

    #[test]
    fn verdicts_follow_staleness() {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::minutes(2);
        let old = now - chrono::Duration::minutes(10);
        let mut s = session(GameKind::Ships);
        assert_eq!(adjudicate(&s, cutoff), None);

        s.player1_last_active = Some(old);
        assert_eq!(adjudicate(&s, cutoff), Some(GameResult::Player2));
        s.player2_last_active = Some(now);
        assert_eq!(adjudicate(&s, cutoff), Some(GameResult::Player2));
        s.player2_last_active = Some(old);
        assert_eq!(adjudicate(&s, cutoff), Some(GameResult::Draw));

        s.result = Some(GameResult::Player1);
        assert_eq!(adjudicate(&s, cutoff), None);
    }

    #[tokio::test]
    async fn sweep_counts_per_kind() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let old = now - chrono::Duration::minutes(5);

        for (kind, p1, p2) in [
            (GameKind::Ships, Some(old), Some(now)),
            (GameKind::Ships, Some(old), Some(old)),
            (GameKind::Connect4, None, Some(old)),
            (GameKind::Connect4, Some(now), Some(now)),
        ] {
            let s = store
                .create_session(NewSession {
                    kind,
                    player1: Some("alice".to_string()),
                })
                .await
                .unwrap();
            let mut patch = SessionPatch::new().claim(Slot::Player2, "bob");
            patch.player1_last_active = Some(p1);
            patch.player2_last_active = Some(p2);
            store.update_session(&s.id, patch).await.unwrap();
        }

        let report = sweep_inactive(&store, now, Duration::from_secs(120)).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.timeout_minutes, 2);
        assert_eq!(report.resolved["ships"], 2);
        assert_eq!(report.resolved["connect4"], 1);

        // a second pass finds nothing left to do
        let again = sweep_inactive(&store, now, Duration::from_secs(120)).await.unwrap();
        assert_eq!(again.total, 0);
    }

    #[tokio::test]
    async fn timeout_past_the_calendar_resolves_nothing() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let s = store
            .create_session(NewSession {
                kind: GameKind::Ships,
                player1: Some("alice".to_string()),
            })
            .await
            .unwrap();
        let mut patch = SessionPatch::new().claim(Slot::Player2, "bob");
        patch.player1_last_active = Some(Some(now - chrono::Duration::days(365)));
        store.update_session(&s.id, patch).await.unwrap();

        let report = sweep_inactive(&store, now, Duration::from_secs(u64::MAX)).await.unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(store.get_session(&s.id).await.unwrap().unwrap().result, None);
    }
}
