//! Queue pages: open rooms, the joinable list, quick match.

use log::{debug, info};

use crate::identity::{resolve_names, IdentityDirectory};
use crate::models::game::{GameKind, NewSession, Session, Slot};
use crate::models::user::RoomListing;
use crate::protocol::machine::{fresh, ProtocolError, Rejection};
use crate::protocol::rules::rules_for;
use crate::protocol::slots::{assign_slot, Seat};
use crate::store::SessionStore;

/// Creates a waiting session of `kind` hosted by `host` as player1.
pub async fn open_room(store: &dyn SessionStore, kind: GameKind, host: &str) -> Result<Session, ProtocolError> {
    if rules_for(kind).is_none() {
        return Err(Rejection::Unsupported(kind).into());
    }
    let session = store
        .create_session(NewSession {
            kind,
            player1: Some(host.to_string()),
        })
        .await?;
    info!("{} opened {} room {}", host, kind.as_str(), session.id);
    Ok(session)
}

/// Joinable rooms of `kind`, oldest first, with host names and records.
pub async fn joinable_rooms(
    store: &dyn SessionStore,
    directory: &dyn IdentityDirectory,
    kind: GameKind,
) -> Result<Vec<RoomListing>, ProtocolError> {
    let rooms = store.joinable_sessions(kind).await?;
    let hosts: Vec<String> = rooms.iter().filter_map(|s| s.player1.clone()).collect();
    let names = resolve_names(directory, &hosts).await;

    let mut listings = Vec::with_capacity(hosts.len());
    for room in rooms {
        let Some(host) = room.player1 else {
            continue;
        };
        let record = store.player_record(kind, &host).await?;
        listings.push(RoomListing {
            id: room.id,
            host_name: names.get(&host).cloned().unwrap_or_default(),
            host,
            record,
        });
    }
    Ok(listings)
}

/// Takes a seat in a listed room.
pub async fn join_room(store: &dyn SessionStore, id: &str, identity: &str) -> Result<Seat, ProtocolError> {
    assign_slot(store, id, identity).await
}

/// First open room wins. Rooms the caller hosts are skipped; if no other room
/// can be joined the caller's own waiting room is reused, else a new one is
/// opened.
pub async fn quick_match(
    store: &dyn SessionStore,
    kind: GameKind,
    identity: &str,
) -> Result<(Session, Seat), ProtocolError> {
    if rules_for(kind).is_none() {
        return Err(Rejection::Unsupported(kind).into());
    }
    let rooms = store.joinable_sessions(kind).await?;
    let mut own = None;
    for room in rooms {
        if room.slot_of(identity).is_some() {
            own.get_or_insert(room);
            continue;
        }
        match assign_slot(store, &room.id, identity).await {
            Ok(Seat::Player(slot)) => {
                let session = fresh(store, &room.id).await?;
                return Ok((session, Seat::Player(slot)));
            }
            // someone else got there first
            Ok(Seat::Spectator) | Err(ProtocolError::Contended(_)) | Err(ProtocolError::NotFound(_)) => {
                debug!("room {} was taken, trying the next", room.id);
            }
            Err(err) => return Err(err),
        }
    }
    let session = match own {
        Some(session) => session,
        None => open_room(store, kind, identity).await?,
    };
    Ok((session, Seat::Player(Slot::Player1)))
}

/// The caller's latest started session of `kind`, polled by the waiting
/// page to know when to move on.
pub async fn started_session_for(
    store: &dyn SessionStore,
    kind: GameKind,
    identity: &str,
) -> Result<Option<Session>, ProtocolError> {
    Ok(store.started_session_for(kind, identity).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticDirectory;
    use crate::models::game::{GameResult, SessionPatch, SessionStatus};
    use crate::store::MemorySessionStore;

    #[tokio::test]
    async fn unsupported_kinds_cannot_be_opened() {
        let store = MemorySessionStore::new();
        let err = open_room(&store, GameKind::Chess, "alice").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected(Rejection::Unsupported(GameKind::Chess))));
    }

    #[tokio::test]
    async fn listing_carries_names_and_records() {
        let store = MemorySessionStore::new();
        let directory = StaticDirectory::new().with("alice", "Alice");

        let past = open_room(&store, GameKind::Ships, "alice").await.unwrap();
        store
            .update_session(
                &past.id,
                SessionPatch::new().claim(Slot::Player2, "bob").finish(GameResult::Player1),
            )
            .await
            .unwrap();
        let open = open_room(&store, GameKind::Ships, "alice").await.unwrap();
        open_room(&store, GameKind::Connect4, "carol").await.unwrap();

        let rooms = joinable_rooms(&store, &directory, GameKind::Ships).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, open.id);
        assert_eq!(rooms[0].host_name, "Alice");
        assert_eq!(rooms[0].record.wins, 1);

        let rooms = joinable_rooms(&store, &directory, GameKind::Connect4).await.unwrap();
        assert_eq!(rooms[0].host_name, "Player_carol");
    }

    #[tokio::test]
    async fn quick_match_joins_the_oldest_room() {
        let store = MemorySessionStore::new();
        let first = open_room(&store, GameKind::Ships, "alice").await.unwrap();
        open_room(&store, GameKind::Ships, "carol").await.unwrap();

        let (session, seat) = quick_match(&store, GameKind::Ships, "bob").await.unwrap();
        assert_eq!(session.id, first.id);
        assert_eq!(seat, Seat::Player(Slot::Player2));
        assert_eq!(session.status, SessionStatus::Ready);

        let started = started_session_for(&store, GameKind::Ships, "alice").await.unwrap();
        assert_eq!(started.map(|s| s.id), Some(first.id));
    }

    #[tokio::test]
    async fn quick_match_without_rooms_opens_one_and_reuses_it() {
        let store = MemorySessionStore::new();
        let (created, seat) = quick_match(&store, GameKind::Connect4, "alice").await.unwrap();
        assert_eq!(seat, Seat::Player(Slot::Player1));
        assert_eq!(created.status, SessionStatus::Waiting);

        let (again, _) = quick_match(&store, GameKind::Connect4, "alice").await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(store.joinable_sessions(GameKind::Connect4).await.unwrap().len(), 1);
    }
}
