use axum::{
    extract::{Path, State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use log::{error, info};
use serde::Serialize;

use crate::check_access;
use crate::controllers::{game_kind, seated};
use crate::errors::CustomError;
use crate::models::board::Grid;
use crate::models::connect4::DiscBoard;
use crate::models::game::{GameKind, GameResult, Session, SessionStatus, Slot};
use crate::models::ships::{self, FogCell, ShipBoard};
use crate::models::user::RoomListing;
use crate::protocol::{assign_slot, lobby, Move, Seat, TurnMachine};
use crate::{AppState, Directory, Store};

// The struct used to respond with one player's view of a game as json.
// The opponent's Battleship board only shows resolved shots.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GameView {
    pub id: String,
    pub kind: GameKind,
    pub player1: Option<String>,
    pub player2: Option<String>,
    pub status: SessionStatus,
    pub seat: Seat,
    pub own_board: Option<ShipBoard>,
    pub opponent_board: Option<Grid<FogCell>>,
    pub board: Option<DiscBoard>,
    pub ready1: Option<bool>,
    pub ready2: Option<bool>,
    pub turn: Option<Slot>,
    pub result: Option<GameResult>,
    pub version: u64,
}

impl GameView {
    pub fn new(session: Session, seat: Seat) -> GameView {
        let (own_board, opponent_board) = match (session.kind, seat) {
            (GameKind::Ships, Seat::Player(slot)) => (
                Some(session.ship_board(slot)),
                Some(ships::masked(&session.ship_board(slot.other()))),
            ),
            _ => (None, None),
        };
        let board = match session.kind {
            GameKind::Connect4 => Some(session.disc_board()),
            _ => None,
        };
        GameView {
            id: session.id,
            kind: session.kind,
            player1: session.player1,
            player2: session.player2,
            status: session.status,
            seat,
            own_board,
            opponent_board,
            board,
            ready1: session.ready1,
            ready2: session.ready2,
            turn: session.turn,
            result: session.result,
            version: session.version,
        }
    }

    pub fn for_identity(session: Session, identity: &str) -> GameView {
        let seat = match session.slot_of(identity) {
            Some(slot) => Seat::Player(slot),
            None => Seat::Spectator,
        };
        GameView::new(session, seat)
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for listing the joinable rooms of a game type, with host names and records
pub async fn list_rooms(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    Extension(directory): Extension<Directory>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<RoomListing>>, CustomError> {
    info!("list rooms request");

    check_access(&state, &bearer, false).await?;
    let kind = game_kind(&kind)?;

    let rooms = lobby::joinable_rooms(store.as_ref(), directory.as_ref(), kind).await?;
    Ok(Json(rooms))
}

//handler for opening a new room, the caller becomes player1
pub async fn open_room(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<(StatusCode, Json<GameView>), CustomError> {
    info!("open room request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let kind = game_kind(&kind)?;

    let session = lobby::open_room(store.as_ref(), kind, &user_name).await?;
    Ok((StatusCode::CREATED, Json(GameView::new(session, Seat::Player(Slot::Player1)))))
}

//handler for quick match: join the first open room or open one
pub async fn quick_match(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<GameView>, CustomError> {
    info!("quick match request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let kind = game_kind(&kind)?;

    let (session, seat) = lobby::quick_match(store.as_ref(), kind, &user_name).await?;
    Ok(Json(GameView::new(session, seat)))
}

//handler polled by the waiting page: the caller's started game, if any
pub async fn started_game(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Response, CustomError> {
    info!("started game request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let kind = game_kind(&kind)?;

    match lobby::started_session_for(store.as_ref(), kind, &user_name).await? {
        Some(session) => Ok(Json(GameView::for_identity(session, &user_name)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for entering a game: resolves (or claims) the caller's seat
pub async fn join_game(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<GameView>, CustomError> {
    info!("join game request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;

    let seat = assign_slot(store.as_ref(), &id, &user_name).await?;
    let session = match store.get_session(&id).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(CustomError::GameNotFound),
        Err(err) => {
            error!("Error reading game after join: {:?}", err);
            return Err(CustomError::StoreUnavailable);
        }
    };
    Ok(Json(GameView::new(session, seat)))
}

//handler for reading the caller's view of a game
pub async fn get_game(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<GameView>, CustomError> {
    info!("get game request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;

    match store.get_session(&id).await {
        Ok(Some(session)) => Ok(Json(GameView::for_identity(session, &user_name))),
        Ok(None) => Err(CustomError::GameNotFound),
        Err(err) => {
            error!("Error reading game: {:?}", err);
            Err(CustomError::StoreUnavailable)
        }
    }
}

//handler for a shot or a disc drop
pub async fn make_move(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(mv): Json<Move>,
) -> Result<Json<GameView>, CustomError> {
    info!("move request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let (_, slot) = seated(&store, &id, &user_name).await?;

    let session = TurnMachine::new(store).submit_move(&id, slot, mv).await?;
    Ok(Json(GameView::new(session, Seat::Player(slot))))
}

//handler for giving up, the opponent wins
pub async fn surrender(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<GameView>, CustomError> {
    info!("surrender request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let (_, slot) = seated(&store, &id, &user_name).await?;

    let session = TurnMachine::new(store).surrender(&id, slot).await?;
    Ok(Json(GameView::new(session, Seat::Player(slot))))
}

//handler for the liveness stamp sent while holding the turn
pub async fn heartbeat(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<StatusCode, CustomError> {
    info!("heartbeat request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let (session, slot) = seated(&store, &id, &user_name).await?;
    if session.is_terminal() {
        return Ok(StatusCode::NO_CONTENT);
    }

    TurnMachine::new(store).heartbeat(&id, slot, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::tests::{bearer, directory, state, store};
    use crate::models::ships::Cell;
    use crate::protocol::Rejection;

    #[tokio::test]
    async fn room_lifecycle_over_http_handlers() {
        let store = store();
        let (status, Json(created)) = open_room(
            Path("connect4".to_string()),
            State(state()),
            Extension(store.clone()),
            bearer("alice", false),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(rooms) = list_rooms(
            Path("connect4".to_string()),
            State(state()),
            Extension(store.clone()),
            Extension(directory()),
            bearer("bob", false),
        )
        .await
        .unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].host_name, "Alice");

        let Json(joined) = join_game(
            Path(created.id.clone()),
            State(state()),
            Extension(store.clone()),
            bearer("bob", false),
        )
        .await
        .unwrap();
        assert_eq!(joined.seat, Seat::Player(Slot::Player2));
        assert_eq!(joined.turn, Some(Slot::Player1));

        let err = make_move(
            Path(created.id.clone()),
            State(state()),
            Extension(store.clone()),
            bearer("bob", false),
            Json(Move::Drop { column: 0 }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CustomError::Rejected(Rejection::NotYourTurn)));

        let Json(view) = make_move(
            Path(created.id.clone()),
            State(state()),
            Extension(store.clone()),
            bearer("alice", false),
            Json(Move::Drop { column: 0 }),
        )
        .await
        .unwrap();
        assert_eq!(view.turn, Some(Slot::Player2));
        assert_eq!(view.board.unwrap().get(0, 5), Some(&Some(Slot::Player1)));
    }

    #[tokio::test]
    async fn opponent_board_is_masked() {
        let store = store();
        let session = lobby::open_room(store.as_ref(), GameKind::Ships, "alice").await.unwrap();
        assign_slot(store.as_ref(), &session.id, "bob").await.unwrap();
        let machine = TurnMachine::new(store.clone());
        machine.auto_place(&session.id, Slot::Player1).await.unwrap();
        machine.auto_place(&session.id, Slot::Player2).await.unwrap();

        let Json(view) = get_game(
            Path(session.id.clone()),
            State(state()),
            Extension(store.clone()),
            bearer("alice", false),
        )
        .await
        .unwrap();
        let own = view.own_board.unwrap();
        assert_eq!(own.cells().filter(|c| **c == Cell::Ship).count(), 17);
        let opponent = view.opponent_board.unwrap();
        assert!(opponent.cells().all(|c| *c == FogCell::Unknown));

        let Json(spectator) = get_game(
            Path(session.id.clone()),
            State(state()),
            Extension(store),
            bearer("carol", false),
        )
        .await
        .unwrap();
        assert_eq!(spectator.seat, Seat::Spectator);
        assert!(spectator.own_board.is_none() && spectator.opponent_board.is_none());
    }

    #[tokio::test]
    async fn unknown_game_and_missing_session() {
        let store = store();
        let err = open_room(
            Path("checkers".to_string()),
            State(state()),
            Extension(store.clone()),
            bearer("alice", false),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CustomError::UnknownGame));

        let err = surrender(Path("nope".to_string()), State(state()), Extension(store), bearer("alice", false))
            .await
            .unwrap_err();
        assert!(matches!(err, CustomError::GameNotFound));
    }

    #[tokio::test]
    async fn started_game_is_no_content_until_joined() {
        let store = store();
        let response = started_game(
            Path("ships".to_string()),
            State(state()),
            Extension(store.clone()),
            bearer("alice", false),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let Json(view) = quick_match(
            Path("ships".to_string()),
            State(state()),
            Extension(store.clone()),
            bearer("alice", false),
        )
        .await
        .unwrap();
        quick_match(Path("ships".to_string()), State(state()), Extension(store.clone()), bearer("bob", false))
            .await
            .unwrap();
        let response = started_game(Path("ships".to_string()), State(state()), Extension(store), bearer("alice", false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(view.seat, Seat::Player(Slot::Player1));
    }
}
