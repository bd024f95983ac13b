use axum::{
    routing::{get, post, put},
    Extension, Router,
};
use log::error;

use crate::errors::CustomError;
use crate::models::game::{GameKind, Session, Slot};
use crate::protocol::{ProtocolError, Rejection};
use crate::{AppState, Directory, Store};

pub mod board;
pub mod game;
pub mod server;
pub mod user;

// Define routes
pub fn routes(state: AppState, store: Store, directory: Directory) -> Router {
    Router::new()
        .route("/games", get(server::list_games))
        .route("/cleanup", post(server::cleanup))
        .route("/usernames", post(user::usernames))
        .route("/lobby/:kind", get(game::list_rooms).post(game::open_room))
        .route("/lobby/:kind/quick", post(game::quick_match))
        .route("/lobby/:kind/started", get(game::started_game))
        .route("/game/:id", get(game::get_game))
        .route("/game/:id/join", post(game::join_game))
        .route("/game/:id/move", post(game::make_move))
        .route("/game/:id/surrender", post(game::surrender))
        .route("/game/:id/heartbeat", post(game::heartbeat))
        .route("/game/:id/board", put(board::place_board))
        .route("/game/:id/board/auto", post(board::auto_place))
        .with_state(state)
        .layer(Extension(store))
        .layer(Extension(directory))
}

// Helper to turn a path segment into a game kind
fn game_kind(name: &str) -> Result<GameKind, CustomError> {
    GameKind::from_name(name).ok_or_else(|| {
        error!("Unknown game type: {}", name);
        CustomError::UnknownGame
    })
}

// Helper to fetch a session and the caller's slot in it. Bails out if the caller is not seated.
async fn seated(store: &Store, id: &str, identity: &str) -> Result<(Session, Slot), CustomError> {
    let session = match store.get_session(id).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(CustomError::GameNotFound),
        Err(err) => return Err(ProtocolError::from(err).into()),
    };
    match session.slot_of(identity) {
        Some(slot) => Ok((session, slot)),
        None => Err(CustomError::Rejected(Rejection::NotSeated)),
    }
}
