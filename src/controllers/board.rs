use axum::{
    extract::{Path, State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    Extension, Json,
};
use log::info;
use serde::{Deserialize, Serialize};

use crate::check_access;
use crate::controllers::game::GameView;
use crate::controllers::seated;
use crate::errors::CustomError;
use crate::models::ships::ShipBoard;
use crate::protocol::{Seat, TurnMachine};
use crate::{AppState, Store};

// The struct used for saving a fleet and toggling readiness.
// Without a board only the readiness flag changes.
#[derive(Deserialize, Serialize, Debug)]
pub struct Placement {
    #[serde(default)]
    pub board: Option<ShipBoard>,
    pub ready: bool,
}

//handler for the placement phase: write the caller's own board and ready flag
pub async fn place_board(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(placement): Json<Placement>,
) -> Result<Json<GameView>, CustomError> {
    info!("place board request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let (_, slot) = seated(&store, &id, &user_name).await?;

    let session = TurnMachine::new(store)
        .set_ready(&id, slot, placement.board, placement.ready)
        .await?;
    Ok(Json(GameView::new(session, Seat::Player(slot))))
}

//handler for random placement, marks the caller ready
pub async fn auto_place(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<GameView>, CustomError> {
    info!("auto place request");

    let (user_name, _) = check_access(&state, &bearer, false).await?;
    let (_, slot) = seated(&store, &id, &user_name).await?;

    let session = TurnMachine::new(store).auto_place(&id, slot).await?;
    Ok(Json(GameView::new(session, Seat::Player(slot))))
}
