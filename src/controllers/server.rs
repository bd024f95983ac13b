use axum::{
    extract::{State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    Extension, Json,
};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};

use crate::check_access;
use crate::errors::CustomError;
use crate::models::game::GameKind;
use crate::protocol::sweep::{sweep_inactive, SweepReport};
use crate::{AppState, Store};

// The struct used to respond with one entry of the game catalogue
#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct CatalogEntry {
    pub kind: GameKind,
    pub playable: bool,
}

//handler for the game catalogue. this request can be done without any auth
pub async fn list_games() -> Json<Vec<CatalogEntry>> {
    info!("game catalogue request");

    Json(
        GameKind::ALL
            .into_iter()
            .map(|kind| CatalogEntry {
                kind,
                playable: kind.is_playable(),
            })
            .collect(),
    )
}

// Handler for resolving abandoned games. First check if the user doing this has an admin Bearer token.
pub async fn cleanup(
    State(state): State<AppState>,
    Extension(store): Extension<Store>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<SweepReport>, CustomError> {
    info!("cleanup request");

    check_access(&state, &bearer, true).await?;

    let report = sweep_inactive(store.as_ref(), Utc::now(), state.sweep_timeout).await?;
    Ok(Json(report))
}
