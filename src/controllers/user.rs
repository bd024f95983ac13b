use std::collections::BTreeMap;

use axum::{
    extract::{State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    Extension, Json,
};
use log::info;

use crate::check_access;
use crate::errors::CustomError;
use crate::identity::resolve_names;
use crate::models::user::UsernamesRequest;
use crate::{AppState, Directory};

// Upper bound on ids resolved by one request
const MAX_IDS: usize = 100;

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler resolving a batch of identity ids to display names. Ids without a usable name get the
//synthetic Player_ name, so every requested id is present in the answer
///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn usernames(
    State(state): State<AppState>,
    Extension(directory): Extension<Directory>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<UsernamesRequest>,
) -> Result<Json<BTreeMap<String, String>>, CustomError> {
    info!("usernames request for {} ids", request.user_ids.len());

    check_access(&state, &bearer, false).await?;
    if request.user_ids.len() > MAX_IDS {
        return Err(CustomError::BadRequest);
    }

    Ok(Json(resolve_names(directory.as_ref(), &request.user_ids).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::tests::{bearer, directory, state};

    #[tokio::test]
    async fn names_with_fallback() {
        let request: UsernamesRequest = serde_json::from_str(r#"{"userIds": ["alice", "user_29xQk4aB7"]}"#).unwrap();
        let Json(names) = usernames(State(state()), Extension(directory()), bearer("bob", false), Json(request))
            .await
            .unwrap();
        assert_eq!(names["alice"], "Alice");
        assert_eq!(names["user_29xQk4aB7"], "Player_user_29x");
    }

    #[tokio::test]
    async fn oversized_batches_are_refused() {
        let request = UsernamesRequest {
            user_ids: (0..=MAX_IDS).map(|i| format!("u{}", i)).collect(),
        };
        let err = usernames(State(state()), Extension(directory()), bearer("bob", false), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, CustomError::BadRequest));
    }
}
