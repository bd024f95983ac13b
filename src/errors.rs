use axum::{http::StatusCode, response::IntoResponse, Json};
use log::error;
use serde_json::json;

use crate::protocol::{ProtocolError, Rejection};
use crate::store::StoreError;

// Custom Errors used in handlers
#[derive(Debug)]
pub enum CustomError {
    BadRequest,
    NotAdmin,
    InternalServerError,
    InvalidToken,
    UnknownGame,
    GameNotFound,
    UnsupportedGame,
    Rejected(Rejection),
    Contended,
    StoreUnavailable,
}

impl CustomError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            Self::InternalServerError => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string()),
            Self::BadRequest => (StatusCode::BAD_REQUEST, "Bad Request".to_string()),
            Self::NotAdmin => (StatusCode::UNAUTHORIZED, "You need to be an administrator for this request".to_string()),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "Token is not valid".to_string()),
            Self::UnknownGame => (StatusCode::NOT_FOUND, "No such game type".to_string()),
            Self::GameNotFound => (StatusCode::NOT_FOUND, "Game not found".to_string()),
            Self::UnsupportedGame => (StatusCode::BAD_REQUEST, "This game cannot be played yet".to_string()),
            Self::Rejected(rejection) => (StatusCode::CONFLICT, rejection.to_string()),
            Self::Contended => (StatusCode::CONFLICT, "Game changed while saving, try again".to_string()),
            Self::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "Game storage is unavailable, try again".to_string()),
        }
    }
}

//implementation of custom errors that are used in handlers
impl IntoResponse for CustomError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = self.status_and_message();
        (status, Json(json!({"error": error_message}))).into_response()
    }
}

// Protocol outcomes as seen by a client
impl From<ProtocolError> for CustomError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Rejected(Rejection::Unsupported(_)) => CustomError::UnsupportedGame,
            ProtocolError::Rejected(rejection) => CustomError::Rejected(rejection),
            ProtocolError::NotFound(_) => CustomError::GameNotFound,
            ProtocolError::Contended(_) => CustomError::Contended,
            ProtocolError::Store(StoreError::Malformed(msg)) => {
                error!("Malformed session: {}", msg);
                CustomError::InternalServerError
            }
            ProtocolError::Store(err) => {
                error!("Store error: {:?}", err);
                CustomError::StoreUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_statuses() {
        let status = |err: ProtocolError| CustomError::from(err).status_and_message().0;
        assert_eq!(status(Rejection::NotYourTurn.into()), StatusCode::CONFLICT);
        assert_eq!(status(ProtocolError::NotFound("g1".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ProtocolError::Store(StoreError::Unavailable)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(Rejection::Unsupported(crate::models::game::GameKind::Chess).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn rejection_message_reaches_the_body() {
        let (status, message) = CustomError::Rejected(Rejection::ColumnFull(3)).status_and_message();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(message, "column 3 is full");
    }
}
