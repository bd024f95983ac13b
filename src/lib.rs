use std::sync::Arc;
use std::time::Duration;

use axum::headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::error;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod controllers;
pub mod errors;
pub mod identity;
pub mod models;
pub mod protocol;
pub mod store;
pub mod tasks;

use crate::errors::CustomError;
use crate::identity::IdentityDirectory;
use crate::store::SessionStore;

/// Session store shared by every handler.
pub type Store = Arc<dyn SessionStore>;
/// Display-name directory shared by every handler.
pub type Directory = Arc<dyn IdentityDirectory>;

// The claims struct carried by the identity provider's Bearer token
#[derive(Deserialize, Serialize, Debug)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
    #[serde(default)]
    pub admin: bool,
}

// Shared immutable state
#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: String,
    pub token_duration: i64,
    pub sweep_timeout: Duration,
}

// Helper function to check if a bearer token is valid (user is logged in) and if the token is an admin token if needed.
// Tokens issued for longer than token_duration seconds are refused. Returns the identity id (sub field) and the admin flag.
pub async fn check_access(
    state: &AppState,
    bearer: &Authorization<Bearer>,
    admin_needed: bool,
) -> Result<(String, bool), CustomError> {
    match decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(token_data) => {
            let claims = token_data.claims;
            if claims.exp.saturating_sub(claims.iat) as i64 > state.token_duration {
                error!("Token for {} outlives the allowed duration", claims.sub);
                Err(CustomError::InvalidToken)
            } else if admin_needed && !claims.admin {
                error!("User is not admin, request denied");
                Err(CustomError::NotAdmin)
            } else {
                Ok((claims.sub, claims.admin))
            }
        }
        Err(err) => {
            error!("Invalid token: {:?}", err.kind());
            Err(CustomError::InvalidToken)
        }
    }
}
