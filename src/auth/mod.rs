pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};
use jwt::Claims;

/// The caller behind a valid bearer token. Documents are always scoped to
/// `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    debug!(path = %parts.uri.path(), %rejection, "missing bearer token");
                    AppError::unauthorized()
                })?;

        state
            .jwt
            .verify_token(bearer.token())
            .map(AuthenticatedUser::from)
            .map_err(|err| {
                debug!(error = %err, "rejected bearer token");
                AppError::unauthorized()
            })
    }
}
