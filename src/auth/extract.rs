use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::claims::Identity;
use super::tokens::{JwtKeys, TokenError};
use crate::error::AppError;
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Option<&str> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
}

/// Requires a valid bearer access token; fails closed.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::AuthRequired)?;
        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| match e {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Invalid => AppError::InvalidToken,
        })?;
        Ok(AuthUser(claims.into()))
    }
}

/// Attaches an identity when a valid bearer token is present; anonymous
/// requests and garbage tokens fall through to `None`. An EXPIRED token is
/// still an error: the client should refresh, not silently proceed
/// anonymous.
pub struct MaybeUser(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeUser(None));
        };
        let keys = JwtKeys::from_ref(state);
        match keys.verify_access(token) {
            Ok(claims) => Ok(MaybeUser(Some(claims.into()))),
            Err(TokenError::Expired) => Err(AppError::TokenExpired),
            Err(TokenError::Invalid) => Ok(MaybeUser(None)),
        }
    }
}

/// Requires a valid bearer token whose user carries the admin flag.
pub struct AdminUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if !identity.is_admin {
            return Err(AppError::AdminRequired);
        }
        Ok(AdminUser(identity))
    }
}
