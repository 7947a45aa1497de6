use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{AccessClaims, RefreshClaims, TokenKind};
use crate::config::JwtConfig;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::UserStore;
use crate::users::model::User;

/// Why a token failed verification. Expiry is recoverable with a refresh;
/// anything else means re-login.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

fn classify(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}

/// Signed access and refresh token pair returned at login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(jwt: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(jwt.secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt.secret.as_bytes()),
            issuer: jwt.issuer.clone(),
            audience: jwt.audience.clone(),
            access_ttl: Duration::from_secs((jwt.access_ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((jwt.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // exp is a hard boundary; a token one second past it is expired.
        validation.leeway = 0;
        validation
    }

    pub(crate) fn sign_access_with_ttl(
        &self,
        user: &User,
        ttl: TimeDuration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            name: user.display_name.clone(),
            admin: user.is_admin,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user.id, "access token signed");
        Ok(token)
    }

    /// Signs an access token embedding the user's current identity claims.
    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        self.sign_access_with_ttl(user, TimeDuration::seconds(self.access_ttl.as_secs() as i64))
    }

    fn sign_refresh_with_ttl(&self, user_id: Uuid, ttl: TimeDuration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = RefreshClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Refresh,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "refresh token signed");
        Ok(token)
    }

    /// Signs a refresh token carrying only the user id.
    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_refresh_with_ttl(
            user_id,
            TimeDuration::seconds(self.refresh_ttl.as_secs() as i64),
        )
    }

    pub fn issue_pair(&self, user: &User) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access: self.sign_access(user)?,
            refresh: self.sign_refresh(user.id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data =
            decode::<AccessClaims>(token, &self.decoding, &self.validation()).map_err(classify)?;
        if data.claims.kind != TokenKind::Access {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data =
            decode::<RefreshClaims>(token, &self.decoding, &self.validation()).map_err(classify)?;
        if data.claims.kind != TokenKind::Refresh {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}

/// Mints a new access token from a refresh token. The user record is
/// re-read so the new token carries the CURRENT admin flag and display
/// name, not the claims from original issuance. The refresh token itself
/// is not rotated; it stays valid until its own expiry.
pub async fn refresh_access(
    keys: &JwtKeys,
    store: &dyn UserStore,
    refresh_token: &str,
) -> Result<String, AppError> {
    let claims = keys.verify_refresh(refresh_token).map_err(|e| match e {
        TokenError::Expired => AppError::RefreshTokenExpired,
        TokenError::Invalid => AppError::InvalidRefreshToken,
    })?;
    let user = store
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    keys.sign_access(&user).map_err(AppError::Internal)
}
