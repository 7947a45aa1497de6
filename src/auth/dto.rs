use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::claims::Identity;
use crate::users::model::PublicUser;

/// Request body for local login. Fields are optional so absence maps to a
/// 400 with a specific message instead of a body-rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Response returned by the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Identity echoed by the status endpoint; read from the verified token,
/// not the database.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl From<Identity> for StatusUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.user_id,
            email: identity.email,
            display_name: identity.display_name,
            is_admin: identity.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<StatusUser>,
}
