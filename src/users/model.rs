use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::providers::Provider;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub photo_url: Option<String>,
    pub is_admin: bool,
    pub google_id: Option<String>,
    pub line_id: Option<String>,
    pub kakao_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

impl User {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Line => self.line_id.as_deref(),
            Provider::Kakao => self.kakao_id.as_deref(),
        }
    }

    pub fn set_provider_id(&mut self, provider: Provider, subject: String) {
        match provider {
            Provider::Google => self.google_id = Some(subject),
            Provider::Line => self.line_id = Some(subject),
            Provider::Kakao => self.kakao_id = Some(subject),
        }
    }
}

/// The only user shape that leaves the API; has no password field at all.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            display_name: u.display_name,
            email: u.email,
            photo_url: u.photo_url,
            is_admin: u.is_admin,
            created_at: u.created_at,
            last_login: u.last_login,
        }
    }
}
