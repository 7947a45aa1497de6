use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::providers::Provider;
use crate::users::model::User;

pub mod memory;
pub mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Fields for a user about to be persisted. The id and timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub photo_url: Option<String>,
    pub is_admin: bool,
    pub provider_link: Option<(Provider, String)>,
}

/// Partial update; `None` fields are left untouched. `password_hash` must
/// already be hashed by the caller (hash-on-write happens at the handler).
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub is_admin: Option<bool>,
    pub password_hash: Option<String>,
}

/// Persistence contract for user records. Implementations must enforce
/// uniqueness of `email` and of each provider id, surfacing the email race
/// as `DuplicateEmail` so find-or-create callers can resolve to the winner.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_provider_id(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<User>, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn set_provider_id(
        &self,
        id: Uuid,
        provider: Provider,
        subject: &str,
    ) -> Result<(), StoreError>;
    async fn touch_last_login(&self, id: Uuid) -> Result<User, StoreError>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}
