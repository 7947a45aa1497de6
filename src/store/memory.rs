use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NewUser, StoreError, UserChanges, UserStore};
use crate::auth::providers::Provider;
use crate::users::model::User;

/// In-memory implementation backing `AppState::fake()` and the unit tests.
/// Enforces the same uniqueness rules as the Postgres schema, so the
/// find-or-create race resolves identically.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating operations performed; used by tests asserting
    /// that repeated linking is write-free.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.users.lock().expect("user store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().expect("user store poisoned");
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        if let Some((provider, subject)) = &user.provider_link {
            if users
                .iter()
                .any(|u| u.provider_id(*provider) == Some(subject.as_str()))
            {
                return Err(StoreError::Backend(anyhow::anyhow!(
                    "provider id already taken"
                )));
            }
        }
        let mut record = User {
            id: Uuid::new_v4(),
            display_name: user.display_name,
            email: user.email,
            password_hash: user.password_hash,
            photo_url: user.photo_url,
            is_admin: user.is_admin,
            google_id: None,
            line_id: None,
            kakao_id: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        if let Some((provider, subject)) = user.provider_link {
            record.set_provider_id(provider, subject);
        }
        users.push(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().expect("user store poisoned");
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().expect("user store poisoned");
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().expect("user store poisoned");
        Ok(users
            .iter()
            .find(|u| u.provider_id(provider) == Some(subject))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().expect("user store poisoned");
        Ok(users.clone())
    }

    async fn set_provider_id(
        &self,
        id: Uuid,
        provider: Provider,
        subject: &str,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().expect("user store poisoned");
        if users
            .iter()
            .any(|u| u.id != id && u.provider_id(provider) == Some(subject))
        {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "provider id already taken"
            )));
        }
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.set_provider_id(provider, subject.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<User, StoreError> {
        let mut users = self.users.lock().expect("user store poisoned");
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.last_login = Some(OffsetDateTime::now_utc());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(user.clone())
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut users = self.users.lock().expect("user store poisoned");
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.display_name {
            user.display_name = name;
        }
        if let Some(url) = changes.photo_url {
            user.photo_url = Some(url);
        }
        if let Some(admin) = changes.is_admin {
            user.is_admin = admin;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut users = self.users.lock().expect("user store poisoned");
        let before = users.len();
        users.retain(|u| u.id != id);
        if users.len() == before {
            return Err(StoreError::NotFound);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
