use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{NewUser, StoreError, UserChanges, UserStore};
use crate::auth::providers::Provider;
use crate::users::model::User;

const USER_COLUMNS: &str = "id, display_name, email, password_hash, photo_url, is_admin, \
     google_id, line_id, kakao_id, created_at, last_login";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn provider_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "google_id",
        Provider::Line => "line_id",
        Provider::Kakao => "kakao_id",
    }
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.constraint() == Some("users_email_key") {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Backend(e.into())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let (google_id, line_id, kakao_id) = match &user.provider_link {
            Some((Provider::Google, s)) => (Some(s.as_str()), None, None),
            Some((Provider::Line, s)) => (None, Some(s.as_str()), None),
            Some((Provider::Kakao, s)) => (None, None, Some(s.as_str())),
            None => (None, None, None),
        };
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (display_name, email, password_hash, photo_url, is_admin,
                               google_id, line_id, kakao_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.photo_url)
        .bind(user.is_admin)
        .bind(google_id)
        .bind(line_id)
        .bind(kakao_id)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(user)
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1",
            provider_column(provider)
        ))
        .bind(subject)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(users)
    }

    async fn set_provider_id(
        &self,
        id: Uuid,
        provider: Provider,
        subject: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE users SET {} = $1 WHERE id = $2",
            provider_column(provider)
        ))
        .bind(subject)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(map_write_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET last_login = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?
        .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                display_name = COALESCE($1, display_name),
                photo_url = COALESCE($2, photo_url),
                is_admin = COALESCE($3, is_admin),
                password_hash = COALESCE($4, password_hash)
            WHERE id = $5
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&changes.display_name)
        .bind(&changes.photo_url)
        .bind(changes.is_admin)
        .bind(&changes.password_hash)
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?
        .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
