use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Message left through the landing page contact form.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub created_at: OffsetDateTime,
}

impl Contact {
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        phone: Option<&str>,
        message: &str,
    ) -> anyhow::Result<Contact> {
        let row = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (name, email, phone, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, phone, message, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(message)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>(
            r#"
            SELECT id, name, email, phone, message, created_at
            FROM contacts
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
