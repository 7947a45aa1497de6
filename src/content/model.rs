use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Event popup shown on the landing page while its window is open.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventPopup {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupInput {
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl EventPopup {
    /// Popups currently visible to visitors.
    pub async fn list_current(db: &PgPool) -> anyhow::Result<Vec<EventPopup>> {
        let rows = sqlx::query_as::<_, EventPopup>(
            r#"
            SELECT id, title, image_url, link_url, starts_at, ends_at, active, created_at
            FROM event_popups
            WHERE active AND starts_at <= now() AND ends_at >= now()
            ORDER BY starts_at
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn create(db: &PgPool, input: &PopupInput) -> anyhow::Result<EventPopup> {
        let row = sqlx::query_as::<_, EventPopup>(
            r#"
            INSERT INTO event_popups (title, image_url, link_url, starts_at, ends_at, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, image_url, link_url, starts_at, ends_at, active, created_at
            "#,
        )
        .bind(&input.title)
        .bind(&input.image_url)
        .bind(&input.link_url)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.active)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        input: &PopupInput,
    ) -> anyhow::Result<Option<EventPopup>> {
        let row = sqlx::query_as::<_, EventPopup>(
            r#"
            UPDATE event_popups
            SET title = $1, image_url = $2, link_url = $3, starts_at = $4, ends_at = $5, active = $6
            WHERE id = $7
            RETURNING id, title, image_url, link_url, starts_at, ends_at, active, created_at
            "#,
        )
        .bind(&input.title)
        .bind(&input.image_url)
        .bind(&input.link_url)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.active)
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM event_popups WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Image slide in the landing hero carousel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: Uuid,
    pub image_url: String,
    pub caption: Option<String>,
    pub position: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideInput {
    pub image_url: String,
    pub caption: Option<String>,
    #[serde(default)]
    pub position: i32,
}

impl Slide {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Slide>> {
        let rows = sqlx::query_as::<_, Slide>(
            r#"
            SELECT id, image_url, caption, position, created_at
            FROM slides
            ORDER BY position, created_at
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn create(db: &PgPool, input: &SlideInput) -> anyhow::Result<Slide> {
        let row = sqlx::query_as::<_, Slide>(
            r#"
            INSERT INTO slides (image_url, caption, position)
            VALUES ($1, $2, $3)
            RETURNING id, image_url, caption, position, created_at
            "#,
        )
        .bind(&input.image_url)
        .bind(&input.caption)
        .bind(input.position)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn update(db: &PgPool, id: Uuid, input: &SlideInput) -> anyhow::Result<Option<Slide>> {
        let row = sqlx::query_as::<_, Slide>(
            r#"
            UPDATE slides
            SET image_url = $1, caption = $2, position = $3
            WHERE id = $4
            RETURNING id, image_url, caption, position, created_at
            "#,
        )
        .bind(&input.image_url)
        .bind(&input.caption)
        .bind(input.position)
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM slides WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Customer quote shown in the testimonials section.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub id: Uuid,
    pub author: String,
    pub quote: String,
    pub photo_url: Option<String>,
    pub position: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialInput {
    pub author: String,
    pub quote: String,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub position: i32,
}

impl Testimonial {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Testimonial>> {
        let rows = sqlx::query_as::<_, Testimonial>(
            r#"
            SELECT id, author, quote, photo_url, position, created_at
            FROM testimonials
            ORDER BY position, created_at
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn create(db: &PgPool, input: &TestimonialInput) -> anyhow::Result<Testimonial> {
        let row = sqlx::query_as::<_, Testimonial>(
            r#"
            INSERT INTO testimonials (author, quote, photo_url, position)
            VALUES ($1, $2, $3, $4)
            RETURNING id, author, quote, photo_url, position, created_at
            "#,
        )
        .bind(&input.author)
        .bind(&input.quote)
        .bind(&input.photo_url)
        .bind(input.position)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        input: &TestimonialInput,
    ) -> anyhow::Result<Option<Testimonial>> {
        let row = sqlx::query_as::<_, Testimonial>(
            r#"
            UPDATE testimonials
            SET author = $1, quote = $2, photo_url = $3, position = $4
            WHERE id = $5
            RETURNING id, author, quote, photo_url, position, created_at
            "#,
        )
        .bind(&input.author)
        .bind(&input.quote)
        .bind(&input.photo_url)
        .bind(input.position)
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM testimonials WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
