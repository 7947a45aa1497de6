use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::{EventPopup, PopupInput, Slide, SlideInput, Testimonial, TestimonialInput};
use crate::{auth::extract::AdminUser, error::AppError, state::AppState};

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/content/popups", get(list_popups))
        .route("/content/slides", get(list_slides))
        .route("/content/testimonials", get(list_testimonials))
}

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/content/popups", post(create_popup))
        .route("/content/popups/:id", put(update_popup).delete(delete_popup))
        .route("/content/slides", post(create_slide))
        .route("/content/slides/:id", put(update_slide).delete(delete_slide))
        .route("/content/testimonials", post(create_testimonial))
        .route(
            "/content/testimonials/:id",
            put(update_testimonial).delete(delete_testimonial),
        )
        .route("/content/uploads", post(upload_image))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state))]
pub async fn list_popups(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventPopup>>, AppError> {
    let popups = EventPopup::list_current(&state.db)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(popups))
}

#[instrument(skip(state, input))]
pub async fn create_popup(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(input): Json<PopupInput>,
) -> Result<(StatusCode, Json<EventPopup>), AppError> {
    if input.ends_at <= input.starts_at {
        return Err(AppError::Validation("endsAt must be after startsAt".into()));
    }
    let popup = EventPopup::create(&state.db, &input)
        .await
        .map_err(AppError::Internal)?;
    info!(popup_id = %popup.id, created_by = %admin.user_id, "popup created");
    Ok((StatusCode::CREATED, Json(popup)))
}

#[instrument(skip(state, input))]
pub async fn update_popup(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<PopupInput>,
) -> Result<Json<EventPopup>, AppError> {
    if input.ends_at <= input.starts_at {
        return Err(AppError::Validation("endsAt must be after startsAt".into()));
    }
    EventPopup::update(&state.db, id, &input)
        .await
        .map_err(AppError::Internal)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("popup not found".into()))
}

#[instrument(skip(state))]
pub async fn delete_popup(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !EventPopup::delete(&state.db, id)
        .await
        .map_err(AppError::Internal)?
    {
        return Err(AppError::NotFound("popup not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_slides(State(state): State<AppState>) -> Result<Json<Vec<Slide>>, AppError> {
    let slides = Slide::list(&state.db).await.map_err(AppError::Internal)?;
    Ok(Json(slides))
}

#[instrument(skip(state, input))]
pub async fn create_slide(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(input): Json<SlideInput>,
) -> Result<(StatusCode, Json<Slide>), AppError> {
    let slide = Slide::create(&state.db, &input)
        .await
        .map_err(AppError::Internal)?;
    Ok((StatusCode::CREATED, Json(slide)))
}

#[instrument(skip(state, input))]
pub async fn update_slide(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SlideInput>,
) -> Result<Json<Slide>, AppError> {
    Slide::update(&state.db, id, &input)
        .await
        .map_err(AppError::Internal)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("slide not found".into()))
}

#[instrument(skip(state))]
pub async fn delete_slide(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !Slide::delete(&state.db, id)
        .await
        .map_err(AppError::Internal)?
    {
        return Err(AppError::NotFound("slide not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_testimonials(
    State(state): State<AppState>,
) -> Result<Json<Vec<Testimonial>>, AppError> {
    let testimonials = Testimonial::list(&state.db)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(testimonials))
}

#[instrument(skip(state, input))]
pub async fn create_testimonial(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(input): Json<TestimonialInput>,
) -> Result<(StatusCode, Json<Testimonial>), AppError> {
    let testimonial = Testimonial::create(&state.db, &input)
        .await
        .map_err(AppError::Internal)?;
    Ok((StatusCode::CREATED, Json(testimonial)))
}

#[instrument(skip(state, input))]
pub async fn update_testimonial(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<TestimonialInput>,
) -> Result<Json<Testimonial>, AppError> {
    Testimonial::update(&state.db, id, &input)
        .await
        .map_err(AppError::Internal)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("testimonial not found".into()))
}

#[instrument(skip(state))]
pub async fn delete_testimonial(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !Testimonial::delete(&state.db, id)
        .await
        .map_err(AppError::Internal)?
    {
        return Err(AppError::NotFound("testimonial not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
}

/// Accepts one multipart `file` field, stores it, and returns a locator
/// the admin frontend can paste into content records.
#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    const PRESIGN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let Some(ext) = ext_from_mime(&content_type) else {
            return Err(AppError::Validation(format!(
                "unsupported content type {content_type}"
            )));
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("broken upload: {e}")))?;
        if data.is_empty() {
            return Err(AppError::Validation("empty file".into()));
        }

        let key = format!("uploads/{}.{}", Uuid::new_v4(), ext);
        state
            .storage
            .put_object(&key, data, &content_type)
            .await
            .map_err(AppError::Internal)?;
        let url = state
            .storage
            .presign_get(&key, PRESIGN_TTL_SECS)
            .await
            .map_err(AppError::Internal)?;
        info!(%key, uploaded_by = %admin.user_id, "image uploaded");
        return Ok((StatusCode::CREATED, Json(UploadResponse { key, url })));
    }
    Err(AppError::Validation("file field is required".into()))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
