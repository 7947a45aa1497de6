use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::Contact;
use crate::{
    auth::extract::AdminUser, error::AppError, state::AppState, validate::is_valid_email,
};

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

#[instrument(skip(state, payload))]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> Result<(StatusCode, Json<Contact>), AppError> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("a valid email is required".into()));
    }
    let message = payload
        .message
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if message.is_empty() {
        return Err(AppError::Validation("message is required".into()));
    }

    let contact = Contact::create(
        &state.db,
        &name,
        &email,
        payload.phone.as_deref(),
        &message,
    )
    .await
    .map_err(AppError::Internal)?;
    info!(contact_id = %contact.id, "contact submitted");
    Ok((StatusCode::CREATED, Json(contact)))
}

#[instrument(skip(state))]
pub async fn list_contacts(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<Contact>>, AppError> {
    let contacts = Contact::list(&state.db).await.map_err(AppError::Internal)?;
    Ok(Json(contacts))
}

#[instrument(skip(state))]
pub async fn delete_contact(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !Contact::delete(&state.db, id)
        .await
        .map_err(AppError::Internal)?
    {
        return Err(AppError::NotFound("contact not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
