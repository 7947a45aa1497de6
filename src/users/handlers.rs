use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateUserRequest, UpdateUserRequest};
use super::model::PublicUser;
use crate::{
    auth::{extract::AdminUser, password},
    error::AppError,
    state::AppState,
    store::{NewUser, UserChanges, UserStore},
    validate::is_valid_email,
};

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("a valid email is required".into()));
    }
    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if display_name.is_empty() {
        return Err(AppError::Validation("displayName is required".into()));
    }
    let plain = payload.password.unwrap_or_default();
    if plain.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let password_hash = password::hash_password(&plain).map_err(AppError::Internal)?;
    let user = state
        .users
        .insert(NewUser {
            display_name,
            email,
            password_hash,
            photo_url: None,
            is_admin: payload.is_admin,
            provider_link: None,
        })
        .await?;

    info!(user_id = %user.id, created_by = %admin.user_id, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    // Hash-on-write: the store only ever receives a hash.
    let password_hash = match payload.password.as_deref() {
        Some(plain) if plain.len() < 8 => {
            return Err(AppError::Validation(
                "password must be at least 8 characters".into(),
            ))
        }
        Some(plain) => Some(password::hash_password(plain).map_err(AppError::Internal)?),
        None => None,
    };
    let user = state
        .users
        .update(
            id,
            UserChanges {
                display_name: payload.display_name,
                photo_url: payload.photo_url,
                is_admin: payload.is_admin,
                password_hash,
            },
        )
        .await?;
    info!(user_id = %user.id, updated_by = %admin.user_id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.users.delete(id).await?;
    info!(user_id = %id, deleted_by = %admin.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Identity;

    fn admin() -> AdminUser {
        AdminUser(Identity {
            user_id: Uuid::new_v4(),
            email: "root@x.com".into(),
            display_name: "Root".into(),
            is_admin: true,
        })
    }

    fn create_request(email: &str) -> CreateUserRequest {
        CreateUserRequest {
            display_name: Some("Ann".into()),
            email: Some(email.into()),
            password: Some("secret123".into()),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn create_then_list_never_exposes_password() {
        let state = AppState::fake();
        let (status, Json(created)) = create_user(
            State(state.clone()),
            admin(),
            Json(create_request("ann@x.com")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.email, "ann@x.com");

        let Json(users) = list_users(State(state), admin()).await.unwrap();
        assert_eq!(users.len(), 1);
        let json = serde_json::to_string(&users).unwrap();
        assert!(!json.to_lowercase().contains("password"));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let state = AppState::fake();
        create_user(
            State(state.clone()),
            admin(),
            Json(create_request("ann@x.com")),
        )
        .await
        .unwrap();
        let err = create_user(State(state), admin(), Json(create_request("ann@x.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let state = AppState::fake();
        let mut request = create_request("ann@x.com");
        request.password = Some("short".into());
        let err = create_user(State(state), admin(), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn password_change_is_rehashed() {
        let state = AppState::fake();
        let (_, Json(created)) = create_user(
            State(state.clone()),
            admin(),
            Json(create_request("ann@x.com")),
        )
        .await
        .unwrap();

        update_user(
            State(state.clone()),
            admin(),
            Path(created.id),
            Json(UpdateUserRequest {
                password: Some("new-password-1".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        let stored = state.users.find_by_id(created.id).await.unwrap().unwrap();
        assert!(!stored.password_hash.contains("new-password-1"));
        assert!(password::verify_password("new-password-1", &stored.password_hash).unwrap());
        assert!(!password::verify_password("secret123", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn admin_toggle_persists() {
        let state = AppState::fake();
        let (_, Json(created)) = create_user(
            State(state.clone()),
            admin(),
            Json(create_request("ann@x.com")),
        )
        .await
        .unwrap();
        let Json(updated) = update_user(
            State(state),
            admin(),
            Path(created.id),
            Json(UpdateUserRequest {
                is_admin: Some(true),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert!(updated.is_admin);
        assert_eq!(updated.display_name, "Ann");
    }

    #[tokio::test]
    async fn delete_missing_user_is_not_found() {
        let state = AppState::fake();
        let err = delete_user(State(state), admin(), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
