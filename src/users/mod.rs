use crate::state::AppState;
use axum::{
    routing::{get, patch},
    Router,
};

pub mod dto;
pub mod handlers;
pub mod model;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/:id",
            patch(handlers::update_user).delete(handlers::delete_user),
        )
}
