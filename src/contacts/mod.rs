use crate::state::AppState;
use axum::{
    routing::{delete, post},
    Router,
};

pub mod handlers;
pub mod model;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/contacts",
            post(handlers::submit_contact).get(handlers::list_contacts),
        )
        .route("/contacts/:id", delete(handlers::delete_contact))
}
