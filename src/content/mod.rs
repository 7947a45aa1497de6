use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod model;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_router())
        .merge(handlers::write_router())
}
