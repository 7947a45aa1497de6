use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extract;
pub mod handlers;
pub mod linker;
pub mod password;
pub mod providers;
pub mod tokens;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
