use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod validation;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}

/// Routes mounted behind the session layer.
pub fn protected_router() -> Router<AppState> {
    handlers::me_routes()
}
