pub mod dto;
pub mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::public_routes()
}

/// Routes mounted behind the session layer.
pub fn protected_router() -> Router<AppState> {
    handlers::protected_routes()
}
