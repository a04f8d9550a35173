mod dto;
mod handlers;
mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::User;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::login_routes())
        .merge(handlers::user_routes())
}
