mod handlers;
mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::{Activity, ActivityInput, ActivityKind};

pub fn router() -> Router<AppState> {
    handlers::activity_routes()
}
