mod dto;
mod handlers;
pub mod query;
mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::Property;

pub fn router() -> Router<AppState> {
    handlers::property_routes()
}
