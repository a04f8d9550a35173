use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::{repo_types::Activity, services};
use crate::{error::AppError, state::AppState};

pub fn activity_routes() -> Router<AppState> {
    Router::new().route("/activities", get(list_activities))
}

#[instrument(skip(state))]
pub async fn list_activities(
    State(state): State<AppState>,
) -> Result<Json<Vec<Activity>>, AppError> {
    Ok(Json(services::list(&state).await?))
}
