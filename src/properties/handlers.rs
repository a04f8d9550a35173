use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::instrument;

use super::{
    dto::NewProperty,
    query::{Filters, SortParam},
    repo_types::Property,
    services,
};
use crate::{error::AppError, state::AppState};

pub fn property_routes() -> Router<AppState> {
    Router::new()
        .route("/properties", get(list_properties).post(create_property))
        .route(
            "/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
}

/// GET /properties?search=&type=&operation=&minPrice=&maxPrice=&bedrooms=&location=&sort=
///
/// With no filter and no sort, every listing in stored order.
#[instrument(skip(state))]
pub async fn list_properties(
    State(state): State<AppState>,
    Query(filters): Query<Filters>,
    Query(sort): Query<SortParam>,
) -> Result<Json<Vec<Property>>, AppError> {
    if filters.is_unset() && sort.sort.is_none() {
        return Ok(Json(services::list_properties(&state).await?));
    }
    let sort = sort.sort.unwrap_or_default();
    Ok(Json(
        services::search_properties(&state, &filters, sort).await?,
    ))
}

#[instrument(skip(state))]
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Property>, AppError> {
    Ok(Json(services::get_property(&state, &id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_property(
    State(state): State<AppState>,
    Json(body): Json<NewProperty>,
) -> Result<(StatusCode, HeaderMap, Json<Property>), AppError> {
    let property = services::create_property(&state, body).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/properties/{}", property.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(property)))
}

#[instrument(skip(state, patch))]
pub async fn update_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Property>, AppError> {
    Ok(Json(services::update_property(&state, &id, patch).await?))
}

#[instrument(skip(state))]
pub async fn delete_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Property>, AppError> {
    Ok(Json(services::delete_property(&state, &id).await?))
}
