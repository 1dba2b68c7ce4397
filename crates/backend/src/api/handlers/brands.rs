use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use contracts::domain::{Brand, BrandDto, BrandTarget, DeleteBrandRequest};

use crate::api::status_for;
use crate::domain::brand::service;
use crate::loader::DataService;

pub async fn list() -> Result<Json<Vec<Brand>>, StatusCode> {
    match service::list_all().await {
        Ok(brands) => Ok(Json(brands)),
        Err(e) => {
            tracing::error!("Failed to list brands: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn create(Json(dto): Json<BrandDto>) -> Result<Json<Uuid>, StatusCode> {
    match service::create(dto).await {
        Ok(id) => Ok(Json(id)),
        Err(e) => {
            tracing::error!("Failed to create brand: {}", e);
            let message = e.to_string();
            if message.contains("Validation failed") {
                Err(StatusCode::BAD_REQUEST)
            } else if message.contains("already exists") {
                Err(StatusCode::CONFLICT)
            } else {
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Delete a brand and its facts, or reassign the facts first when the
/// request names a successor brand. Returns whether anything was removed.
pub async fn delete(
    State(service): State<Arc<DataService>>,
    Json(request): Json<DeleteBrandRequest>,
) -> Result<Json<bool>, StatusCode> {
    tracing::info!(
        "Brand delete request: '{}', reassign_to={:?}",
        request.name,
        request.reassign_to
    );
    match service
        .delete_brand(&request.name, request.reassign_to.as_deref())
        .await
    {
        Ok(touched) => Ok(Json(touched)),
        Err(e) => {
            tracing::error!("Failed to delete brand '{}': {}", request.name, e);
            Err(status_for(&e))
        }
    }
}

#[derive(Deserialize)]
pub struct TargetParams {
    pub brand: Option<String>,
}

pub async fn list_targets(
    Query(params): Query<TargetParams>,
) -> Result<Json<Vec<BrandTarget>>, StatusCode> {
    match service::list_targets(params.brand.as_deref()).await {
        Ok(targets) => Ok(Json(targets)),
        Err(e) => {
            tracing::error!("Failed to list brand targets: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn upsert_target(Json(target): Json<BrandTarget>) -> Result<StatusCode, StatusCode> {
    match service::upsert_target(target).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!("Failed to save brand target: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
