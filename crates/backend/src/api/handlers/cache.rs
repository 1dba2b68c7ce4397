use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use contracts::cache::CacheStats;

use crate::loader::DataService;

pub async fn stats(State(service): State<Arc<DataService>>) -> Json<CacheStats> {
    Json(service.cache_stats())
}

#[derive(Deserialize)]
pub struct ClearParams {
    /// Exact cache key to drop; omit to drop everything.
    pub key: Option<String>,
}

pub async fn clear(
    State(service): State<Arc<DataService>>,
    Query(params): Query<ClearParams>,
) -> StatusCode {
    service.clear_cache(params.key.as_deref());
    tracing::info!(
        "Cache cleared: {}",
        params.key.as_deref().unwrap_or("all entries")
    );
    StatusCode::OK
}
