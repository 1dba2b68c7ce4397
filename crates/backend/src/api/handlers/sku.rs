use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use contracts::batch::{BatchProgress, BatchSummary};
use contracts::domain::SkuRecord;
use contracts::queries::{SalesFilters, SkuComparisonData};

use crate::api::status_for;
use crate::loader::DataService;

pub async fn list(
    State(service): State<Arc<DataService>>,
    Query(filters): Query<SalesFilters>,
) -> Result<Json<Vec<SkuRecord>>, StatusCode> {
    match service.load_sku_data(&filters).await {
        Ok(rows) => {
            tracing::info!("SKU list response: {} rows", rows.len());
            Ok(Json(rows))
        }
        Err(e) => {
            tracing::error!("Failed to load SKU data: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Two date windows over the same brand/channel scope.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonParams {
    pub current_start: Option<NaiveDate>,
    pub current_end: Option<NaiveDate>,
    pub comparison_start: Option<NaiveDate>,
    pub comparison_end: Option<NaiveDate>,
    pub brand: Option<String>,
    pub channel: Option<String>,
}

pub async fn comparison(
    State(service): State<Arc<DataService>>,
    Query(params): Query<ComparisonParams>,
) -> Result<Json<SkuComparisonData>, StatusCode> {
    let current = SalesFilters {
        start_date: params.current_start,
        end_date: params.current_end,
        brand: params.brand.clone(),
        channel: params.channel.clone(),
        ..Default::default()
    };
    let comparison = SalesFilters {
        start_date: params.comparison_start,
        end_date: params.comparison_end,
        brand: params.brand,
        channel: params.channel,
        ..Default::default()
    };

    match service.load_sku_comparison(&current, &comparison).await {
        Ok(data) => Ok(Json(data)),
        Err(e) => {
            tracing::error!("Failed to load SKU comparison: {}", e);
            Err(status_for(&e))
        }
    }
}

pub async fn save(
    State(service): State<Arc<DataService>>,
    Json(rows): Json<Vec<SkuRecord>>,
) -> Result<Json<BatchSummary>, StatusCode> {
    tracing::info!("SKU save request: {} rows", rows.len());
    match service.save_sku_data(rows).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            tracing::error!("Failed to save SKU data: {}", e);
            Err(status_for(&e))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSaveRequest {
    pub rows: Vec<SkuRecord>,
    pub batch_size: Option<usize>,
}

pub async fn batch_save(
    State(service): State<Arc<DataService>>,
    Json(request): Json<BatchSaveRequest>,
) -> Json<BatchSummary> {
    tracing::info!(
        "SKU batch save request: {} rows, batch_size={:?}",
        request.rows.len(),
        request.batch_size
    );

    let progress = |p: &BatchProgress| {
        tracing::info!(
            "SKU batch {}/{}: {} processed, {} inserted, {} duplicates, {} failed",
            p.batch_index,
            p.total_batches,
            p.processed,
            p.inserted,
            p.duplicates,
            p.failed
        );
    };
    let summary = service
        .batch_save_sku_data(&request.rows, request.batch_size, Some(&progress))
        .await;
    Json(summary)
}
