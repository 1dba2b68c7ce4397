use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use contracts::batch::{BatchProgress, BatchSummary};
use contracts::domain::SalesRecord;
use contracts::queries::{AggregatedSales, SalesFilters};

use crate::api::status_for;
use crate::loader::DataService;

pub async fn list(
    State(service): State<Arc<DataService>>,
    Query(filters): Query<SalesFilters>,
) -> Result<Json<Vec<SalesRecord>>, StatusCode> {
    tracing::info!(
        "Sales list request: {:?}..{:?}, brand={:?}, channel={:?}",
        filters.start_date,
        filters.end_date,
        filters.brand,
        filters.channel
    );

    match service.load_sales_data(&filters).await {
        Ok(rows) => {
            tracing::info!("Sales list response: {} rows", rows.len());
            Ok(Json(rows))
        }
        Err(e) => {
            tracing::error!("Failed to load sales data: {}", e);
            Err(status_for(&e))
        }
    }
}

pub async fn aggregated(
    State(service): State<Arc<DataService>>,
    Query(filters): Query<SalesFilters>,
) -> Result<Json<AggregatedSales>, StatusCode> {
    match service.load_aggregated_sales_data(&filters).await {
        Ok(aggregate) => Ok(Json(aggregate)),
        Err(e) => {
            tracing::error!("Failed to load aggregated sales data: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Debounced save endpoint: rapid re-submissions coalesce, every caller
/// gets the winning request's summary.
pub async fn save(
    State(service): State<Arc<DataService>>,
    Json(rows): Json<Vec<SalesRecord>>,
) -> Result<Json<BatchSummary>, StatusCode> {
    tracing::info!("Sales save request: {} rows", rows.len());
    match service.save_sales_data(rows).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            tracing::error!("Failed to save sales data: {}", e);
            Err(status_for(&e))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSaveRequest {
    pub rows: Vec<SalesRecord>,
    pub batch_size: Option<usize>,
}

pub async fn batch_save(
    State(service): State<Arc<DataService>>,
    Json(request): Json<BatchSaveRequest>,
) -> Json<BatchSummary> {
    tracing::info!(
        "Sales batch save request: {} rows, batch_size={:?}",
        request.rows.len(),
        request.batch_size
    );

    let progress = |p: &BatchProgress| {
        tracing::info!(
            "Sales batch {}/{}: {} processed, {} inserted, {} duplicates, {} failed",
            p.batch_index,
            p.total_batches,
            p.processed,
            p.inserted,
            p.duplicates,
            p.failed
        );
    };
    let summary = service
        .batch_save_sales_data(&request.rows, request.batch_size, Some(&progress))
        .await;

    if summary.failed > 0 {
        tracing::warn!(
            "Sales batch save finished with failures: {} of {} rows failed",
            summary.failed,
            summary.total
        );
    }
    Json(summary)
}
