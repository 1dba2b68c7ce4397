use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers;
use crate::loader::DataService;

pub fn configure_routes(service: Arc<DataService>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // Sales facts
        .route(
            "/api/sales",
            get(handlers::sales::list).post(handlers::sales::save),
        )
        .route("/api/sales/aggregated", get(handlers::sales::aggregated))
        .route("/api/sales/batch", post(handlers::sales::batch_save))
        // SKU facts
        .route(
            "/api/sku",
            get(handlers::sku::list).post(handlers::sku::save),
        )
        .route("/api/sku/comparison", get(handlers::sku::comparison))
        .route("/api/sku/batch", post(handlers::sku::batch_save))
        // Brand registry
        .route(
            "/api/brands",
            get(handlers::brands::list).post(handlers::brands::create),
        )
        .route("/api/brands/delete", post(handlers::brands::delete))
        .route(
            "/api/targets",
            get(handlers::brands::list_targets).post(handlers::brands::upsert_target),
        )
        // Cache control
        .route("/api/cache/stats", get(handlers::cache::stats))
        .route("/api/cache/clear", post(handlers::cache::clear))
        .with_state(service)
}
