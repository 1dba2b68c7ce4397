use serde::{Deserialize, Serialize};

use crate::domain::SkuRecord;

/// Comparison-period figures attached to a current-period SKU row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuGrowth {
    pub revenue: f64,
    pub units: i64,
    pub growth_amount: f64,
    pub growth_percent: f64,
}

/// Per-SKU totals for the current period, annotated with the matching
/// comparison-period figures. `comparison` is `None` when the SKU did not
/// appear in the comparison period at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuComparisonRow {
    pub sku: String,
    pub brand: String,
    pub channel: String,
    pub units: i64,
    pub revenue: f64,
    pub comparison: Option<SkuGrowth>,
}

/// Result of a two-period SKU comparison load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuComparisonData {
    pub current: Vec<SkuRecord>,
    pub comparison: Vec<SkuRecord>,
    pub merged: Vec<SkuComparisonRow>,
}
