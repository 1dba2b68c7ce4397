use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One point of an aggregated trend series. `date` is the period label the
/// grouping produced: a day (`YYYY-MM-DD`), a week (`YYYY-Wnn`) or a month
/// (`YYYY-MM`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    pub brand: String,
    pub channel: String,
    pub revenue: f64,
}

/// Pre-aggregated channel totals plus the trend series behind them.
///
/// The values of `channel_revenues` always sum to `total_revenue` (within
/// floating-point tolerance).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSales {
    pub total_revenue: f64,
    pub channel_revenues: HashMap<String, f64>,
    pub trend_series: Vec<TrendPoint>,
}
