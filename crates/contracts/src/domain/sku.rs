use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily SKU-level sales fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuRecord {
    pub date: NaiveDate,
    pub brand: String,
    pub channel: String,
    pub sku: String,
    pub units: i64,
    pub revenue: f64,
}

impl SkuRecord {
    /// Deterministic identifier used as the store primary key.
    pub fn external_id(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.date.format("%Y-%m-%d"),
            self.brand,
            self.channel,
            self.sku
        )
    }
}
