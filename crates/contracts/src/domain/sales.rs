use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily revenue fact for one brand/channel combination.
///
/// `date` is always a plain calendar day; serde round-trips it as
/// `YYYY-MM-DD` with no time component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub brand: String,
    pub channel: String,
    pub revenue: f64,
}

impl SalesRecord {
    /// Deterministic identifier used as the store primary key. Saving the
    /// same logical row twice therefore collides on this id and becomes an
    /// upsert instead of a second insert.
    pub fn external_id(&self) -> String {
        format!(
            "{}|{}|{}",
            self.date.format("%Y-%m-%d"),
            self.brand,
            self.channel
        )
    }
}
