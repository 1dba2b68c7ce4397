use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals reported after every batch of a bulk save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// 1-based index of the batch that just finished.
    pub batch_index: u32,
    pub total_batches: u32,
    /// Rows attempted so far, across all finished batches.
    pub processed: usize,
    pub inserted: usize,
    /// Rows that collided with an existing external id and were written as
    /// updates rather than fresh inserts.
    pub duplicates: usize,
    pub failed: usize,
}

/// One failed batch inside a bulk save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub batch_index: u32,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Final accounting of a bulk save. A failed batch never aborts the batches
/// after it, so `inserted + duplicates + failed == total` always holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
}

impl BatchSummary {
    pub fn add_error(&mut self, batch_index: u32, message: String) {
        self.errors.push(BatchError {
            batch_index,
            message,
            occurred_at: Utc::now(),
        });
    }
}
