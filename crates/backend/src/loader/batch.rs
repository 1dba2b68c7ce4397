use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contracts::batch::{BatchProgress, BatchSummary};
use contracts::domain::{SalesRecord, SkuRecord};

use crate::error::DataError;
use crate::loader::with_timeout;
use crate::shared::data::store::{SalesStore, UpsertOutcome};

/// Caller-supplied progress callback, invoked after every batch.
pub type ProgressFn<'a> = &'a (dyn Fn(&BatchProgress) + Send + Sync);

/// Write surface of one fact table, so the save ladder is written once for
/// both sales and SKU rows.
#[async_trait]
pub trait BatchTarget: Send + Sync {
    type Row: Clone + Send + Sync;

    fn external_id(row: &Self::Row) -> String;
    async fn upsert_bulk(&self, rows: &[Self::Row]) -> Result<usize, DataError>;
    async fn upsert_row(&self, row: &Self::Row) -> Result<UpsertOutcome, DataError>;
    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError>;
    async fn insert_bulk(&self, rows: &[Self::Row]) -> Result<usize, DataError>;
    async fn update_row(&self, row: &Self::Row) -> Result<(), DataError>;
}

pub struct SalesTarget(pub Arc<dyn SalesStore>);

#[async_trait]
impl BatchTarget for SalesTarget {
    type Row = SalesRecord;

    fn external_id(row: &SalesRecord) -> String {
        row.external_id()
    }

    async fn upsert_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError> {
        self.0.upsert_sales_bulk(rows).await
    }

    async fn upsert_row(&self, row: &SalesRecord) -> Result<UpsertOutcome, DataError> {
        self.0.upsert_sales_row(row).await
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError> {
        self.0.existing_sales_ids(ids).await
    }

    async fn insert_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError> {
        self.0.insert_sales_bulk(rows).await
    }

    async fn update_row(&self, row: &SalesRecord) -> Result<(), DataError> {
        self.0.update_sales_row(row).await
    }
}

pub struct SkuTarget(pub Arc<dyn SalesStore>);

#[async_trait]
impl BatchTarget for SkuTarget {
    type Row = SkuRecord;

    fn external_id(row: &SkuRecord) -> String {
        row.external_id()
    }

    async fn upsert_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError> {
        self.0.upsert_sku_bulk(rows).await
    }

    async fn upsert_row(&self, row: &SkuRecord) -> Result<UpsertOutcome, DataError> {
        self.0.upsert_sku_row(row).await
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError> {
        self.0.existing_sku_ids(ids).await
    }

    async fn insert_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError> {
        self.0.insert_sku_bulk(rows).await
    }

    async fn update_row(&self, row: &SkuRecord) -> Result<(), DataError> {
        self.0.update_sku_row(row).await
    }
}

#[derive(Default)]
struct BatchOutcome {
    inserted: usize,
    duplicates: usize,
    failed: usize,
    row_errors: Vec<String>,
}

/// Save rows in fixed-size batches. Each batch is attempted independently;
/// one batch failing never aborts the batches after it. The summary accounts
/// every row as inserted, duplicate (already present, written as an update)
/// or failed.
pub async fn batch_save<T: BatchTarget>(
    target: &T,
    rows: &[T::Row],
    batch_size: usize,
    write_timeout: Duration,
    on_progress: Option<ProgressFn<'_>>,
) -> BatchSummary {
    let batch_size = batch_size.max(1);
    let total_batches = rows.len().div_ceil(batch_size) as u32;
    let mut summary = BatchSummary {
        total: rows.len(),
        ..Default::default()
    };
    let mut processed = 0usize;

    for (index, batch) in rows.chunks(batch_size).enumerate() {
        let batch_index = index as u32 + 1;
        match save_batch(target, batch, write_timeout).await {
            Ok(outcome) => {
                summary.inserted += outcome.inserted;
                summary.duplicates += outcome.duplicates;
                summary.failed += outcome.failed;
                for message in outcome.row_errors {
                    summary.add_error(batch_index, message);
                }
            }
            Err(e) => {
                tracing::error!(
                    "Batch {}/{} failed outright ({} rows): {}",
                    batch_index,
                    total_batches,
                    batch.len(),
                    e
                );
                summary.failed += batch.len();
                summary.add_error(batch_index, e.to_string());
            }
        }
        processed += batch.len();

        if let Some(callback) = on_progress {
            callback(&BatchProgress {
                batch_index,
                total_batches,
                processed,
                inserted: summary.inserted,
                duplicates: summary.duplicates,
                failed: summary.failed,
            });
        }
    }

    summary
}

/// One batch through the duplicate-tolerant ladder: bulk upsert, then
/// per-row upsert on a uniqueness violation, then select-then-branch when
/// the conflict target itself is absent.
async fn save_batch<T: BatchTarget>(
    target: &T,
    batch: &[T::Row],
    write_timeout: Duration,
) -> Result<BatchOutcome, DataError> {
    let ids: Vec<String> = batch.iter().map(T::external_id).collect();
    let existing = with_timeout(write_timeout, target.existing_ids(&ids)).await?;
    let duplicates = existing.len();

    match with_timeout(write_timeout, target.upsert_bulk(batch)).await {
        Ok(_) => Ok(BatchOutcome {
            inserted: batch.len() - duplicates,
            duplicates,
            ..Default::default()
        }),
        Err(DataError::DuplicateKey(_)) => {
            tracing::warn!("Bulk upsert hit a uniqueness violation, retrying per row");
            per_row_upsert(target, batch, write_timeout).await
        }
        Err(DataError::MissingConflictTarget(_)) => {
            tracing::warn!("No conflict target for bulk upsert, using select-then-branch");
            let existing: HashSet<String> = existing.into_iter().collect();
            select_then_branch(target, batch, &existing, write_timeout).await
        }
        Err(e) => Err(e),
    }
}

async fn per_row_upsert<T: BatchTarget>(
    target: &T,
    batch: &[T::Row],
    write_timeout: Duration,
) -> Result<BatchOutcome, DataError> {
    let mut outcome = BatchOutcome::default();
    for (index, row) in batch.iter().enumerate() {
        match with_timeout(write_timeout, target.upsert_row(row)).await {
            Ok(UpsertOutcome::Inserted) => outcome.inserted += 1,
            Ok(UpsertOutcome::Updated) => outcome.duplicates += 1,
            Err(DataError::MissingConflictTarget(_)) => {
                // The constraint is absent entirely; finish the remaining
                // rows through the select-then-branch path.
                let remaining = &batch[index..];
                let ids: Vec<String> = remaining.iter().map(T::external_id).collect();
                let existing: HashSet<String> =
                    with_timeout(write_timeout, target.existing_ids(&ids))
                        .await?
                        .into_iter()
                        .collect();
                let rest = select_then_branch(target, remaining, &existing, write_timeout).await?;
                outcome.inserted += rest.inserted;
                outcome.duplicates += rest.duplicates;
                outcome.failed += rest.failed;
                outcome.row_errors.extend(rest.row_errors);
                return Ok(outcome);
            }
            Err(e) => {
                outcome.failed += 1;
                outcome
                    .row_errors
                    .push(format!("row {}: {}", T::external_id(row), e));
            }
        }
    }
    Ok(outcome)
}

/// Look up which ids already exist, bulk-insert the new rows and update the
/// existing ones individually.
async fn select_then_branch<T: BatchTarget>(
    target: &T,
    batch: &[T::Row],
    existing: &HashSet<String>,
    write_timeout: Duration,
) -> Result<BatchOutcome, DataError> {
    let mut outcome = BatchOutcome::default();
    let (new_rows, old_rows): (Vec<&T::Row>, Vec<&T::Row>) = batch
        .iter()
        .partition(|row| !existing.contains(&T::external_id(row)));

    if !new_rows.is_empty() {
        let owned: Vec<T::Row> = new_rows.iter().map(|r| (*r).clone()).collect();
        match with_timeout(write_timeout, target.insert_bulk(&owned)).await {
            Ok(_) => outcome.inserted += owned.len(),
            Err(e) => {
                outcome.failed += owned.len();
                outcome
                    .row_errors
                    .push(format!("bulk insert of {} new rows: {}", owned.len(), e));
            }
        }
    }

    for row in old_rows {
        match with_timeout(write_timeout, target.update_row(row)).await {
            Ok(()) => outcome.duplicates += 1,
            Err(e) => {
                outcome.failed += 1;
                outcome
                    .row_errors
                    .push(format!("row {}: {}", T::external_id(row), e));
            }
        }
    }
    Ok(outcome)
}
