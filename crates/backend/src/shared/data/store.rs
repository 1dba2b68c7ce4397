use async_trait::async_trait;
use chrono::NaiveDate;
use contracts::domain::{SalesRecord, SkuRecord};
use contracts::queries::{Granularity, SalesFilters};

use crate::domain::{brand, sales_fact, sku_fact};
use crate::error::DataError;

/// Row-level select with equality/range predicates plus limit/offset,
/// mirroring what the managed store client accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub brand: Option<String>,
    pub channel: Option<String>,
    pub limit: u64,
    pub offset: u64,
}

impl RowQuery {
    /// Build a query from a filter descriptor. The "all" sentinels are
    /// normalized away here, so the store never sees them as literals.
    pub fn from_filters(filters: &SalesFilters, limit: u64, offset: u64) -> Self {
        Self {
            start_date: filters.start_date,
            end_date: filters.end_date,
            brand: filters.effective_brand().map(str::to_string),
            channel: filters.effective_channel().map(str::to_string),
            limit,
            offset,
        }
    }

    pub fn without_brand(&self) -> Self {
        Self {
            brand: None,
            offset: 0,
            ..self.clone()
        }
    }

    pub fn dates_only(&self) -> Self {
        Self {
            brand: None,
            channel: None,
            offset: 0,
            ..self.clone()
        }
    }

    pub fn at_offset(&self, offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            ..self.clone()
        }
    }
}

/// Named parameters of the server-side aggregation procedure.
#[derive(Debug, Clone)]
pub struct AggregationParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub brand: Option<String>,
    pub channel: Option<String>,
    pub group_by: Granularity,
}

impl AggregationParams {
    pub fn from_filters(filters: &SalesFilters) -> Self {
        Self {
            start_date: filters.start_date,
            end_date: filters.end_date,
            brand: filters.effective_brand().map(str::to_string),
            channel: filters.effective_channel().map(str::to_string),
            group_by: filters.granularity(),
        }
    }
}

/// One summary row returned by the aggregation procedure: revenue grouped
/// by period label and channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRow {
    pub period: String,
    pub channel: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Client surface of the managed relational store, kept behind a trait so
/// the loader can be exercised against simulated data sources.
#[async_trait]
pub trait SalesStore: Send + Sync {
    async fn select_sales(&self, query: &RowQuery) -> Result<Vec<SalesRecord>, DataError>;
    async fn aggregate_sales(
        &self,
        params: &AggregationParams,
    ) -> Result<Vec<AggregationRow>, DataError>;
    async fn upsert_sales_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError>;
    async fn upsert_sales_row(&self, row: &SalesRecord) -> Result<UpsertOutcome, DataError>;
    async fn existing_sales_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError>;
    async fn insert_sales_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError>;
    async fn update_sales_row(&self, row: &SalesRecord) -> Result<(), DataError>;

    async fn select_sku(&self, query: &RowQuery) -> Result<Vec<SkuRecord>, DataError>;
    async fn upsert_sku_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError>;
    async fn upsert_sku_row(&self, row: &SkuRecord) -> Result<UpsertOutcome, DataError>;
    async fn existing_sku_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError>;
    async fn insert_sku_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError>;
    async fn update_sku_row(&self, row: &SkuRecord) -> Result<(), DataError>;

    async fn delete_sales_for_brand(&self, brand: &str, limit: u64) -> Result<u64, DataError>;
    async fn delete_sku_for_brand(&self, brand: &str, limit: u64) -> Result<u64, DataError>;
    async fn reassign_sales_brand(
        &self,
        from: &str,
        to: &str,
        limit: u64,
    ) -> Result<u64, DataError>;
    async fn reassign_sku_brand(&self, from: &str, to: &str, limit: u64)
        -> Result<u64, DataError>;
    async fn delete_targets_for_brand(&self, brand: &str) -> Result<u64, DataError>;
    async fn delete_brand_row(&self, name: &str) -> Result<bool, DataError>;
}

/// Production store over the process-wide SQLite connection.
pub struct SqliteStore;

#[async_trait]
impl SalesStore for SqliteStore {
    async fn select_sales(&self, query: &RowQuery) -> Result<Vec<SalesRecord>, DataError> {
        Ok(sales_fact::repository::select(query).await?)
    }

    async fn aggregate_sales(
        &self,
        params: &AggregationParams,
    ) -> Result<Vec<AggregationRow>, DataError> {
        Ok(sales_fact::repository::aggregate(params).await?)
    }

    async fn upsert_sales_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError> {
        Ok(sales_fact::repository::upsert_many(rows).await?)
    }

    async fn upsert_sales_row(&self, row: &SalesRecord) -> Result<UpsertOutcome, DataError> {
        Ok(sales_fact::repository::upsert_one(row).await?)
    }

    async fn existing_sales_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError> {
        Ok(sales_fact::repository::existing_ids(ids).await?)
    }

    async fn insert_sales_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError> {
        Ok(sales_fact::repository::insert_many(rows).await?)
    }

    async fn update_sales_row(&self, row: &SalesRecord) -> Result<(), DataError> {
        Ok(sales_fact::repository::update_one(row).await?)
    }

    async fn select_sku(&self, query: &RowQuery) -> Result<Vec<SkuRecord>, DataError> {
        Ok(sku_fact::repository::select(query).await?)
    }

    async fn upsert_sku_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError> {
        Ok(sku_fact::repository::upsert_many(rows).await?)
    }

    async fn upsert_sku_row(&self, row: &SkuRecord) -> Result<UpsertOutcome, DataError> {
        Ok(sku_fact::repository::upsert_one(row).await?)
    }

    async fn existing_sku_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError> {
        Ok(sku_fact::repository::existing_ids(ids).await?)
    }

    async fn insert_sku_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError> {
        Ok(sku_fact::repository::insert_many(rows).await?)
    }

    async fn update_sku_row(&self, row: &SkuRecord) -> Result<(), DataError> {
        Ok(sku_fact::repository::update_one(row).await?)
    }

    async fn delete_sales_for_brand(&self, brand: &str, limit: u64) -> Result<u64, DataError> {
        Ok(sales_fact::repository::delete_for_brand(brand, limit).await?)
    }

    async fn delete_sku_for_brand(&self, brand: &str, limit: u64) -> Result<u64, DataError> {
        Ok(sku_fact::repository::delete_for_brand(brand, limit).await?)
    }

    async fn reassign_sales_brand(
        &self,
        from: &str,
        to: &str,
        limit: u64,
    ) -> Result<u64, DataError> {
        Ok(sales_fact::repository::reassign_brand(from, to, limit).await?)
    }

    async fn reassign_sku_brand(
        &self,
        from: &str,
        to: &str,
        limit: u64,
    ) -> Result<u64, DataError> {
        Ok(sku_fact::repository::reassign_brand(from, to, limit).await?)
    }

    async fn delete_targets_for_brand(&self, brand: &str) -> Result<u64, DataError> {
        Ok(brand::repository::delete_targets_for_brand(brand).await?)
    }

    async fn delete_brand_row(&self, name: &str) -> Result<bool, DataError> {
        Ok(brand::repository::delete_by_name(name).await?)
    }
}
