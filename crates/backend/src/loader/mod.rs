use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use contracts::batch::BatchSummary;
use contracts::cache::CacheStats;
use contracts::domain::{SalesRecord, SkuRecord};
use contracts::queries::{
    AggregatedSales, Granularity, SalesFilters, SkuComparisonData, SkuComparisonRow, SkuGrowth,
    TrendPoint, ALL_BRANDS,
};

use crate::error::DataError;
use crate::shared::config::{CacheConfig, LoaderConfig};
use crate::shared::data::store::{AggregationParams, AggregationRow, RowQuery, SalesStore};

pub mod batch;
pub mod cache;
pub mod debounce;
pub mod pagination;
pub mod strategy;

use batch::{ProgressFn, SalesTarget, SkuTarget};
use cache::{create_cache_key, CachedPayload, Clock, QueryCache, SystemClock};
use debounce::Debouncer;
use strategy::LoaderPolicy;

/// Rows rewritten per statement when deleting or reassigning a brand, to
/// stay under remote statement-timeout limits.
const BRAND_CHUNK_ROWS: u64 = 500;
const BRAND_MAX_ROUNDS: u32 = 10_000;

/// Race a single remote call against a fixed deadline.
pub(crate) async fn with_timeout<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, DataError>>,
) -> Result<T, DataError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(DataError::Timeout(deadline)),
    }
}

/// The aggregated-data loader: picks between server-side aggregation,
/// client-side filtering and pagination fallback, backed by a time-boxed
/// query cache and a debounced write path.
///
/// Constructed once at startup and passed around by `Arc` handle.
pub struct DataService {
    store: Arc<dyn SalesStore>,
    cache: Arc<QueryCache>,
    policy: LoaderPolicy,
    debouncer: Debouncer,
    batch_size: usize,
    query_timeout: Duration,
    write_timeout: Duration,
}

impl DataService {
    pub fn new(
        store: Arc<dyn SalesStore>,
        loader_config: &LoaderConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self::with_clock(store, loader_config, cache_config, Arc::new(SystemClock))
    }

    /// Same as [`DataService::new`] but with an explicit time source for the
    /// cache, so TTL behavior can be driven from tests.
    pub fn with_clock(
        store: Arc<dyn SalesStore>,
        loader_config: &LoaderConfig,
        cache_config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(QueryCache::new(cache_config.ttl(), clock));
        QueryCache::spawn_sweeper(&cache, cache_config.sweep_interval());
        Self {
            store,
            cache,
            policy: LoaderPolicy::from_config(loader_config),
            debouncer: Debouncer::new(loader_config.debounce_window()),
            batch_size: loader_config.batch_size,
            query_timeout: loader_config.query_timeout(),
            write_timeout: loader_config.write_timeout(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn load_sales_data(
        &self,
        filters: &SalesFilters,
    ) -> Result<Vec<SalesRecord>, DataError> {
        let key = create_cache_key("sales", filters);
        if let Some(CachedPayload::Sales(rows)) = self.cache.get(&key) {
            return Ok(rows);
        }
        let rows = self.fetch_sales_rows(filters).await?;
        self.cache.insert(key, CachedPayload::Sales(rows.clone()));
        Ok(rows)
    }

    pub async fn load_aggregated_sales_data(
        &self,
        filters: &SalesFilters,
    ) -> Result<AggregatedSales, DataError> {
        let key = create_cache_key("agg", filters);
        if let Some(CachedPayload::Aggregate(aggregate)) = self.cache.get(&key) {
            return Ok(aggregate);
        }

        let aggregate = if self.policy.should_aggregate(filters) {
            let params = AggregationParams::from_filters(filters);
            let rows =
                with_timeout(self.query_timeout, self.store.aggregate_sales(&params)).await?;
            from_aggregation_rows(rows, filters)
        } else {
            let rows = self.fetch_sales_rows(filters).await?;
            aggregate_client_side(&rows, filters)
        };

        self.cache
            .insert(key, CachedPayload::Aggregate(aggregate.clone()));
        Ok(aggregate)
    }

    pub async fn load_sku_data(
        &self,
        filters: &SalesFilters,
    ) -> Result<Vec<SkuRecord>, DataError> {
        let key = create_cache_key("sku", filters);
        if let Some(CachedPayload::Sku(rows)) = self.cache.get(&key) {
            return Ok(rows);
        }
        let rows = self.fetch_sku_rows(filters).await?;
        self.cache.insert(key, CachedPayload::Sku(rows.clone()));
        Ok(rows)
    }

    /// Load two periods of SKU data and annotate every current-period SKU
    /// with its growth against the comparison period.
    pub async fn load_sku_comparison(
        &self,
        current: &SalesFilters,
        comparison: &SalesFilters,
    ) -> Result<SkuComparisonData, DataError> {
        let current_rows = self.load_sku_data(current).await?;
        let comparison_rows = self.load_sku_data(comparison).await?;
        Ok(merge_sku_comparison(current_rows, comparison_rows))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Debounced save: rapid repeated calls coalesce and only the last one
    /// inside the debounce window reaches the store.
    pub async fn save_sales_data(
        &self,
        rows: Vec<SalesRecord>,
    ) -> Result<BatchSummary, DataError> {
        let store = Arc::clone(&self.store);
        let batch_size = self.batch_size;
        let write_timeout = self.write_timeout;
        let summary = self
            .debouncer
            .run("save_sales", move || async move {
                let target = SalesTarget(store);
                Ok(batch::batch_save(&target, &rows, batch_size, write_timeout, None).await)
            })
            .await?;
        self.cache.clear(None);
        Ok(summary)
    }

    pub async fn batch_save_sales_data(
        &self,
        rows: &[SalesRecord],
        batch_size: Option<usize>,
        on_progress: Option<ProgressFn<'_>>,
    ) -> BatchSummary {
        let target = SalesTarget(Arc::clone(&self.store));
        let summary = batch::batch_save(
            &target,
            rows,
            batch_size.unwrap_or(self.batch_size),
            self.write_timeout,
            on_progress,
        )
        .await;
        self.cache.clear(None);
        summary
    }

    pub async fn save_sku_data(&self, rows: Vec<SkuRecord>) -> Result<BatchSummary, DataError> {
        let store = Arc::clone(&self.store);
        let batch_size = self.batch_size;
        let write_timeout = self.write_timeout;
        let summary = self
            .debouncer
            .run("save_sku", move || async move {
                let target = SkuTarget(store);
                Ok(batch::batch_save(&target, &rows, batch_size, write_timeout, None).await)
            })
            .await?;
        self.cache.clear(None);
        Ok(summary)
    }

    pub async fn batch_save_sku_data(
        &self,
        rows: &[SkuRecord],
        batch_size: Option<usize>,
        on_progress: Option<ProgressFn<'_>>,
    ) -> BatchSummary {
        let target = SkuTarget(Arc::clone(&self.store));
        let summary = batch::batch_save(
            &target,
            rows,
            batch_size.unwrap_or(self.batch_size),
            self.write_timeout,
            on_progress,
        )
        .await;
        self.cache.clear(None);
        summary
    }

    /// Remove every fact and target referencing a brand, or move the facts
    /// to `reassign_to`. Rows are rewritten in bounded chunks so no single
    /// statement can hit a remote timeout. Returns whether anything was
    /// touched.
    pub async fn delete_brand(
        &self,
        name: &str,
        reassign_to: Option<&str>,
    ) -> Result<bool, DataError> {
        let mut touched = 0u64;

        match reassign_to {
            Some(to) => {
                for _ in 0..BRAND_MAX_ROUNDS {
                    let affected = with_timeout(
                        self.write_timeout,
                        self.store.reassign_sales_brand(name, to, BRAND_CHUNK_ROWS),
                    )
                    .await?;
                    touched += affected;
                    if affected < BRAND_CHUNK_ROWS {
                        break;
                    }
                }
                for _ in 0..BRAND_MAX_ROUNDS {
                    let affected = with_timeout(
                        self.write_timeout,
                        self.store.reassign_sku_brand(name, to, BRAND_CHUNK_ROWS),
                    )
                    .await?;
                    touched += affected;
                    if affected < BRAND_CHUNK_ROWS {
                        break;
                    }
                }
            }
            None => {
                for _ in 0..BRAND_MAX_ROUNDS {
                    let affected = with_timeout(
                        self.write_timeout,
                        self.store.delete_sales_for_brand(name, BRAND_CHUNK_ROWS),
                    )
                    .await?;
                    touched += affected;
                    if affected < BRAND_CHUNK_ROWS {
                        break;
                    }
                }
                for _ in 0..BRAND_MAX_ROUNDS {
                    let affected = with_timeout(
                        self.write_timeout,
                        self.store.delete_sku_for_brand(name, BRAND_CHUNK_ROWS),
                    )
                    .await?;
                    touched += affected;
                    if affected < BRAND_CHUNK_ROWS {
                        break;
                    }
                }
            }
        }

        touched += with_timeout(
            self.write_timeout,
            self.store.delete_targets_for_brand(name),
        )
        .await?;
        let brand_removed =
            with_timeout(self.write_timeout, self.store.delete_brand_row(name)).await?;

        let anything = touched > 0 || brand_removed;
        if anything {
            self.cache.clear(None);
            tracing::info!(
                "Brand '{}' {}: {} fact/target rows touched",
                name,
                if reassign_to.is_some() {
                    "reassigned"
                } else {
                    "deleted"
                },
                touched
            );
        }
        Ok(anything)
    }

    // ------------------------------------------------------------------
    // Cache control
    // ------------------------------------------------------------------

    pub fn clear_cache(&self, key: Option<&str>) {
        self.cache.clear(key);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ------------------------------------------------------------------
    // Fetch internals
    // ------------------------------------------------------------------

    /// Raw-row fetch with the full fallback ladder: server-side filters
    /// first, then progressively relaxed filters on an empty result, then
    /// exhaustive pagination when the result smells truncated, and finally
    /// the client-side case-insensitive brand post-filter.
    async fn fetch_sales_rows(
        &self,
        filters: &SalesFilters,
    ) -> Result<Vec<SalesRecord>, DataError> {
        let requested_brand = filters.effective_brand().map(str::to_string);
        let primary = RowQuery::from_filters(filters, self.policy.page_size, 0);

        let rows =
            with_timeout(self.query_timeout, self.store.select_sales(&primary)).await?;
        let (mut rows, query_used) = if rows.is_empty() {
            self.relaxed_sales_fetch(&primary).await?
        } else {
            (rows, primary)
        };

        if self.policy.is_possibly_truncated(rows.len(), filters) {
            tracing::warn!(
                "Sales fetch returned exactly {} rows over a wide window; \
                 re-fetching with pagination",
                self.policy.page_size
            );
            let store = Arc::clone(&self.store);
            let query = query_used.clone();
            let timeout = self.query_timeout;
            rows = pagination::load_with_pagination(
                self.policy.page_size,
                self.policy.max_pages,
                move |offset, limit| {
                    let store = Arc::clone(&store);
                    let page_query = query.at_offset(offset, limit);
                    async move {
                        with_timeout(timeout, store.select_sales(&page_query)).await
                    }
                },
            )
            .await?;
        }

        // The relaxed queries dropped the brand predicate; the server may
        // also be case-sensitive where the caller is not.
        if query_used.brand.is_none() {
            if let Some(brand) = &requested_brand {
                rows.retain(|r| r.brand.eq_ignore_ascii_case(brand));
            }
        }
        Ok(rows)
    }

    async fn relaxed_sales_fetch(
        &self,
        primary: &RowQuery,
    ) -> Result<(Vec<SalesRecord>, RowQuery), DataError> {
        if primary.brand.is_some() {
            tracing::info!("Empty sales result, retrying without brand filter");
            let no_brand = primary.without_brand();
            let rows =
                with_timeout(self.query_timeout, self.store.select_sales(&no_brand)).await?;
            if !rows.is_empty() {
                return Ok((rows, no_brand));
            }
        }
        if primary.brand.is_some() || primary.channel.is_some() {
            tracing::info!("Empty sales result, retrying with date range only");
            let dates_only = primary.dates_only();
            let rows =
                with_timeout(self.query_timeout, self.store.select_sales(&dates_only)).await?;
            return Ok((rows, dates_only));
        }
        Ok((Vec::new(), primary.clone()))
    }

    async fn fetch_sku_rows(&self, filters: &SalesFilters) -> Result<Vec<SkuRecord>, DataError> {
        let requested_brand = filters.effective_brand().map(str::to_string);
        let primary = RowQuery::from_filters(filters, self.policy.page_size, 0);

        let rows = with_timeout(self.query_timeout, self.store.select_sku(&primary)).await?;
        let (mut rows, query_used) = if rows.is_empty() {
            self.relaxed_sku_fetch(&primary).await?
        } else {
            (rows, primary)
        };

        if self.policy.is_possibly_truncated(rows.len(), filters) {
            tracing::warn!(
                "SKU fetch returned exactly {} rows over a wide window; \
                 re-fetching with pagination",
                self.policy.page_size
            );
            let store = Arc::clone(&self.store);
            let query = query_used.clone();
            let timeout = self.query_timeout;
            rows = pagination::load_with_pagination(
                self.policy.page_size,
                self.policy.max_pages,
                move |offset, limit| {
                    let store = Arc::clone(&store);
                    let page_query = query.at_offset(offset, limit);
                    async move { with_timeout(timeout, store.select_sku(&page_query)).await }
                },
            )
            .await?;
        }

        if query_used.brand.is_none() {
            if let Some(brand) = &requested_brand {
                rows.retain(|r| r.brand.eq_ignore_ascii_case(brand));
            }
        }
        Ok(rows)
    }

    async fn relaxed_sku_fetch(
        &self,
        primary: &RowQuery,
    ) -> Result<(Vec<SkuRecord>, RowQuery), DataError> {
        if primary.brand.is_some() {
            tracing::info!("Empty SKU result, retrying without brand filter");
            let no_brand = primary.without_brand();
            let rows =
                with_timeout(self.query_timeout, self.store.select_sku(&no_brand)).await?;
            if !rows.is_empty() {
                return Ok((rows, no_brand));
            }
        }
        if primary.brand.is_some() || primary.channel.is_some() {
            tracing::info!("Empty SKU result, retrying with date range only");
            let dates_only = primary.dates_only();
            let rows =
                with_timeout(self.query_timeout, self.store.select_sku(&dates_only)).await?;
            return Ok((rows, dates_only));
        }
        Ok((Vec::new(), primary.clone()))
    }
}

// ----------------------------------------------------------------------
// Aggregation helpers
// ----------------------------------------------------------------------

fn period_label(date: NaiveDate, granularity: Granularity) -> String {
    use chrono::Datelike;
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => date.format("%Y-%m").to_string(),
    }
}

/// Shape the aggregation procedure's summary rows into the dashboard
/// aggregate. The trend series inherits the queried brand, or the "all"
/// label when none was given.
fn from_aggregation_rows(rows: Vec<AggregationRow>, filters: &SalesFilters) -> AggregatedSales {
    let brand_label = filters.effective_brand().unwrap_or(ALL_BRANDS).to_string();
    let mut channel_revenues: HashMap<String, f64> = HashMap::new();
    let mut total_revenue = 0.0;
    let trend_series = rows
        .into_iter()
        .map(|row| {
            *channel_revenues.entry(row.channel.clone()).or_insert(0.0) += row.revenue;
            total_revenue += row.revenue;
            TrendPoint {
                date: row.period,
                brand: brand_label.clone(),
                channel: row.channel,
                revenue: row.revenue,
            }
        })
        .collect();
    AggregatedSales {
        total_revenue,
        channel_revenues,
        trend_series,
    }
}

/// Aggregate raw rows on the client when the window is too narrow to be
/// worth a server round-trip to the aggregation procedure.
fn aggregate_client_side(rows: &[SalesRecord], filters: &SalesFilters) -> AggregatedSales {
    let granularity = filters.granularity();
    let mut channel_revenues: HashMap<String, f64> = HashMap::new();
    let mut total_revenue = 0.0;
    let mut buckets: BTreeMap<(String, String, String), f64> = BTreeMap::new();

    for row in rows {
        *channel_revenues.entry(row.channel.clone()).or_insert(0.0) += row.revenue;
        total_revenue += row.revenue;
        let key = (
            period_label(row.date, granularity),
            row.brand.clone(),
            row.channel.clone(),
        );
        *buckets.entry(key).or_insert(0.0) += row.revenue;
    }

    let trend_series = buckets
        .into_iter()
        .map(|((date, brand, channel), revenue)| TrendPoint {
            date,
            brand,
            channel,
            revenue,
        })
        .collect();

    AggregatedSales {
        total_revenue,
        channel_revenues,
        trend_series,
    }
}

/// Merge per-SKU totals of two periods. Every current-period SKU appears in
/// the output; SKUs missing from the comparison period get `comparison:
/// None`.
fn merge_sku_comparison(
    current: Vec<SkuRecord>,
    comparison: Vec<SkuRecord>,
) -> SkuComparisonData {
    struct Totals {
        brand: String,
        channel: String,
        units: i64,
        revenue: f64,
    }

    let mut current_totals: BTreeMap<String, Totals> = BTreeMap::new();
    for row in &current {
        let entry = current_totals.entry(row.sku.clone()).or_insert(Totals {
            brand: row.brand.clone(),
            channel: row.channel.clone(),
            units: 0,
            revenue: 0.0,
        });
        entry.units += row.units;
        entry.revenue += row.revenue;
    }

    let mut comparison_totals: HashMap<String, (i64, f64)> = HashMap::new();
    for row in &comparison {
        let entry = comparison_totals.entry(row.sku.clone()).or_insert((0, 0.0));
        entry.0 += row.units;
        entry.1 += row.revenue;
    }

    let merged = current_totals
        .into_iter()
        .map(|(sku, totals)| {
            let comparison = comparison_totals.get(&sku).map(|&(units, revenue)| {
                let growth_amount = totals.revenue - revenue;
                let growth_percent = if revenue == 0.0 {
                    0.0
                } else {
                    growth_amount / revenue * 100.0
                };
                SkuGrowth {
                    revenue,
                    units,
                    growth_amount,
                    growth_percent,
                }
            });
            SkuComparisonRow {
                sku,
                brand: totals.brand,
                channel: totals.channel,
                units: totals.units,
                revenue: totals.revenue,
                comparison,
            }
        })
        .collect();

    SkuComparisonData {
        current,
        comparison,
        merged,
    }
}

#[cfg(test)]
mod tests {
    use super::cache::test_clock::ManualClock;
    use super::*;
    use crate::shared::data::store::UpsertOutcome;
    use async_trait::async_trait;
    use contracts::queries::ViewMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// In-memory stand-in for the managed store, with call counters so
    /// tests can assert which path a load took.
    #[derive(Default)]
    struct MemoryStore {
        sales: Mutex<Vec<SalesRecord>>,
        sku: Mutex<Vec<SkuRecord>>,
        select_calls: AtomicUsize,
        aggregate_calls: AtomicUsize,
    }

    impl MemoryStore {
        fn seed_sales(&self, rows: Vec<SalesRecord>) {
            let mut sales = self.sales.lock().unwrap();
            sales.extend(rows);
            sales.sort_by(|a, b| (a.date, a.external_id()).cmp(&(b.date, b.external_id())));
        }

        fn seed_sku(&self, rows: Vec<SkuRecord>) {
            let mut sku = self.sku.lock().unwrap();
            sku.extend(rows);
            sku.sort_by(|a, b| (a.date, a.external_id()).cmp(&(b.date, b.external_id())));
        }

        fn matches_sales(query: &RowQuery, row: &SalesRecord) -> bool {
            query.start_date.map_or(true, |d| row.date >= d)
                && query.end_date.map_or(true, |d| row.date <= d)
                && query.brand.as_deref().map_or(true, |b| row.brand == b)
                && query.channel.as_deref().map_or(true, |c| row.channel == c)
        }

        fn matches_sku(query: &RowQuery, row: &SkuRecord) -> bool {
            query.start_date.map_or(true, |d| row.date >= d)
                && query.end_date.map_or(true, |d| row.date <= d)
                && query.brand.as_deref().map_or(true, |b| row.brand == b)
                && query.channel.as_deref().map_or(true, |c| row.channel == c)
        }
    }

    #[async_trait]
    impl SalesStore for MemoryStore {
        async fn select_sales(&self, query: &RowQuery) -> Result<Vec<SalesRecord>, DataError> {
            self.select_calls.fetch_add(1, Ordering::SeqCst);
            let sales = self.sales.lock().unwrap();
            Ok(sales
                .iter()
                .filter(|row| Self::matches_sales(query, row))
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .cloned()
                .collect())
        }

        async fn aggregate_sales(
            &self,
            params: &AggregationParams,
        ) -> Result<Vec<AggregationRow>, DataError> {
            self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
            let sales = self.sales.lock().unwrap();
            let mut buckets: BTreeMap<(String, String), f64> = BTreeMap::new();
            for row in sales.iter() {
                let in_range = params.start_date.map_or(true, |d| row.date >= d)
                    && params.end_date.map_or(true, |d| row.date <= d)
                    && params.brand.as_deref().map_or(true, |b| row.brand == b)
                    && params.channel.as_deref().map_or(true, |c| row.channel == c);
                if in_range {
                    let period = period_label(row.date, params.group_by);
                    *buckets.entry((period, row.channel.clone())).or_insert(0.0) += row.revenue;
                }
            }
            Ok(buckets
                .into_iter()
                .map(|((period, channel), revenue)| AggregationRow {
                    period,
                    channel,
                    revenue,
                })
                .collect())
        }

        async fn upsert_sales_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError> {
            let mut sales = self.sales.lock().unwrap();
            for row in rows {
                sales.retain(|r| r.external_id() != row.external_id());
                sales.push(row.clone());
            }
            sales.sort_by(|a, b| (a.date, a.external_id()).cmp(&(b.date, b.external_id())));
            Ok(rows.len())
        }

        async fn upsert_sales_row(&self, row: &SalesRecord) -> Result<UpsertOutcome, DataError> {
            let existed = {
                let sales = self.sales.lock().unwrap();
                sales.iter().any(|r| r.external_id() == row.external_id())
            };
            self.upsert_sales_bulk(std::slice::from_ref(row)).await?;
            Ok(if existed {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            })
        }

        async fn existing_sales_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError> {
            let sales = self.sales.lock().unwrap();
            Ok(ids
                .iter()
                .filter(|id| sales.iter().any(|r| r.external_id() == **id))
                .cloned()
                .collect())
        }

        async fn insert_sales_bulk(&self, rows: &[SalesRecord]) -> Result<usize, DataError> {
            self.upsert_sales_bulk(rows).await
        }

        async fn update_sales_row(&self, row: &SalesRecord) -> Result<(), DataError> {
            self.upsert_sales_bulk(std::slice::from_ref(row)).await?;
            Ok(())
        }

        async fn select_sku(&self, query: &RowQuery) -> Result<Vec<SkuRecord>, DataError> {
            self.select_calls.fetch_add(1, Ordering::SeqCst);
            let sku = self.sku.lock().unwrap();
            Ok(sku
                .iter()
                .filter(|row| Self::matches_sku(query, row))
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .cloned()
                .collect())
        }

        async fn upsert_sku_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError> {
            let mut sku = self.sku.lock().unwrap();
            for row in rows {
                sku.retain(|r| r.external_id() != row.external_id());
                sku.push(row.clone());
            }
            sku.sort_by(|a, b| (a.date, a.external_id()).cmp(&(b.date, b.external_id())));
            Ok(rows.len())
        }

        async fn upsert_sku_row(&self, row: &SkuRecord) -> Result<UpsertOutcome, DataError> {
            let existed = {
                let sku = self.sku.lock().unwrap();
                sku.iter().any(|r| r.external_id() == row.external_id())
            };
            self.upsert_sku_bulk(std::slice::from_ref(row)).await?;
            Ok(if existed {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            })
        }

        async fn existing_sku_ids(&self, ids: &[String]) -> Result<Vec<String>, DataError> {
            let sku = self.sku.lock().unwrap();
            Ok(ids
                .iter()
                .filter(|id| sku.iter().any(|r| r.external_id() == **id))
                .cloned()
                .collect())
        }

        async fn insert_sku_bulk(&self, rows: &[SkuRecord]) -> Result<usize, DataError> {
            self.upsert_sku_bulk(rows).await
        }

        async fn update_sku_row(&self, row: &SkuRecord) -> Result<(), DataError> {
            self.upsert_sku_bulk(std::slice::from_ref(row)).await?;
            Ok(())
        }

        async fn delete_sales_for_brand(
            &self,
            brand: &str,
            limit: u64,
        ) -> Result<u64, DataError> {
            let mut sales = self.sales.lock().unwrap();
            let mut removed = 0u64;
            sales.retain(|r| {
                if r.brand == brand && removed < limit {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            Ok(removed)
        }

        async fn delete_sku_for_brand(&self, brand: &str, limit: u64) -> Result<u64, DataError> {
            let mut sku = self.sku.lock().unwrap();
            let mut removed = 0u64;
            sku.retain(|r| {
                if r.brand == brand && removed < limit {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            Ok(removed)
        }

        async fn reassign_sales_brand(
            &self,
            from: &str,
            to: &str,
            limit: u64,
        ) -> Result<u64, DataError> {
            let mut sales = self.sales.lock().unwrap();
            let mut changed = 0u64;
            for row in sales.iter_mut() {
                if row.brand == from && changed < limit {
                    row.brand = to.to_string();
                    changed += 1;
                }
            }
            Ok(changed)
        }

        async fn reassign_sku_brand(
            &self,
            from: &str,
            to: &str,
            limit: u64,
        ) -> Result<u64, DataError> {
            let mut sku = self.sku.lock().unwrap();
            let mut changed = 0u64;
            for row in sku.iter_mut() {
                if row.brand == from && changed < limit {
                    row.brand = to.to_string();
                    changed += 1;
                }
            }
            Ok(changed)
        }

        async fn delete_targets_for_brand(&self, _brand: &str) -> Result<u64, DataError> {
            Ok(0)
        }

        async fn delete_brand_row(&self, _name: &str) -> Result<bool, DataError> {
            Ok(false)
        }
    }

    fn loader_config() -> LoaderConfig {
        LoaderConfig {
            page_size: 1000,
            wide_window_days: 90,
            max_pages: 50,
            batch_size: 1000,
            debounce_ms: 50,
            query_timeout_secs: 15,
            write_timeout_secs: 60,
        }
    }

    fn cache_config() -> CacheConfig {
        CacheConfig {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }

    fn service(store: Arc<MemoryStore>) -> DataService {
        DataService::new(store, &loader_config(), &cache_config())
    }

    fn sales_row(day: &str, brand: &str, channel: &str, revenue: f64) -> SalesRecord {
        SalesRecord {
            date: date(day),
            brand: brand.to_string(),
            channel: channel.to_string(),
            revenue,
        }
    }

    fn sku_row(day: &str, sku: &str, units: i64, revenue: f64) -> SkuRecord {
        SkuRecord {
            date: date(day),
            brand: "Acme".to_string(),
            channel: "Online".to_string(),
            sku: sku.to_string(),
            units,
            revenue,
        }
    }

    /// Spread `count` rows over a date range, one row per day, cycling.
    fn spread_sales(count: usize, start: &str, days: u64, brand: &str) -> Vec<SalesRecord> {
        let start = date(start);
        (0..count)
            .map(|i| SalesRecord {
                date: start + chrono::Days::new(i as u64 % days),
                brand: brand.to_string(),
                channel: format!("Channel-{}", i),
                revenue: 10.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_second_identical_load_is_served_from_cache() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![sales_row("2025-06-01", "Acme", "Online", 100.0)]);
        let service = service(store.clone());

        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-30")),
            ..Default::default()
        };
        let first = service.load_sales_data(&filters).await.unwrap();
        let second = service.load_sales_data(&filters).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_expired_cache_entry_triggers_refetch() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![sales_row("2025-06-01", "Acme", "Online", 100.0)]);
        let clock = Arc::new(ManualClock::new());
        let service = DataService::with_clock(
            store.clone(),
            &loader_config(),
            &cache_config(),
            clock.clone(),
        );

        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-30")),
            ..Default::default()
        };
        service.load_sales_data(&filters).await.unwrap();

        clock.advance(Duration::from_secs(299));
        service.load_sales_data(&filters).await.unwrap();
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 1, "hit before TTL");

        clock.advance(Duration::from_secs(2));
        service.load_sales_data(&filters).await.unwrap();
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 2, "miss after TTL");
    }

    #[tokio::test]
    async fn test_annual_view_routes_through_aggregation() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![
            sales_row("2025-01-15", "Acme", "Online", 100.0),
            sales_row("2025-03-10", "Acme", "Retail", 250.0),
            sales_row("2025-07-04", "Globex", "Online", 50.0),
        ]);
        let service = service(store.clone());

        let filters = SalesFilters {
            start_date: Some(date("2025-01-01")),
            end_date: Some(date("2025-12-31")),
            brand: Some("All Brands".to_string()),
            view: Some(ViewMode::Annual),
            ..Default::default()
        };
        let aggregate = service.load_aggregated_sales_data(&filters).await.unwrap();

        assert_eq!(store.aggregate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 0, "no raw fetch");
        let channel_sum: f64 = aggregate.channel_revenues.values().sum();
        assert!((channel_sum - aggregate.total_revenue).abs() < 1e-9);
        assert!((aggregate.total_revenue - 400.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exact_cap_over_wide_window_paginates_to_full_set() {
        let store = Arc::new(MemoryStore::default());
        // 1500 rows over a 120-day window: the first fetch returns exactly
        // the 1000-row cap and must not be trusted.
        store.seed_sales(spread_sales(1500, "2025-01-01", 120, "Acme"));
        let service = service(store.clone());

        let filters = SalesFilters {
            start_date: Some(date("2025-01-01")),
            end_date: Some(date("2025-04-30")),
            ..Default::default()
        };
        let rows = service.load_sales_data(&filters).await.unwrap();

        assert_eq!(rows.len(), 1500, "pagination recovered the full set");
        // One capped fetch plus two pages (1000 + 500).
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_result_relaxes_brand_and_post_filters() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![
            sales_row("2025-06-01", "ACME", "Online", 100.0),
            sales_row("2025-06-02", "Globex", "Online", 70.0),
        ]);
        let service = service(store.clone());

        // The store matches brands case-sensitively, so this returns
        // nothing until the ladder drops the filter and the loader applies
        // it client-side, case-insensitively.
        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-30")),
            brand: Some("acme".to_string()),
            ..Default::default()
        };
        let rows = service.load_sales_data(&filters).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].brand, "ACME");
    }

    #[tokio::test]
    async fn test_empty_channel_result_relaxes_to_date_range_only() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![
            sales_row("2025-06-01", "Acme", "Online", 100.0),
            sales_row("2025-06-02", "Globex", "Online", 70.0),
        ]);
        let service = service(store.clone());

        // No brand filter, and a channel that matches nothing: the ladder
        // skips the drop-brand rung and goes straight to dates-only.
        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-30")),
            channel: Some("Retail".to_string()),
            ..Default::default()
        };
        let rows = service.load_sales_data(&filters).await.unwrap();

        assert_eq!(rows.len(), 2, "dates-only rung returned the window");
        // Primary fetch plus the dates-only retry, nothing in between.
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_full_ladder_post_filter_can_come_up_empty() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![sales_row("2025-06-01", "Acme", "Online", 100.0)]);
        let service = service(store.clone());

        // Brand and channel both match nothing: every rung runs, and the
        // client-side brand post-filter legitimately empties the result.
        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-30")),
            brand: Some("Nobody".to_string()),
            channel: Some("Retail".to_string()),
            ..Default::default()
        };
        let rows = service.load_sales_data(&filters).await.unwrap();

        assert!(rows.is_empty());
        // Primary, drop-brand, dates-only.
        assert_eq!(store.select_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sku_comparison_growth_math() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sku(vec![
            sku_row("2025-02-10", "ABC123", 20, 500.0),
            sku_row("2025-02-11", "NEW999", 5, 75.0),
            sku_row("2025-01-10", "ABC123", 18, 400.0),
        ]);
        let service = service(store);

        let current = SalesFilters {
            start_date: Some(date("2025-02-01")),
            end_date: Some(date("2025-02-28")),
            ..Default::default()
        };
        let comparison = SalesFilters {
            start_date: Some(date("2025-01-01")),
            end_date: Some(date("2025-01-31")),
            ..Default::default()
        };
        let data = service
            .load_sku_comparison(&current, &comparison)
            .await
            .unwrap();

        let abc = data.merged.iter().find(|r| r.sku == "ABC123").unwrap();
        let growth = abc.comparison.as_ref().unwrap();
        assert!((growth.growth_amount - 100.0).abs() < 1e-9);
        assert!((growth.growth_percent - 25.0).abs() < 1e-9);
        assert_eq!(growth.units, 18);

        let new = data.merged.iter().find(|r| r.sku == "NEW999").unwrap();
        assert!(new.comparison.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let service = service(store.clone());
        let rows: Vec<SalesRecord> = (0..20)
            .map(|i| sales_row("2025-06-01", &format!("Brand-{}", i), "Online", 10.0))
            .collect();

        let first = service.batch_save_sales_data(&rows, Some(8), None).await;
        assert_eq!(first.inserted, 20);
        assert_eq!(first.failed, 0);

        // Saving the same rows again must not duplicate anything.
        let second = service.batch_save_sales_data(&rows, Some(8), None).await;
        assert_eq!(second.duplicates, 20);
        assert_eq!(second.inserted, 0);

        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-01")),
            ..Default::default()
        };
        let loaded = service.load_sales_data(&filters).await.unwrap();
        assert_eq!(loaded.len(), 20);
    }

    #[tokio::test]
    async fn test_delete_brand_reassigns_all_rows_in_chunks() {
        let store = Arc::new(MemoryStore::default());
        // More than two 500-row chunks worth of facts.
        store.seed_sales(spread_sales(1200, "2025-01-01", 200, "Acme"));
        let service = service(store.clone());

        let touched = service.delete_brand("Acme", Some("Globex")).await.unwrap();
        assert!(touched);

        let sales = store.sales.lock().unwrap();
        assert_eq!(sales.len(), 1200, "reassignment never drops rows");
        assert!(sales.iter().all(|r| r.brand == "Globex"));
    }

    #[tokio::test]
    async fn test_saving_invalidates_cached_reads() {
        let store = Arc::new(MemoryStore::default());
        store.seed_sales(vec![sales_row("2025-06-01", "Acme", "Online", 100.0)]);
        let service = service(store.clone());

        let filters = SalesFilters {
            start_date: Some(date("2025-06-01")),
            end_date: Some(date("2025-06-30")),
            ..Default::default()
        };
        assert_eq!(service.load_sales_data(&filters).await.unwrap().len(), 1);

        let new_rows = vec![sales_row("2025-06-15", "Acme", "Retail", 55.0)];
        service.batch_save_sales_data(&new_rows, None, None).await;

        let reloaded = service.load_sales_data(&filters).await.unwrap();
        assert_eq!(reloaded.len(), 2, "cache was cleared by the write");
    }
}
