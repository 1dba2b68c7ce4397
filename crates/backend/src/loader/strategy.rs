use contracts::queries::{SalesFilters, ViewMode};

use crate::shared::config::LoaderConfig;

/// A date span at least this wide counts as a full-year window even without
/// an explicit annual view.
const FULL_YEAR_DAYS: i64 = 360;

/// Named loading heuristics with their thresholds, so strategy choices can
/// be unit-tested away from any network behavior.
#[derive(Debug, Clone)]
pub struct LoaderPolicy {
    /// Server-side row cap for a single select; also the pagination page size.
    pub page_size: u64,
    /// Windows wider than this make an exactly-full result suspect.
    pub wide_window_days: i64,
    /// Hard ceiling on pagination rounds.
    pub max_pages: u32,
}

impl LoaderPolicy {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            page_size: config.page_size,
            wide_window_days: config.wide_window_days,
            max_pages: config.max_pages,
        }
    }

    /// Prefer the server-side aggregation call for wide windows: a full year,
    /// or a quarter scoped to one concrete brand. The payload is then
    /// O(channels x periods) instead of O(rows).
    pub fn should_aggregate(&self, filters: &SalesFilters) -> bool {
        match filters.view {
            Some(ViewMode::Annual) => return true,
            Some(ViewMode::Quarterly) if filters.effective_brand().is_some() => return true,
            _ => {}
        }
        filters
            .window_days()
            .map(|days| days >= FULL_YEAR_DAYS)
            .unwrap_or(false)
    }

    /// A non-aggregated result of exactly the server's page-size cap over a
    /// large window may have been truncated silently. The row count is a
    /// proxy, not an authoritative "has more" signal: a genuine
    /// page-size-row result gets re-fetched for nothing, and a cap at
    /// page_size + 1 would go unnoticed. Documented behavior, kept as is.
    pub fn is_possibly_truncated(&self, row_count: usize, filters: &SalesFilters) -> bool {
        if row_count as u64 != self.page_size {
            return false;
        }
        if matches!(filters.view, Some(ViewMode::Annual)) {
            return true;
        }
        filters
            .window_days()
            .map(|days| days > self.wide_window_days)
            .unwrap_or(false)
    }
}
