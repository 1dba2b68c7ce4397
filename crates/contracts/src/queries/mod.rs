pub mod aggregates;
pub mod comparison;
pub mod filters;

pub use aggregates::{AggregatedSales, TrendPoint};
pub use comparison::{SkuComparisonData, SkuComparisonRow, SkuGrowth};
pub use filters::{Granularity, SalesFilters, ViewMode, ALL_BRANDS, ALL_CHANNELS};
