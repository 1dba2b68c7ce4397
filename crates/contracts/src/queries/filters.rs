use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel brand value meaning "no brand filter".
pub const ALL_BRANDS: &str = "All Brands";
/// Sentinel channel value meaning "no channel filter".
pub const ALL_CHANNELS: &str = "All Channels";

/// Requested time window preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Annual,
    Quarterly,
    Monthly,
    Custom,
}

/// Time granularity for trend series grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

/// Filter descriptor accepted by every load operation.
///
/// A brand/channel equal to one of the "all" sentinels means "no filter",
/// not a literal match target; use [`SalesFilters::effective_brand`] and
/// [`SalesFilters::effective_channel`] to read the normalized values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub brand: Option<String>,
    pub channel: Option<String>,
    pub view: Option<ViewMode>,
    pub group_by: Option<Granularity>,
}

fn is_all_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("all")
        || trimmed.eq_ignore_ascii_case(ALL_BRANDS)
        || trimmed.eq_ignore_ascii_case(ALL_CHANNELS)
}

impl SalesFilters {
    /// Brand filter with the "All Brands" sentinel normalized away.
    pub fn effective_brand(&self) -> Option<&str> {
        self.brand
            .as_deref()
            .filter(|value| !is_all_sentinel(value))
    }

    /// Channel filter with the "All Channels" sentinel normalized away.
    pub fn effective_channel(&self) -> Option<&str> {
        self.channel
            .as_deref()
            .filter(|value| !is_all_sentinel(value))
    }

    /// Inclusive span of the date range in days, when both ends are set.
    pub fn window_days(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end >= start => {
                Some((end - start).num_days() + 1)
            }
            _ => None,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.group_by.unwrap_or(Granularity::Month)
    }
}
