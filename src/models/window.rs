use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use super::domain::SyncDomain;

/// Planning mode for a domain run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Resume from the watermark minus the overlap buffer
    #[default]
    Incremental,
    /// Ignore the watermark and cover the configured lookback
    Backfill,
}

impl SyncMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" => Some(SyncMode::Incremental),
            "backfill" => Some(SyncMode::Backfill),
            _ => None,
        }
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; a start after the end is clamped to the end
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Planned synchronization window for one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncWindow {
    pub domain: SyncDomain,
    pub range: DateRange,
    pub mode: SyncMode,
    /// Watermark the plan was computed from (None on first run)
    pub last_synced_at: Option<NaiveDate>,
    pub planned_at: DateTime<Utc>,
}

impl SyncWindow {
    pub fn start_date(&self) -> NaiveDate {
        self.range.start
    }

    pub fn end_date(&self) -> NaiveDate {
        self.range.end
    }
}
