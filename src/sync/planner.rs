use chrono::{Local, Months, NaiveDate, Utc};
use std::sync::Arc;

use crate::config::DomainSettings;
use crate::models::{DateRange, SyncDomain, SyncMode, SyncWindow};

/// Computes the date range each domain still needs
///
/// - first run (no watermark): `today - initial_lookback_years ..= today`, in any mode
/// - incremental: `watermark - overlap_days ..= today`
/// - backfill: `today - backfill_years ..= today`
pub struct IncrementalWindowPlanner {
    today: Arc<dyn Fn() -> NaiveDate + Send + Sync>,
}

impl Default for IncrementalWindowPlanner {
    fn default() -> Self {
        Self::new(|| Local::now().date_naive())
    }
}

impl IncrementalWindowPlanner {
    pub fn new<F>(today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        Self {
            today: Arc::new(today),
        }
    }

    /// Planner pinned to a fixed date
    pub fn fixed(today: NaiveDate) -> Self {
        Self::new(move || today)
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    pub fn plan(
        &self,
        domain: SyncDomain,
        last_synced_at: Option<NaiveDate>,
        mode: SyncMode,
        settings: &DomainSettings,
    ) -> SyncWindow {
        let end = self.today();

        let start = match (last_synced_at, mode) {
            (None, _) => years_before(end, settings.initial_lookback_years),
            (Some(_), SyncMode::Backfill) => years_before(end, settings.backfill_years),
            (Some(watermark), SyncMode::Incremental) => watermark
                .checked_sub_days(chrono::Days::new(settings.overlap_days.max(0) as u64))
                .unwrap_or(NaiveDate::MIN),
        };

        let window = SyncWindow {
            domain,
            range: DateRange::new(start, end),
            mode,
            last_synced_at,
            planned_at: Utc::now(),
        };

        tracing::debug!(
            "Planned {} window {} ({:?}, watermark {:?})",
            domain,
            window.range,
            mode,
            last_synced_at
        );

        window
    }
}

fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn planner() -> IncrementalWindowPlanner {
        IncrementalWindowPlanner::fixed(date(2024, 6, 14))
    }

    #[test]
    fn test_incremental_subtracts_overlap() {
        let settings = DomainSettings::defaults_for(SyncDomain::DailyPrice);
        let window = planner().plan(
            SyncDomain::DailyPrice,
            Some(date(2024, 6, 10)),
            SyncMode::Incremental,
            &settings,
        );

        assert_eq!(window.start_date(), date(2024, 6, 5));
        assert_eq!(window.end_date(), date(2024, 6, 14));
        assert_eq!(window.last_synced_at, Some(date(2024, 6, 10)));
    }

    #[test]
    fn test_first_run_uses_initial_lookback_in_any_mode() {
        let settings = DomainSettings::defaults_for(SyncDomain::Dividend);
        for mode in [SyncMode::Incremental, SyncMode::Backfill] {
            let window = planner().plan(SyncDomain::Dividend, None, mode, &settings);
            assert_eq!(window.start_date(), date(2019, 6, 14));
        }
    }

    #[test]
    fn test_backfill_ignores_watermark() {
        let settings = DomainSettings::defaults_for(SyncDomain::Income);
        let window = planner().plan(
            SyncDomain::Income,
            Some(date(2024, 6, 13)),
            SyncMode::Backfill,
            &settings,
        );

        assert_eq!(window.start_date(), date(2021, 6, 14));
        assert_eq!(window.mode, SyncMode::Backfill);
    }

    #[test]
    fn test_future_watermark_yields_single_day() {
        let settings = DomainSettings::defaults_for(SyncDomain::SectorMember);
        let window = planner().plan(
            SyncDomain::SectorMember,
            Some(date(2024, 7, 1)),
            SyncMode::Incremental,
            &settings,
        );

        assert_eq!(window.range.days(), 1);
        assert_eq!(window.start_date(), date(2024, 6, 14));
    }

    #[test]
    fn test_leap_day_lookback() {
        let planner = IncrementalWindowPlanner::fixed(date(2024, 2, 29));
        let settings = DomainSettings::defaults_for(SyncDomain::WeeklyPrice);
        let window = planner.plan(SyncDomain::WeeklyPrice, None, SyncMode::Incremental, &settings);
        assert_eq!(window.start_date(), date(2023, 2, 28));
    }
}
