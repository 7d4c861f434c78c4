use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Persisted watermark and run marker for one domain
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::sync_state)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SyncStateRow {
    pub domain: String,

    /// Last committed watermark
    pub last_synced_at: Option<NaiveDate>,

    /// Run id holding the run-in-progress marker
    pub run_owner: Option<String>,

    pub run_started_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl SyncStateRow {
    /// Whether `owner` may take the run marker at `now`
    pub fn is_claimable_by(&self, owner: &str, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        match (&self.run_owner, self.run_started_at) {
            (None, _) => true,
            (Some(current), _) if current == owner => true,
            (Some(_), Some(started)) => now - started >= stale_after,
            (Some(_), None) => true,
        }
    }
}
