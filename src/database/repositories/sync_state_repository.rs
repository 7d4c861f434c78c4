use crate::database::connection::{PersistenceError, PgPooledConnection};
use crate::database::models::SyncStateRow;
use crate::database::schema::sync_state;
use crate::models::SyncDomain;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use std::sync::Arc;

/// Watermarks and run-in-progress markers, one row per domain
#[async_trait::async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Cheap connectivity check run before any domain starts
    fn ping(&self) -> Result<(), PersistenceError>;

    fn load_watermark(&self, domain: SyncDomain) -> Result<Option<NaiveDate>, PersistenceError>;

    /// Take the domain's run marker for `owner`
    ///
    /// Returns false when another owner holds a marker younger than `stale_after`.
    fn try_acquire_run(
        &self,
        domain: SyncDomain,
        owner: &str,
        stale_after: chrono::Duration,
    ) -> Result<bool, PersistenceError>;

    /// Clear the marker if `owner` still holds it
    fn release_run(&self, domain: SyncDomain, owner: &str) -> Result<(), PersistenceError>;

    /// Advance the watermark to `max(stored, date)` while `owner` holds the marker
    ///
    /// Returns the stored watermark after the commit.
    fn commit_watermark(
        &self,
        domain: SyncDomain,
        date: NaiveDate,
        owner: &str,
    ) -> Result<NaiveDate, PersistenceError>;

    /// All rows, ordered by domain
    fn list(&self) -> Result<Vec<SyncStateRow>, PersistenceError>;
}

pub struct SyncStateRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, PersistenceError> + Send + Sync>,
}

impl SyncStateRepositoryImpl {
    /// Create new sync state repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, PersistenceError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

/// Make sure the domain's row exists, then lock it for the rest of the transaction
fn lock_row(conn: &mut PgConnection, domain: SyncDomain) -> Result<SyncStateRow, PersistenceError> {
    diesel::insert_into(sync_state::table)
        .values((
            sync_state::domain.eq(domain.as_str()),
            sync_state::updated_at.eq(Utc::now()),
        ))
        .on_conflict(sync_state::domain)
        .do_nothing()
        .execute(conn)?;

    sync_state::table
        .filter(sync_state::domain.eq(domain.as_str()))
        .select(SyncStateRow::as_select())
        .for_update()
        .first(conn)
        .map_err(PersistenceError::from)
}

#[async_trait::async_trait]
impl SyncStateRepository for SyncStateRepositoryImpl {
    fn ping(&self) -> Result<(), PersistenceError> {
        let mut conn = (self.get_conn)()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn load_watermark(&self, domain: SyncDomain) -> Result<Option<NaiveDate>, PersistenceError> {
        let mut conn = (self.get_conn)()?;

        sync_state::table
            .filter(sync_state::domain.eq(domain.as_str()))
            .select(sync_state::last_synced_at)
            .first::<Option<NaiveDate>>(&mut conn)
            .optional()
            .map(Option::flatten)
            .map_err(PersistenceError::from)
    }

    fn try_acquire_run(
        &self,
        domain: SyncDomain,
        owner: &str,
        stale_after: chrono::Duration,
    ) -> Result<bool, PersistenceError> {
        let mut conn = (self.get_conn)()?;

        conn.transaction::<_, PersistenceError, _>(|conn| {
            let row = lock_row(conn, domain)?;
            let now = Utc::now();

            if !row.is_claimable_by(owner, now, stale_after) {
                tracing::debug!(
                    "Run marker for {} held by {:?} since {:?}",
                    domain,
                    row.run_owner,
                    row.run_started_at
                );
                return Ok(false);
            }

            if let Some(previous) = row.run_owner.as_deref().filter(|o| *o != owner) {
                tracing::warn!("Taking over stale run marker for {} from {}", domain, previous);
            }

            diesel::update(sync_state::table)
                .filter(sync_state::domain.eq(domain.as_str()))
                .set((
                    sync_state::run_owner.eq(Some(owner)),
                    sync_state::run_started_at.eq(Some(now)),
                    sync_state::updated_at.eq(now),
                ))
                .execute(conn)?;

            Ok(true)
        })
    }

    fn release_run(&self, domain: SyncDomain, owner: &str) -> Result<(), PersistenceError> {
        let mut conn = (self.get_conn)()?;

        diesel::update(sync_state::table)
            .filter(sync_state::domain.eq(domain.as_str()))
            .filter(sync_state::run_owner.eq(owner))
            .set((
                sync_state::run_owner.eq(None::<String>),
                sync_state::run_started_at.eq(None::<chrono::DateTime<Utc>>),
                sync_state::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    fn commit_watermark(
        &self,
        domain: SyncDomain,
        date: NaiveDate,
        owner: &str,
    ) -> Result<NaiveDate, PersistenceError> {
        let mut conn = (self.get_conn)()?;

        conn.transaction::<_, PersistenceError, _>(|conn| {
            let row = lock_row(conn, domain)?;

            if row.run_owner.as_deref() != Some(owner) {
                return Err(PersistenceError::RunMarkerLost(domain.to_string()));
            }

            let watermark = row.last_synced_at.map_or(date, |prev| prev.max(date));

            diesel::update(sync_state::table)
                .filter(sync_state::domain.eq(domain.as_str()))
                .set((
                    sync_state::last_synced_at.eq(Some(watermark)),
                    sync_state::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            Ok(watermark)
        })
    }

    fn list(&self) -> Result<Vec<SyncStateRow>, PersistenceError> {
        let mut conn = (self.get_conn)()?;

        sync_state::table
            .select(SyncStateRow::as_select())
            .order(sync_state::domain.asc())
            .load(&mut conn)
            .map_err(PersistenceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::establish_connection_pool;

    #[test]
    #[ignore = "requires DATABASE_URL with the sync_state table"]
    fn test_marker_and_monotonic_commit() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = establish_connection_pool(&url, 2).unwrap();
        let repo = SyncStateRepositoryImpl::new(move || pool.get_conn());
        let domain = SyncDomain::Dividend;
        let timeout = chrono::Duration::hours(6);

        assert!(repo.try_acquire_run(domain, "run-a", timeout).unwrap());
        assert!(!repo.try_acquire_run(domain, "run-b", timeout).unwrap());

        let later = NaiveDate::from_ymd_opt(2099, 1, 2).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        assert_eq!(repo.commit_watermark(domain, later, "run-a").unwrap(), later);
        assert_eq!(repo.commit_watermark(domain, earlier, "run-a").unwrap(), later);
        assert!(repo.commit_watermark(domain, later, "run-b").is_err());

        repo.release_run(domain, "run-a").unwrap();
        assert!(repo.try_acquire_run(domain, "run-b", timeout).unwrap());
        repo.release_run(domain, "run-b").unwrap();
    }
}
