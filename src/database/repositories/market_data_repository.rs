use crate::database::connection::{PersistenceError, PgPooledConnection};
use crate::database::models::*;
use crate::database::schema;
use crate::models::{Record, SyncDomain};
use chrono::{DateTime, Utc};
use diesel::pg::upsert::excluded;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, SingleValue, SqlType};
use std::sync::Arc;

diesel::define_sql_function! {
    /// SQL `COALESCE` over two nullable values of the same type
    fn coalesce<T: SqlType + SingleValue>(x: Nullable<T>, y: Nullable<T>) -> Nullable<T>;
}

/// Idempotent storage of synchronized records
#[async_trait::async_trait]
pub trait MarketDataRepository: Send + Sync {
    /// Insert-or-update `records` into the domain's table by natural key
    ///
    /// Keys must be unique within `records`. Columns a record leaves empty keep
    /// their stored value. All chunks commit in one transaction.
    fn upsert(
        &self,
        domain: SyncDomain,
        records: &[Record],
        chunk_size: usize,
    ) -> Result<usize, PersistenceError>;

    /// Number of stored rows for a domain
    fn count(&self, domain: SyncDomain) -> Result<i64, PersistenceError>;
}

pub struct MarketDataRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, PersistenceError> + Send + Sync>,
}

impl MarketDataRepositoryImpl {
    /// Create new market data repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, PersistenceError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

macro_rules! upsert_bars {
    ($conn:expr, $table:ident, $row:ident, $bars:expr, $chunk:expr, $now:expr) => {{
        use schema::$table::dsl as t;
        let mut affected = 0;
        for chunk in $bars.chunks($chunk) {
            let rows: Vec<$row> = chunk.iter().map(|b| $row::from_bar(b, $now)).collect();
            affected += diesel::insert_into(t::$table)
                .values(&rows)
                .on_conflict((t::ts_code, t::trade_date))
                .do_update()
                .set((
                    t::open.eq(coalesce(excluded(t::open), t::open)),
                    t::high.eq(coalesce(excluded(t::high), t::high)),
                    t::low.eq(coalesce(excluded(t::low), t::low)),
                    t::close.eq(coalesce(excluded(t::close), t::close)),
                    t::pre_close.eq(coalesce(excluded(t::pre_close), t::pre_close)),
                    t::change.eq(coalesce(excluded(t::change), t::change)),
                    t::pct_chg.eq(coalesce(excluded(t::pct_chg), t::pct_chg)),
                    t::vol.eq(coalesce(excluded(t::vol), t::vol)),
                    t::amount.eq(coalesce(excluded(t::amount), t::amount)),
                    t::updated_at.eq(excluded(t::updated_at)),
                ))
                .execute($conn)?;
        }
        affected
    }};
}

macro_rules! count_rows {
    ($conn:expr, $table:ident) => {
        schema::$table::table.count().get_result::<i64>($conn)?
    };
}

fn typed<'a, T, F>(
    domain: SyncDomain,
    records: &'a [Record],
    project: F,
) -> Result<Vec<&'a T>, PersistenceError>
where
    F: Fn(&'a Record) -> Option<&'a T>,
{
    records
        .iter()
        .map(|r| {
            project(r).ok_or_else(|| {
                PersistenceError::QueryError(format!(
                    "record for {} does not belong to {}",
                    r.ticker(),
                    domain
                ))
            })
        })
        .collect()
}

fn upsert_in_tx(
    conn: &mut PgConnection,
    domain: SyncDomain,
    records: &[Record],
    chunk_size: usize,
    now: DateTime<Utc>,
) -> Result<usize, PersistenceError> {
    let affected = match domain {
        SyncDomain::DailyPrice => {
            let bars = typed(domain, records, Record::as_bar)?;
            upsert_bars!(conn, daily_data, NewDailyRow, bars, chunk_size, now)
        }
        SyncDomain::WeeklyPrice => {
            let bars = typed(domain, records, Record::as_bar)?;
            upsert_bars!(conn, weekly_data, NewWeeklyRow, bars, chunk_size, now)
        }
        SyncDomain::IndexDaily => {
            let bars = typed(domain, records, Record::as_bar)?;
            upsert_bars!(conn, index_daily, NewIndexDailyRow, bars, chunk_size, now)
        }
        SyncDomain::EtfDaily => {
            let bars = typed(domain, records, Record::as_bar)?;
            upsert_bars!(conn, etf_daily, NewEtfDailyRow, bars, chunk_size, now)
        }
        SyncDomain::SectorDaily => {
            let bars = typed(domain, records, Record::as_bar)?;
            upsert_bars!(conn, ths_daily, NewSectorDailyRow, bars, chunk_size, now)
        }
        SyncDomain::SectorMember => {
            use schema::ths_member::dsl as t;
            let members = typed(domain, records, Record::as_member)?;
            let mut affected = 0;
            for chunk in members.chunks(chunk_size) {
                let rows: Vec<NewMemberRow> =
                    chunk.iter().map(|m| NewMemberRow::from_member(m, now)).collect();
                affected += diesel::insert_into(t::ths_member)
                    .values(&rows)
                    .on_conflict((t::ts_code, t::con_code))
                    .do_update()
                    .set((
                        t::con_name.eq(coalesce(excluded(t::con_name), t::con_name)),
                        t::weight.eq(coalesce(excluded(t::weight), t::weight)),
                        t::in_date.eq(coalesce(excluded(t::in_date), t::in_date)),
                        t::out_date.eq(coalesce(excluded(t::out_date), t::out_date)),
                        t::is_new.eq(coalesce(excluded(t::is_new), t::is_new)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::Income => {
            use schema::income_data::dsl as t;
            let statements = typed(domain, records, Record::as_income)?;
            let mut affected = 0;
            for chunk in statements.chunks(chunk_size) {
                let rows: Vec<NewIncomeRow> = chunk
                    .iter()
                    .map(|s| NewIncomeRow::from_statement(s, now))
                    .collect();
                affected += diesel::insert_into(t::income_data)
                    .values(&rows)
                    .on_conflict((t::ts_code, t::end_date))
                    .do_update()
                    .set((
                        t::ann_date.eq(coalesce(excluded(t::ann_date), t::ann_date)),
                        t::f_ann_date.eq(coalesce(excluded(t::f_ann_date), t::f_ann_date)),
                        t::report_type.eq(coalesce(excluded(t::report_type), t::report_type)),
                        t::total_revenue.eq(coalesce(excluded(t::total_revenue), t::total_revenue)),
                        t::revenue.eq(coalesce(excluded(t::revenue), t::revenue)),
                        t::operate_profit.eq(coalesce(excluded(t::operate_profit), t::operate_profit)),
                        t::total_profit.eq(coalesce(excluded(t::total_profit), t::total_profit)),
                        t::n_income.eq(coalesce(excluded(t::n_income), t::n_income)),
                        t::n_income_attr_p.eq(coalesce(excluded(t::n_income_attr_p), t::n_income_attr_p)),
                        t::basic_eps.eq(coalesce(excluded(t::basic_eps), t::basic_eps)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::Cashflow => {
            use schema::cashflow_data::dsl as t;
            let statements = typed(domain, records, Record::as_cashflow)?;
            let mut affected = 0;
            for chunk in statements.chunks(chunk_size) {
                let rows: Vec<NewCashflowRow> = chunk
                    .iter()
                    .map(|s| NewCashflowRow::from_statement(s, now))
                    .collect();
                affected += diesel::insert_into(t::cashflow_data)
                    .values(&rows)
                    .on_conflict((t::ts_code, t::end_date))
                    .do_update()
                    .set((
                        t::ann_date.eq(coalesce(excluded(t::ann_date), t::ann_date)),
                        t::f_ann_date.eq(coalesce(excluded(t::f_ann_date), t::f_ann_date)),
                        t::report_type.eq(coalesce(excluded(t::report_type), t::report_type)),
                        t::n_cashflow_act.eq(coalesce(excluded(t::n_cashflow_act), t::n_cashflow_act)),
                        t::n_cashflow_inv_act
                            .eq(coalesce(excluded(t::n_cashflow_inv_act), t::n_cashflow_inv_act)),
                        t::n_cash_flows_fnc_act
                            .eq(coalesce(excluded(t::n_cash_flows_fnc_act), t::n_cash_flows_fnc_act)),
                        t::free_cashflow.eq(coalesce(excluded(t::free_cashflow), t::free_cashflow)),
                        t::c_cash_equ_end_period
                            .eq(coalesce(excluded(t::c_cash_equ_end_period), t::c_cash_equ_end_period)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::Dividend => {
            use schema::dividend_data::dsl as t;
            let dividends = typed(domain, records, Record::as_dividend)?;
            let mut affected = 0;
            for chunk in dividends.chunks(chunk_size) {
                let rows: Vec<NewDividendRow> = chunk
                    .iter()
                    .map(|d| NewDividendRow::from_record(d, now))
                    .collect();
                affected += diesel::insert_into(t::dividend_data)
                    .values(&rows)
                    .on_conflict((t::ts_code, t::end_date))
                    .do_update()
                    .set((
                        t::ann_date.eq(coalesce(excluded(t::ann_date), t::ann_date)),
                        t::div_proc.eq(coalesce(excluded(t::div_proc), t::div_proc)),
                        t::stk_div.eq(coalesce(excluded(t::stk_div), t::stk_div)),
                        t::cash_div.eq(coalesce(excluded(t::cash_div), t::cash_div)),
                        t::cash_div_tax.eq(coalesce(excluded(t::cash_div_tax), t::cash_div_tax)),
                        t::record_date.eq(coalesce(excluded(t::record_date), t::record_date)),
                        t::ex_date.eq(coalesce(excluded(t::ex_date), t::ex_date)),
                        t::pay_date.eq(coalesce(excluded(t::pay_date), t::pay_date)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::IndexWeekly => {
            let bars = typed(domain, records, Record::as_bar)?;
            upsert_bars!(conn, index_weekly, NewIndexWeeklyRow, bars, chunk_size, now)
        }
        SyncDomain::IndexWeight => {
            use schema::index_weight::dsl as t;
            let weights = typed(domain, records, Record::as_weight)?;
            let mut affected = 0;
            for chunk in weights.chunks(chunk_size) {
                let rows: Vec<NewIndexWeightRow> = chunk
                    .iter()
                    .map(|w| NewIndexWeightRow::from_weight(w, now))
                    .collect();
                affected += diesel::insert_into(t::index_weight)
                    .values(&rows)
                    .on_conflict((t::index_code, t::con_code, t::trade_date))
                    .do_update()
                    .set((
                        t::weight.eq(coalesce(excluded(t::weight), t::weight)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::IndexValuation => {
            use schema::index_dailybasic::dsl as t;
            let valuations = typed(domain, records, Record::as_valuation)?;
            let mut affected = 0;
            for chunk in valuations.chunks(chunk_size) {
                let rows: Vec<NewIndexValuationRow> = chunk
                    .iter()
                    .map(|v| NewIndexValuationRow::from_valuation(v, now))
                    .collect();
                affected += diesel::insert_into(t::index_dailybasic)
                    .values(&rows)
                    .on_conflict((t::ts_code, t::trade_date))
                    .do_update()
                    .set((
                        t::total_mv.eq(coalesce(excluded(t::total_mv), t::total_mv)),
                        t::float_mv.eq(coalesce(excluded(t::float_mv), t::float_mv)),
                        t::total_share.eq(coalesce(excluded(t::total_share), t::total_share)),
                        t::float_share.eq(coalesce(excluded(t::float_share), t::float_share)),
                        t::free_share.eq(coalesce(excluded(t::free_share), t::free_share)),
                        t::turnover_rate.eq(coalesce(excluded(t::turnover_rate), t::turnover_rate)),
                        t::turnover_rate_f
                            .eq(coalesce(excluded(t::turnover_rate_f), t::turnover_rate_f)),
                        t::pe.eq(coalesce(excluded(t::pe), t::pe)),
                        t::pe_ttm.eq(coalesce(excluded(t::pe_ttm), t::pe_ttm)),
                        t::pb.eq(coalesce(excluded(t::pb), t::pb)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::StockBasic => {
            use schema::stock_basic::dsl as t;
            let listings = typed(domain, records, Record::as_stock)?;
            let mut affected = 0;
            for chunk in listings.chunks(chunk_size) {
                let rows: Vec<NewStockBasicRow> = chunk
                    .iter()
                    .map(|l| NewStockBasicRow::from_listing(l, now))
                    .collect();
                affected += diesel::insert_into(t::stock_basic)
                    .values(&rows)
                    .on_conflict(t::ts_code)
                    .do_update()
                    .set((
                        t::symbol.eq(coalesce(excluded(t::symbol), t::symbol)),
                        t::name.eq(coalesce(excluded(t::name), t::name)),
                        t::area.eq(coalesce(excluded(t::area), t::area)),
                        t::industry.eq(coalesce(excluded(t::industry), t::industry)),
                        t::market.eq(coalesce(excluded(t::market), t::market)),
                        t::exchange.eq(coalesce(excluded(t::exchange), t::exchange)),
                        t::list_date.eq(coalesce(excluded(t::list_date), t::list_date)),
                        t::list_status.eq(coalesce(excluded(t::list_status), t::list_status)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::IndexBasic => {
            use schema::index_basic::dsl as t;
            let listings = typed(domain, records, Record::as_index)?;
            let mut affected = 0;
            for chunk in listings.chunks(chunk_size) {
                let rows: Vec<NewIndexBasicRow> = chunk
                    .iter()
                    .map(|l| NewIndexBasicRow::from_listing(l, now))
                    .collect();
                affected += diesel::insert_into(t::index_basic)
                    .values(&rows)
                    .on_conflict(t::ts_code)
                    .do_update()
                    .set((
                        t::name.eq(coalesce(excluded(t::name), t::name)),
                        t::fullname.eq(coalesce(excluded(t::fullname), t::fullname)),
                        t::market.eq(coalesce(excluded(t::market), t::market)),
                        t::publisher.eq(coalesce(excluded(t::publisher), t::publisher)),
                        t::index_type.eq(coalesce(excluded(t::index_type), t::index_type)),
                        t::category.eq(coalesce(excluded(t::category), t::category)),
                        t::base_date.eq(coalesce(excluded(t::base_date), t::base_date)),
                        t::base_point.eq(coalesce(excluded(t::base_point), t::base_point)),
                        t::list_date.eq(coalesce(excluded(t::list_date), t::list_date)),
                        t::weight_rule.eq(coalesce(excluded(t::weight_rule), t::weight_rule)),
                        t::exp_date.eq(coalesce(excluded(t::exp_date), t::exp_date)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::EtfBasic => {
            use schema::etf_basic::dsl as t;
            let listings = typed(domain, records, Record::as_etf)?;
            let mut affected = 0;
            for chunk in listings.chunks(chunk_size) {
                let rows: Vec<NewEtfBasicRow> = chunk
                    .iter()
                    .map(|l| NewEtfBasicRow::from_listing(l, now))
                    .collect();
                affected += diesel::insert_into(t::etf_basic)
                    .values(&rows)
                    .on_conflict(t::ts_code)
                    .do_update()
                    .set((
                        t::csname.eq(coalesce(excluded(t::csname), t::csname)),
                        t::extname.eq(coalesce(excluded(t::extname), t::extname)),
                        t::index_code.eq(coalesce(excluded(t::index_code), t::index_code)),
                        t::index_name.eq(coalesce(excluded(t::index_name), t::index_name)),
                        t::setup_date.eq(coalesce(excluded(t::setup_date), t::setup_date)),
                        t::list_date.eq(coalesce(excluded(t::list_date), t::list_date)),
                        t::list_status.eq(coalesce(excluded(t::list_status), t::list_status)),
                        t::exchange.eq(coalesce(excluded(t::exchange), t::exchange)),
                        t::mgr_name.eq(coalesce(excluded(t::mgr_name), t::mgr_name)),
                        t::mgt_fee.eq(coalesce(excluded(t::mgt_fee), t::mgt_fee)),
                        t::etf_type.eq(coalesce(excluded(t::etf_type), t::etf_type)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
        SyncDomain::SectorIndex => {
            use schema::ths_index::dsl as t;
            let sectors = typed(domain, records, Record::as_sector)?;
            let mut affected = 0;
            for chunk in sectors.chunks(chunk_size) {
                let rows: Vec<NewSectorIndexRow> = chunk
                    .iter()
                    .map(|s| NewSectorIndexRow::from_sector(s, now))
                    .collect();
                affected += diesel::insert_into(t::ths_index)
                    .values(&rows)
                    .on_conflict(t::ts_code)
                    .do_update()
                    .set((
                        t::name.eq(coalesce(excluded(t::name), t::name)),
                        t::count.eq(coalesce(excluded(t::count), t::count)),
                        t::exchange.eq(coalesce(excluded(t::exchange), t::exchange)),
                        t::list_date.eq(coalesce(excluded(t::list_date), t::list_date)),
                        t::index_type.eq(coalesce(excluded(t::index_type), t::index_type)),
                        t::updated_at.eq(excluded(t::updated_at)),
                    ))
                    .execute(conn)?;
            }
            affected
        }
    };

    Ok(affected)
}

#[async_trait::async_trait]
impl MarketDataRepository for MarketDataRepositoryImpl {
    fn upsert(
        &self,
        domain: SyncDomain,
        records: &[Record],
        chunk_size: usize,
    ) -> Result<usize, PersistenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = (self.get_conn)()?;
        let now = Utc::now();
        let chunk_size = chunk_size.max(1);

        // Use transaction for atomicity
        conn.transaction::<_, PersistenceError, _>(|conn| {
            upsert_in_tx(conn, domain, records, chunk_size, now)
        })
    }

    fn count(&self, domain: SyncDomain) -> Result<i64, PersistenceError> {
        let mut conn = (self.get_conn)()?;
        let conn = &mut conn;

        let count = match domain {
            SyncDomain::DailyPrice => count_rows!(conn, daily_data),
            SyncDomain::WeeklyPrice => count_rows!(conn, weekly_data),
            SyncDomain::IndexDaily => count_rows!(conn, index_daily),
            SyncDomain::EtfDaily => count_rows!(conn, etf_daily),
            SyncDomain::SectorDaily => count_rows!(conn, ths_daily),
            SyncDomain::SectorMember => count_rows!(conn, ths_member),
            SyncDomain::Income => count_rows!(conn, income_data),
            SyncDomain::Cashflow => count_rows!(conn, cashflow_data),
            SyncDomain::Dividend => count_rows!(conn, dividend_data),
            SyncDomain::IndexWeekly => count_rows!(conn, index_weekly),
            SyncDomain::IndexWeight => count_rows!(conn, index_weight),
            SyncDomain::IndexValuation => count_rows!(conn, index_dailybasic),
            SyncDomain::StockBasic => count_rows!(conn, stock_basic),
            SyncDomain::IndexBasic => count_rows!(conn, index_basic),
            SyncDomain::EtfBasic => count_rows!(conn, etf_basic),
            SyncDomain::SectorIndex => count_rows!(conn, ths_index),
        };

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::establish_connection_pool;
    use crate::models::PriceBar;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn bar(code: &str, close: Option<rust_decimal::Decimal>) -> Record {
        Record::Bar(PriceBar {
            ts_code: code.to_string(),
            trade_date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            open: Some(dec!(10)),
            high: Some(dec!(11)),
            low: Some(dec!(9)),
            close,
            pre_close: None,
            change: None,
            pct_chg: None,
            vol: Some(dec!(1000)),
            amount: None,
        })
    }

    #[test]
    #[ignore = "requires DATABASE_URL with the daily_data table"]
    fn test_upsert_is_idempotent() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = establish_connection_pool(&url, 2).unwrap();
        let repo = MarketDataRepositoryImpl::new(move || pool.get_conn());

        let records = vec![bar("TEST01.SH", Some(dec!(10.5))), bar("TEST02.SH", None)];
        let before = repo.count(SyncDomain::DailyPrice).unwrap();

        repo.upsert(SyncDomain::DailyPrice, &records, 1).unwrap();
        let after_first = repo.count(SyncDomain::DailyPrice).unwrap();
        repo.upsert(SyncDomain::DailyPrice, &records, 1).unwrap();
        let after_second = repo.count(SyncDomain::DailyPrice).unwrap();

        assert!(after_first <= before + 2);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_typed_rejects_foreign_records() {
        let records = vec![bar("600000.SH", None)];
        let err = typed(SyncDomain::Income, &records, Record::as_income).unwrap_err();
        assert!(err.to_string().contains("does not belong to income"));
    }

    #[test]
    fn test_typed_projects_reference_records() {
        let records = vec![Record::Sector(crate::models::SectorIndex {
            ts_code: "885760.TI".to_string(),
            name: Some("储能".to_string()),
            count: Some(142),
            exchange: Some("A".to_string()),
            list_date: None,
            index_type: Some("N".to_string()),
        })];

        let sectors = typed(SyncDomain::SectorIndex, &records, Record::as_sector).unwrap();
        assert_eq!(sectors[0].count, Some(142));
        assert!(typed(SyncDomain::StockBasic, &records, Record::as_stock).is_err());
    }
}
