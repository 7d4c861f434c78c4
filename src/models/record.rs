use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::domain::{DomainKind, SyncDomain};
use crate::error::DataValidationError;
use crate::provider::RawRecord;

/// Natural key of a persisted record
///
/// Uniqueness is enforced by the writer, never by the fetch layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NaturalKey {
    /// (ticker, trade_date) for bars, (ticker, end_date) for statements
    Dated { ticker: String, date: NaiveDate },
    /// (sector, constituent) for memberships
    Member { sector: String, constituent: String },
    /// (index, constituent, trade_date) for index weights
    Weight {
        index: String,
        constituent: String,
        date: NaiveDate,
    },
    /// Code alone for reference listings
    Code { ticker: String },
}

/// Daily/weekly bar shared by every price/volume domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceBar {
    pub ts_code: String,
    pub trade_date: NaiveDate,
    #[schema(value_type = Option<String>)]
    pub open: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub high: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub low: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub close: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub pre_close: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub change: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub pct_chg: Option<Decimal>,
    /// Volume in lots
    #[schema(value_type = Option<String>)]
    pub vol: Option<Decimal>,
    /// Turnover in thousands
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
}

/// Sector constituent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SectorMember {
    /// Sector index code
    pub ts_code: String,
    /// Constituent stock code
    pub con_code: String,
    pub con_name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub weight: Option<Decimal>,
    pub in_date: Option<NaiveDate>,
    pub out_date: Option<NaiveDate>,
    pub is_new: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IncomeStatement {
    pub ts_code: String,
    /// Report period end
    pub end_date: NaiveDate,
    pub ann_date: Option<NaiveDate>,
    pub f_ann_date: Option<NaiveDate>,
    pub report_type: Option<String>,
    #[schema(value_type = Option<String>)]
    pub total_revenue: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub revenue: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub operate_profit: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub total_profit: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub n_income: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub n_income_attr_p: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub basic_eps: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CashflowStatement {
    pub ts_code: String,
    pub end_date: NaiveDate,
    pub ann_date: Option<NaiveDate>,
    pub f_ann_date: Option<NaiveDate>,
    pub report_type: Option<String>,
    #[schema(value_type = Option<String>)]
    pub n_cashflow_act: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub n_cashflow_inv_act: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub n_cash_flows_fnc_act: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub free_cashflow: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub c_cash_equ_end_period: Option<Decimal>,
}

/// Dividend plan; a later stage for the same period replaces the earlier one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DividendRecord {
    pub ts_code: String,
    pub end_date: NaiveDate,
    pub ann_date: Option<NaiveDate>,
    pub div_proc: Option<String>,
    #[schema(value_type = Option<String>)]
    pub stk_div: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub cash_div: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub cash_div_tax: Option<Decimal>,
    pub record_date: Option<NaiveDate>,
    pub ex_date: Option<NaiveDate>,
    pub pay_date: Option<NaiveDate>,
}

/// Constituent weight of an index on a rebalance date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexWeight {
    pub index_code: String,
    pub con_code: String,
    pub trade_date: NaiveDate,
    /// Percent of the index
    #[schema(value_type = Option<String>)]
    pub weight: Option<Decimal>,
}

/// Daily valuation metrics of an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexValuation {
    pub ts_code: String,
    pub trade_date: NaiveDate,
    #[schema(value_type = Option<String>)]
    pub total_mv: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub float_mv: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub total_share: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub float_share: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub free_share: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub turnover_rate: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub turnover_rate_f: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub pe: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub pe_ttm: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub pb: Option<Decimal>,
}

/// Listed stock metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StockListing {
    pub ts_code: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub area: Option<String>,
    pub industry: Option<String>,
    /// Board (main, ChiNext, STAR)
    pub market: Option<String>,
    pub exchange: Option<String>,
    pub list_date: Option<NaiveDate>,
    pub list_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexListing {
    pub ts_code: String,
    pub name: Option<String>,
    pub fullname: Option<String>,
    pub market: Option<String>,
    pub publisher: Option<String>,
    pub index_type: Option<String>,
    pub category: Option<String>,
    pub base_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub base_point: Option<Decimal>,
    pub list_date: Option<NaiveDate>,
    pub weight_rule: Option<String>,
    pub exp_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EtfListing {
    pub ts_code: String,
    pub csname: Option<String>,
    pub extname: Option<String>,
    /// Tracked index
    pub index_code: Option<String>,
    pub index_name: Option<String>,
    pub setup_date: Option<NaiveDate>,
    pub list_date: Option<NaiveDate>,
    pub list_status: Option<String>,
    pub exchange: Option<String>,
    pub mgr_name: Option<String>,
    /// Annual management fee in percent
    #[schema(value_type = Option<String>)]
    pub mgt_fee: Option<Decimal>,
    pub etf_type: Option<String>,
}

/// Concept or industry sector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SectorIndex {
    pub ts_code: String,
    pub name: Option<String>,
    /// Number of constituents
    pub count: Option<i32>,
    pub exchange: Option<String>,
    pub list_date: Option<NaiveDate>,
    /// N (concept), I (industry), ...
    pub index_type: Option<String>,
}

/// A validated upstream row ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Bar(PriceBar),
    Member(SectorMember),
    Income(IncomeStatement),
    Cashflow(CashflowStatement),
    Dividend(DividendRecord),
    Weight(IndexWeight),
    Valuation(IndexValuation),
    Stock(StockListing),
    Index(IndexListing),
    Etf(EtfListing),
    Sector(SectorIndex),
}

// Keeps the stored value for every optional field the new record leaves empty
macro_rules! fill_missing {
    ($target:expr, $prior:expr; $($field:ident),+ $(,)?) => {
        $(
            if $target.$field.is_none() {
                $target.$field = $prior.$field.clone();
            }
        )+
    };
}

impl Record {
    /// Convert an upstream row into a typed record for `domain`
    pub fn from_raw(domain: SyncDomain, raw: &RawRecord) -> Result<Self, DataValidationError> {
        let code_field = domain.code_field();
        let ts_code = raw
            .get_str(code_field)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                DataValidationError::new(domain, "<unknown>", format!("missing {}", code_field))
            })?;

        let invalid = |reason: String| DataValidationError::new(domain, ts_code.clone(), reason);
        let decimal = |field: &str| raw.get_decimal(field).map_err(&invalid);
        let date = |field: &str| raw.get_date(field).map_err(&invalid);
        let required_date = |field: &str| -> Result<NaiveDate, DataValidationError> {
            date(field)?.ok_or_else(|| invalid(format!("missing {}", field)))
        };
        let required_str = |field: &str| -> Result<String, DataValidationError> {
            raw.get_str(field)
                .ok_or_else(|| invalid(format!("missing {}", field)))
        };
        let text = |field: &str| raw.get_str(field);

        let record = match domain.kind() {
            DomainKind::PriceVolume => {
                let pct_chg = match decimal("pct_chg")? {
                    Some(value) => Some(value),
                    None => decimal("pct_change")?,
                };
                let bar = PriceBar {
                    trade_date: required_date("trade_date")?,
                    open: decimal("open")?,
                    high: decimal("high")?,
                    low: decimal("low")?,
                    close: decimal("close")?,
                    pre_close: decimal("pre_close")?,
                    change: decimal("change")?,
                    pct_chg,
                    vol: decimal("vol")?,
                    amount: decimal("amount")?,
                    ts_code: ts_code.clone(),
                };
                validate_bar(&bar).map_err(&invalid)?;
                Record::Bar(bar)
            }
            DomainKind::Membership => Record::Member(SectorMember {
                con_code: required_str("con_code")?,
                con_name: raw.get_str("con_name"),
                weight: decimal("weight")?,
                in_date: date("in_date")?,
                out_date: date("out_date")?,
                is_new: raw.get_str("is_new"),
                ts_code: ts_code.clone(),
            }),
            DomainKind::FinancialStatement => match domain {
                SyncDomain::Income => Record::Income(IncomeStatement {
                    end_date: required_date("end_date")?,
                    ann_date: date("ann_date")?,
                    f_ann_date: date("f_ann_date")?,
                    report_type: raw.get_str("report_type"),
                    total_revenue: decimal("total_revenue")?,
                    revenue: decimal("revenue")?,
                    operate_profit: decimal("operate_profit")?,
                    total_profit: decimal("total_profit")?,
                    n_income: decimal("n_income")?,
                    n_income_attr_p: decimal("n_income_attr_p")?,
                    basic_eps: decimal("basic_eps")?,
                    ts_code: ts_code.clone(),
                }),
                SyncDomain::Cashflow => Record::Cashflow(CashflowStatement {
                    end_date: required_date("end_date")?,
                    ann_date: date("ann_date")?,
                    f_ann_date: date("f_ann_date")?,
                    report_type: raw.get_str("report_type"),
                    n_cashflow_act: decimal("n_cashflow_act")?,
                    n_cashflow_inv_act: decimal("n_cashflow_inv_act")?,
                    n_cash_flows_fnc_act: decimal("n_cash_flows_fnc_act")?,
                    free_cashflow: decimal("free_cashflow")?,
                    c_cash_equ_end_period: decimal("c_cash_equ_end_period")?,
                    ts_code: ts_code.clone(),
                }),
                _ => Record::Dividend(DividendRecord {
                    end_date: required_date("end_date")?,
                    ann_date: date("ann_date")?,
                    div_proc: raw.get_str("div_proc"),
                    stk_div: decimal("stk_div")?,
                    cash_div: decimal("cash_div")?,
                    cash_div_tax: decimal("cash_div_tax")?,
                    record_date: date("record_date")?,
                    ex_date: date("ex_date")?,
                    pay_date: date("pay_date")?,
                    ts_code: ts_code.clone(),
                }),
            },
            DomainKind::Weighting => Record::Weight(IndexWeight {
                con_code: required_str("con_code")?,
                trade_date: required_date("trade_date")?,
                weight: decimal("weight")?,
                index_code: ts_code.clone(),
            }),
            DomainKind::Valuation => Record::Valuation(IndexValuation {
                trade_date: required_date("trade_date")?,
                total_mv: decimal("total_mv")?,
                float_mv: decimal("float_mv")?,
                total_share: decimal("total_share")?,
                float_share: decimal("float_share")?,
                free_share: decimal("free_share")?,
                turnover_rate: decimal("turnover_rate")?,
                turnover_rate_f: decimal("turnover_rate_f")?,
                pe: decimal("pe")?,
                pe_ttm: decimal("pe_ttm")?,
                pb: decimal("pb")?,
                ts_code: ts_code.clone(),
            }),
            DomainKind::Reference => match domain {
                SyncDomain::StockBasic => Record::Stock(StockListing {
                    symbol: text("symbol"),
                    name: text("name"),
                    area: text("area"),
                    industry: text("industry"),
                    market: text("market"),
                    exchange: text("exchange"),
                    list_date: date("list_date")?,
                    list_status: text("list_status"),
                    ts_code: ts_code.clone(),
                }),
                SyncDomain::IndexBasic => Record::Index(IndexListing {
                    name: text("name"),
                    fullname: text("fullname"),
                    market: text("market"),
                    publisher: text("publisher"),
                    index_type: text("index_type"),
                    category: text("category"),
                    base_date: date("base_date")?,
                    base_point: decimal("base_point")?,
                    list_date: date("list_date")?,
                    weight_rule: text("weight_rule"),
                    exp_date: date("exp_date")?,
                    ts_code: ts_code.clone(),
                }),
                SyncDomain::EtfBasic => Record::Etf(EtfListing {
                    csname: text("csname"),
                    extname: text("extname"),
                    index_code: text("index_code"),
                    index_name: text("index_name"),
                    setup_date: date("setup_date")?,
                    list_date: date("list_date")?,
                    list_status: text("list_status"),
                    exchange: text("exchange"),
                    mgr_name: text("mgr_name"),
                    mgt_fee: decimal("mgt_fee")?,
                    etf_type: text("etf_type"),
                    ts_code: ts_code.clone(),
                }),
                _ => Record::Sector(SectorIndex {
                    name: text("name"),
                    count: decimal("count")?
                        .map(|n| {
                            n.to_i32()
                                .ok_or_else(|| invalid(format!("count out of range: {}", n)))
                        })
                        .transpose()?,
                    exchange: text("exchange"),
                    list_date: date("list_date")?,
                    index_type: text("type"),
                    ts_code: ts_code.clone(),
                }),
            },
        };

        Ok(record)
    }

    /// Ticker the record belongs to (the sector code for memberships)
    pub fn ticker(&self) -> &str {
        match self {
            Record::Bar(r) => &r.ts_code,
            Record::Member(r) => &r.ts_code,
            Record::Income(r) => &r.ts_code,
            Record::Cashflow(r) => &r.ts_code,
            Record::Dividend(r) => &r.ts_code,
            Record::Weight(r) => &r.index_code,
            Record::Valuation(r) => &r.ts_code,
            Record::Stock(r) => &r.ts_code,
            Record::Index(r) => &r.ts_code,
            Record::Etf(r) => &r.ts_code,
            Record::Sector(r) => &r.ts_code,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Record::Bar(r) => NaturalKey::Dated {
                ticker: r.ts_code.clone(),
                date: r.trade_date,
            },
            Record::Member(r) => NaturalKey::Member {
                sector: r.ts_code.clone(),
                constituent: r.con_code.clone(),
            },
            Record::Income(r) => NaturalKey::Dated {
                ticker: r.ts_code.clone(),
                date: r.end_date,
            },
            Record::Cashflow(r) => NaturalKey::Dated {
                ticker: r.ts_code.clone(),
                date: r.end_date,
            },
            Record::Dividend(r) => NaturalKey::Dated {
                ticker: r.ts_code.clone(),
                date: r.end_date,
            },
            Record::Weight(r) => NaturalKey::Weight {
                index: r.index_code.clone(),
                constituent: r.con_code.clone(),
                date: r.trade_date,
            },
            Record::Valuation(r) => NaturalKey::Dated {
                ticker: r.ts_code.clone(),
                date: r.trade_date,
            },
            Record::Stock(_) | Record::Index(_) | Record::Etf(_) | Record::Sector(_) => {
                NaturalKey::Code {
                    ticker: self.ticker().to_string(),
                }
            }
        }
    }

    /// Merge with the stored row for the same key: fields this record provides win,
    /// fields it leaves empty keep their stored value
    pub fn merged_over(mut self, prior: &Record) -> Record {
        match (&mut self, prior) {
            (Record::Bar(new), Record::Bar(old)) => {
                fill_missing!(new, old; open, high, low, close, pre_close, change, pct_chg, vol, amount);
            }
            (Record::Member(new), Record::Member(old)) => {
                fill_missing!(new, old; con_name, weight, in_date, out_date, is_new);
            }
            (Record::Income(new), Record::Income(old)) => {
                fill_missing!(new, old; ann_date, f_ann_date, report_type, total_revenue, revenue,
                    operate_profit, total_profit, n_income, n_income_attr_p, basic_eps);
            }
            (Record::Cashflow(new), Record::Cashflow(old)) => {
                fill_missing!(new, old; ann_date, f_ann_date, report_type, n_cashflow_act,
                    n_cashflow_inv_act, n_cash_flows_fnc_act, free_cashflow, c_cash_equ_end_period);
            }
            (Record::Dividend(new), Record::Dividend(old)) => {
                fill_missing!(new, old; ann_date, div_proc, stk_div, cash_div, cash_div_tax,
                    record_date, ex_date, pay_date);
            }
            (Record::Weight(new), Record::Weight(old)) => {
                fill_missing!(new, old; weight);
            }
            (Record::Valuation(new), Record::Valuation(old)) => {
                fill_missing!(new, old; total_mv, float_mv, total_share, float_share, free_share,
                    turnover_rate, turnover_rate_f, pe, pe_ttm, pb);
            }
            (Record::Stock(new), Record::Stock(old)) => {
                fill_missing!(new, old; symbol, name, area, industry, market, exchange, list_date,
                    list_status);
            }
            (Record::Index(new), Record::Index(old)) => {
                fill_missing!(new, old; name, fullname, market, publisher, index_type, category,
                    base_date, base_point, list_date, weight_rule, exp_date);
            }
            (Record::Etf(new), Record::Etf(old)) => {
                fill_missing!(new, old; csname, extname, index_code, index_name, setup_date,
                    list_date, list_status, exchange, mgr_name, mgt_fee, etf_type);
            }
            (Record::Sector(new), Record::Sector(old)) => {
                fill_missing!(new, old; name, count, exchange, list_date, index_type);
            }
            _ => {}
        }
        self
    }

    pub fn as_bar(&self) -> Option<&PriceBar> {
        match self {
            Record::Bar(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&SectorMember> {
        match self {
            Record::Member(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_income(&self) -> Option<&IncomeStatement> {
        match self {
            Record::Income(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_cashflow(&self) -> Option<&CashflowStatement> {
        match self {
            Record::Cashflow(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_dividend(&self) -> Option<&DividendRecord> {
        match self {
            Record::Dividend(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_weight(&self) -> Option<&IndexWeight> {
        match self {
            Record::Weight(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_valuation(&self) -> Option<&IndexValuation> {
        match self {
            Record::Valuation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_stock(&self) -> Option<&StockListing> {
        match self {
            Record::Stock(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<&IndexListing> {
        match self {
            Record::Index(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_etf(&self) -> Option<&EtfListing> {
        match self {
            Record::Etf(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sector(&self) -> Option<&SectorIndex> {
        match self {
            Record::Sector(r) => Some(r),
            _ => None,
        }
    }
}

fn validate_bar(bar: &PriceBar) -> Result<(), String> {
    let prices = [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
        ("pre_close", bar.pre_close),
    ];
    for (name, value) in prices {
        if let Some(v) = value {
            if v.is_sign_negative() && !v.is_zero() {
                return Err(format!("negative {}: {}", name, v));
            }
        }
    }

    if let (Some(high), Some(low)) = (bar.high, bar.low) {
        if high < low {
            return Err(format!("high {} below low {}", high, low));
        }
    }

    Ok(())
}

/// Collapse duplicate natural keys, keeping the last occurrence in its first position
pub fn dedupe_by_key(records: &[Record]) -> Vec<Record> {
    use std::collections::HashMap;

    let mut positions: HashMap<NaturalKey, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.natural_key()) {
            Some(&idx) => unique[idx] = record.clone(),
            None => {
                positions.insert(record.natural_key(), unique.len());
                unique.push(record.clone());
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        RawRecord::from_json(value).unwrap()
    }

    #[test]
    fn test_parse_daily_bar() {
        let row = raw(json!({
            "ts_code": "600519.SH",
            "trade_date": "20240612",
            "open": 1650.5,
            "high": "1672.00",
            "low": 1640.1,
            "close": 1668.0,
            "vol": 23155.32,
            "amount": null
        }));

        let record = Record::from_raw(SyncDomain::DailyPrice, &row).unwrap();
        let bar = record.as_bar().unwrap();
        assert_eq!(bar.trade_date, NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        assert_eq!(bar.open, Some(dec!(1650.5)));
        assert_eq!(bar.high, Some(dec!(1672.00)));
        assert_eq!(bar.vol, Some(dec!(23155.32)));
        assert_eq!(bar.amount, None);
        assert_eq!(bar.pre_close, None);
    }

    #[test]
    fn test_sector_daily_reads_pct_change() {
        let row = raw(json!({
            "ts_code": "885760.TI",
            "trade_date": "20240612",
            "close": 1021.3,
            "pct_change": -1.25
        }));

        let record = Record::from_raw(SyncDomain::SectorDaily, &row).unwrap();
        assert_eq!(record.as_bar().unwrap().pct_chg, Some(dec!(-1.25)));
    }

    #[test]
    fn test_rejects_inconsistent_bar() {
        let row = raw(json!({
            "ts_code": "000001.SZ",
            "trade_date": "20240612",
            "high": 9.5,
            "low": 10.1
        }));

        let err = Record::from_raw(SyncDomain::DailyPrice, &row).unwrap_err();
        assert_eq!(err.ticker, "000001.SZ");
        assert!(err.reason.contains("below low"));
    }

    #[test]
    fn test_rejects_missing_key_fields() {
        let no_code = raw(json!({ "trade_date": "20240612" }));
        assert!(Record::from_raw(SyncDomain::DailyPrice, &no_code).is_err());

        let bad_date = raw(json!({ "ts_code": "000001.SZ", "end_date": "2024-06-30" }));
        let err = Record::from_raw(SyncDomain::Income, &bad_date).unwrap_err();
        assert!(err.reason.contains("end_date"));
    }

    #[test]
    fn test_statement_natural_key() {
        let row = raw(json!({
            "ts_code": "600000.SH",
            "end_date": "20231231",
            "ann_date": "20240330",
            "n_income": "58210000000.00"
        }));

        let record = Record::from_raw(SyncDomain::Income, &row).unwrap();
        assert_eq!(
            record.natural_key(),
            NaturalKey::Dated {
                ticker: "600000.SH".to_string(),
                date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            }
        );
    }

    #[test]
    fn test_index_weight_keyed_by_index_constituent_and_date() {
        let row = raw(json!({
            "index_code": "000300.SH",
            "con_code": "600519.SH",
            "trade_date": "20240628",
            "weight": 5.8732
        }));

        let record = Record::from_raw(SyncDomain::IndexWeight, &row).unwrap();
        assert_eq!(record.ticker(), "000300.SH");
        assert_eq!(record.as_weight().unwrap().weight, Some(dec!(5.8732)));
        assert_eq!(
            record.natural_key(),
            NaturalKey::Weight {
                index: "000300.SH".to_string(),
                constituent: "600519.SH".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            }
        );

        let missing = raw(json!({ "ts_code": "000300.SH", "con_code": "600519.SH" }));
        let err = Record::from_raw(SyncDomain::IndexWeight, &missing).unwrap_err();
        assert!(err.reason.contains("index_code"));
    }

    #[test]
    fn test_parse_index_valuation() {
        let row = raw(json!({
            "ts_code": "000001.SH",
            "trade_date": "20240612",
            "total_mv": 49123456789012.5,
            "pe_ttm": "13.21",
            "pb": 1.25
        }));

        let record = Record::from_raw(SyncDomain::IndexValuation, &row).unwrap();
        let valuation = record.as_valuation().unwrap();
        assert_eq!(valuation.pe_ttm, Some(dec!(13.21)));
        assert_eq!(valuation.pb, Some(dec!(1.25)));
        assert_eq!(valuation.float_mv, None);
    }

    #[test]
    fn test_reference_records_keyed_by_code() {
        let stock = raw(json!({
            "ts_code": "600000.SH",
            "symbol": "600000",
            "name": "浦发银行",
            "industry": "银行",
            "list_date": "19991110",
            "list_status": "L"
        }));
        let record = Record::from_raw(SyncDomain::StockBasic, &stock).unwrap();
        assert_eq!(
            record.natural_key(),
            NaturalKey::Code {
                ticker: "600000.SH".to_string()
            }
        );
        let listing = record.as_stock().unwrap();
        assert_eq!(listing.symbol.as_deref(), Some("600000"));
        assert_eq!(listing.list_date, NaiveDate::from_ymd_opt(1999, 11, 10));

        let sector = raw(json!({
            "ts_code": "885760.TI",
            "name": "储能",
            "count": 142,
            "exchange": "A",
            "type": "N"
        }));
        let record = Record::from_raw(SyncDomain::SectorIndex, &sector).unwrap();
        let sector = record.as_sector().unwrap();
        assert_eq!(sector.count, Some(142));
        assert_eq!(sector.index_type.as_deref(), Some("N"));

        let etf = raw(json!({ "ts_code": "510300.SH", "mgt_fee": "0.15", "index_code": "000300.SH" }));
        let record = Record::from_raw(SyncDomain::EtfBasic, &etf).unwrap();
        assert_eq!(record.as_etf().unwrap().mgt_fee, Some(dec!(0.15)));

        let index = raw(json!({ "ts_code": "000300.SH", "base_point": 1000, "base_date": "20041231" }));
        let record = Record::from_raw(SyncDomain::IndexBasic, &index).unwrap();
        assert_eq!(record.as_index().unwrap().base_point, Some(dec!(1000)));
    }

    #[test]
    fn test_rejects_bad_reference_fields() {
        let row = raw(json!({ "ts_code": "885760.TI", "count": "many" }));
        assert!(Record::from_raw(SyncDomain::SectorIndex, &row).is_err());

        let row = raw(json!({ "ts_code": "600000.SH", "list_date": "1999-11-10" }));
        let err = Record::from_raw(SyncDomain::StockBasic, &row).unwrap_err();
        assert!(err.reason.contains("list_date"));
    }

    #[test]
    fn test_merged_over_keeps_unprovided_fields() {
        let stored = Record::Bar(PriceBar {
            ts_code: "A".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            open: Some(dec!(10)),
            high: Some(dec!(11)),
            low: Some(dec!(9)),
            close: Some(dec!(10.5)),
            pre_close: None,
            change: None,
            pct_chg: None,
            vol: Some(dec!(100)),
            amount: Some(dec!(1050)),
        });
        let mut correction = stored.clone();
        if let Record::Bar(bar) = &mut correction {
            bar.close = Some(dec!(10.6));
            bar.amount = None;
        }

        let merged = correction.merged_over(&stored);
        let bar = merged.as_bar().unwrap();
        assert_eq!(bar.close, Some(dec!(10.6)));
        assert_eq!(bar.amount, Some(dec!(1050)));
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence() {
        let stage = |proc_name: &str| {
            Record::Dividend(DividendRecord {
                ts_code: "600000.SH".to_string(),
                end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                ann_date: None,
                div_proc: Some(proc_name.to_string()),
                stk_div: None,
                cash_div: None,
                cash_div_tax: None,
                record_date: None,
                ex_date: None,
                pay_date: None,
            })
        };

        let unique = dedupe_by_key(&[stage("plan"), stage("approved"), stage("implemented")]);
        assert_eq!(unique.len(), 1);
        assert_eq!(
            unique[0].as_dividend().unwrap().div_proc.as_deref(),
            Some("implemented")
        );
    }
}
