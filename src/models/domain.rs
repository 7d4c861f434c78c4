use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// One category of synchronized data
///
/// Each domain maps to one upstream API and one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    DailyPrice,
    WeeklyPrice,
    IndexDaily,
    EtfDaily,
    SectorDaily,
    SectorMember,
    Income,
    Cashflow,
    Dividend,
    IndexWeekly,
    IndexWeight,
    IndexValuation,
    StockBasic,
    IndexBasic,
    EtfBasic,
    SectorIndex,
}

/// Major indexes tracked by the constituent-weight and valuation domains
pub const MAJOR_INDEXES: [&str; 6] = [
    "000001.SH", "000016.SH", "000300.SH", "000905.SH", "399001.SZ", "399006.SZ",
];

/// Record family of a domain, which decides key shape and commit semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    /// Keyed by (ticker, trade_date)
    PriceVolume,
    /// Keyed by (sector, constituent); windowless snapshot
    Membership,
    /// Keyed by (ticker, end_date)
    FinancialStatement,
    /// Keyed by (index, constituent, trade_date)
    Weighting,
    /// Keyed by (ticker, trade_date); daily index valuation metrics
    Valuation,
    /// Keyed by code alone; windowless listing snapshot
    Reference,
}

/// Which ticker universe a domain synchronizes against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UniverseKind {
    Equity,
    Index,
    Etf,
    Sector,
}

/// Whether a degraded run may still advance the watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit the successfully covered range even when some tickers failed
    Partial,
    /// Commit only when every batch succeeded
    Atomic,
}

/// How the upstream API is addressed for a slice of tickers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchShape {
    /// One call per ticker
    PerTicker,
    /// One call for the whole slice (comma-joined codes)
    SliceNative,
}

impl SyncDomain {
    /// Convert enum to its configuration/database string
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDomain::DailyPrice => "daily_price",
            SyncDomain::WeeklyPrice => "weekly_price",
            SyncDomain::IndexDaily => "index_daily",
            SyncDomain::EtfDaily => "etf_daily",
            SyncDomain::SectorDaily => "sector_daily",
            SyncDomain::SectorMember => "sector_member",
            SyncDomain::Income => "income",
            SyncDomain::Cashflow => "cashflow",
            SyncDomain::Dividend => "dividend",
            SyncDomain::IndexWeekly => "index_weekly",
            SyncDomain::IndexWeight => "index_weight",
            SyncDomain::IndexValuation => "index_valuation",
            SyncDomain::StockBasic => "stock_basic",
            SyncDomain::IndexBasic => "index_basic",
            SyncDomain::EtfBasic => "etf_basic",
            SyncDomain::SectorIndex => "sector_index",
        }
    }

    /// Parse string to SyncDomain enum
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "daily_price" => Some(SyncDomain::DailyPrice),
            "weekly_price" => Some(SyncDomain::WeeklyPrice),
            "index_daily" => Some(SyncDomain::IndexDaily),
            "etf_daily" => Some(SyncDomain::EtfDaily),
            "sector_daily" => Some(SyncDomain::SectorDaily),
            "sector_member" => Some(SyncDomain::SectorMember),
            "income" => Some(SyncDomain::Income),
            "cashflow" => Some(SyncDomain::Cashflow),
            "dividend" => Some(SyncDomain::Dividend),
            "index_weekly" => Some(SyncDomain::IndexWeekly),
            "index_weight" => Some(SyncDomain::IndexWeight),
            "index_valuation" => Some(SyncDomain::IndexValuation),
            "stock_basic" => Some(SyncDomain::StockBasic),
            "index_basic" => Some(SyncDomain::IndexBasic),
            "etf_basic" => Some(SyncDomain::EtfBasic),
            "sector_index" => Some(SyncDomain::SectorIndex),
            _ => None,
        }
    }

    /// Get all domain variants, in default run order
    ///
    /// Reference listings come first so dependent tables see fresh metadata.
    pub fn all() -> Vec<Self> {
        vec![
            SyncDomain::StockBasic,
            SyncDomain::IndexBasic,
            SyncDomain::EtfBasic,
            SyncDomain::SectorIndex,
            SyncDomain::DailyPrice,
            SyncDomain::WeeklyPrice,
            SyncDomain::IndexDaily,
            SyncDomain::EtfDaily,
            SyncDomain::SectorDaily,
            SyncDomain::SectorMember,
            SyncDomain::Income,
            SyncDomain::Cashflow,
            SyncDomain::Dividend,
            SyncDomain::IndexWeekly,
            SyncDomain::IndexWeight,
            SyncDomain::IndexValuation,
        ]
    }

    pub fn kind(&self) -> DomainKind {
        match self {
            SyncDomain::DailyPrice
            | SyncDomain::WeeklyPrice
            | SyncDomain::IndexDaily
            | SyncDomain::EtfDaily
            | SyncDomain::SectorDaily
            | SyncDomain::IndexWeekly => DomainKind::PriceVolume,
            SyncDomain::SectorMember => DomainKind::Membership,
            SyncDomain::Income | SyncDomain::Cashflow | SyncDomain::Dividend => {
                DomainKind::FinancialStatement
            }
            SyncDomain::IndexWeight => DomainKind::Weighting,
            SyncDomain::IndexValuation => DomainKind::Valuation,
            SyncDomain::StockBasic
            | SyncDomain::IndexBasic
            | SyncDomain::EtfBasic
            | SyncDomain::SectorIndex => DomainKind::Reference,
        }
    }

    /// Listed universe the domain iterates; `None` for domains with a fixed query set
    pub fn universe_kind(&self) -> Option<UniverseKind> {
        match self {
            SyncDomain::DailyPrice
            | SyncDomain::WeeklyPrice
            | SyncDomain::Income
            | SyncDomain::Cashflow
            | SyncDomain::Dividend => Some(UniverseKind::Equity),
            SyncDomain::IndexDaily | SyncDomain::IndexWeekly => Some(UniverseKind::Index),
            SyncDomain::EtfDaily => Some(UniverseKind::Etf),
            SyncDomain::SectorDaily | SyncDomain::SectorMember => Some(UniverseKind::Sector),
            _ => None,
        }
    }

    /// Built-in query values for domains that do not iterate a listed universe
    ///
    /// Each value is sent under [`code_param`](Self::code_param) and scheduled like a ticker.
    pub fn fixed_universe(&self) -> Option<&'static [&'static str]> {
        match self {
            SyncDomain::IndexWeight | SyncDomain::IndexValuation => Some(&MAJOR_INDEXES),
            SyncDomain::StockBasic => Some(&["SSE", "SZSE", "BSE"]),
            SyncDomain::IndexBasic => Some(&["SSE", "SZSE", "CSI"]),
            SyncDomain::EtfBasic => Some(&["SH", "SZ"]),
            SyncDomain::SectorIndex => Some(&["N", "I"]),
            _ => None,
        }
    }

    /// Request parameter that carries one universe entry
    pub fn code_param(&self) -> &'static str {
        match self {
            SyncDomain::IndexWeight => "index_code",
            SyncDomain::StockBasic | SyncDomain::EtfBasic => "exchange",
            SyncDomain::IndexBasic => "market",
            SyncDomain::SectorIndex => "type",
            _ => "ts_code",
        }
    }

    /// Row column holding the record's own code
    pub fn code_field(&self) -> &'static str {
        match self {
            SyncDomain::IndexWeight => "index_code",
            _ => "ts_code",
        }
    }

    /// Filters sent with every call
    pub fn fixed_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            SyncDomain::StockBasic | SyncDomain::EtfBasic => &[("list_status", "L")],
            SyncDomain::SectorIndex => &[("exchange", "A")],
            _ => &[],
        }
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        match self.kind() {
            DomainKind::PriceVolume | DomainKind::Weighting | DomainKind::Valuation => {
                CommitPolicy::Partial
            }
            DomainKind::Membership | DomainKind::FinancialStatement | DomainKind::Reference => {
                CommitPolicy::Atomic
            }
        }
    }

    /// Daily and ETF bars accept comma-joined codes in a single call
    pub fn fetch_shape(&self) -> FetchShape {
        match self {
            SyncDomain::DailyPrice | SyncDomain::EtfDaily => FetchShape::SliceNative,
            _ => FetchShape::PerTicker,
        }
    }

    /// Whether the upstream call takes a date range
    pub fn is_windowed(&self) -> bool {
        !matches!(self, SyncDomain::SectorMember | SyncDomain::Dividend)
            && self.kind() != DomainKind::Reference
    }

    /// Upstream API name
    pub fn api_name(&self) -> &'static str {
        match self {
            SyncDomain::DailyPrice => "daily",
            SyncDomain::WeeklyPrice => "weekly",
            SyncDomain::IndexDaily => "index_daily",
            SyncDomain::EtfDaily => "fund_daily",
            SyncDomain::SectorDaily => "ths_daily",
            SyncDomain::SectorMember => "ths_member",
            SyncDomain::Income => "income",
            SyncDomain::Cashflow => "cashflow",
            SyncDomain::Dividend => "dividend",
            SyncDomain::IndexWeekly => "index_weekly",
            SyncDomain::IndexWeight => "index_weight",
            SyncDomain::IndexValuation => "index_dailybasic",
            SyncDomain::StockBasic => "stock_basic",
            SyncDomain::IndexBasic => "index_basic",
            SyncDomain::EtfBasic => "etf_basic",
            SyncDomain::SectorIndex => "ths_index",
        }
    }

    /// Columns requested from the upstream API
    pub fn fields(&self) -> &'static str {
        match self.kind() {
            DomainKind::PriceVolume if *self == SyncDomain::SectorDaily => {
                "ts_code,trade_date,open,high,low,close,pre_close,change,pct_change,vol,amount"
            }
            DomainKind::PriceVolume => {
                "ts_code,trade_date,open,high,low,close,pre_close,change,pct_chg,vol,amount"
            }
            DomainKind::Membership => "ts_code,con_code,con_name,weight,in_date,out_date,is_new",
            DomainKind::FinancialStatement => match self {
                SyncDomain::Income => {
                    "ts_code,ann_date,f_ann_date,end_date,report_type,total_revenue,revenue,\
                     operate_profit,total_profit,n_income,n_income_attr_p,basic_eps"
                }
                SyncDomain::Cashflow => {
                    "ts_code,ann_date,f_ann_date,end_date,report_type,n_cashflow_act,\
                     n_cashflow_inv_act,n_cash_flows_fnc_act,free_cashflow,c_cash_equ_end_period"
                }
                _ => {
                    "ts_code,end_date,ann_date,div_proc,stk_div,cash_div,cash_div_tax,\
                     record_date,ex_date,pay_date"
                }
            },
            DomainKind::Weighting => "index_code,con_code,trade_date,weight",
            DomainKind::Valuation => {
                "ts_code,trade_date,total_mv,float_mv,total_share,float_share,free_share,\
                 turnover_rate,turnover_rate_f,pe,pe_ttm,pb"
            }
            DomainKind::Reference => match self {
                SyncDomain::StockBasic => {
                    "ts_code,symbol,name,area,industry,market,exchange,list_date,list_status"
                }
                SyncDomain::IndexBasic => {
                    "ts_code,name,fullname,market,publisher,index_type,category,base_date,\
                     base_point,list_date,weight_rule,exp_date"
                }
                SyncDomain::EtfBasic => {
                    "ts_code,csname,extname,index_code,index_name,setup_date,list_date,\
                     list_status,exchange,mgr_name,mgt_fee,etf_type"
                }
                _ => "ts_code,name,count,exchange,list_date,type",
            },
        }
    }

    /// Target table name
    pub fn table_name(&self) -> &'static str {
        match self {
            SyncDomain::DailyPrice => "daily_data",
            SyncDomain::WeeklyPrice => "weekly_data",
            SyncDomain::IndexDaily => "index_daily",
            SyncDomain::EtfDaily => "etf_daily",
            SyncDomain::SectorDaily => "ths_daily",
            SyncDomain::SectorMember => "ths_member",
            SyncDomain::Income => "income_data",
            SyncDomain::Cashflow => "cashflow_data",
            SyncDomain::Dividend => "dividend_data",
            SyncDomain::IndexWeekly => "index_weekly",
            SyncDomain::IndexWeight => "index_weight",
            SyncDomain::IndexValuation => "index_dailybasic",
            SyncDomain::StockBasic => "stock_basic",
            SyncDomain::IndexBasic => "index_basic",
            SyncDomain::EtfBasic => "etf_basic",
            SyncDomain::SectorIndex => "ths_index",
        }
    }
}

impl fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl UniverseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniverseKind::Equity => "equity",
            UniverseKind::Index => "index",
            UniverseKind::Etf => "etf",
            UniverseKind::Sector => "sector",
        }
    }
}

impl fmt::Display for UniverseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_from_str() {
        for domain in SyncDomain::all() {
            assert_eq!(SyncDomain::from_str(domain.as_str()), Some(domain));
        }
        assert_eq!(SyncDomain::from_str(" income "), Some(SyncDomain::Income));
        assert_eq!(SyncDomain::from_str("minute_bars"), None);
    }

    #[test]
    fn test_commit_policy_follows_kind() {
        assert_eq!(SyncDomain::DailyPrice.commit_policy(), CommitPolicy::Partial);
        assert_eq!(SyncDomain::SectorDaily.commit_policy(), CommitPolicy::Partial);
        assert_eq!(SyncDomain::Income.commit_policy(), CommitPolicy::Atomic);
        assert_eq!(SyncDomain::SectorMember.commit_policy(), CommitPolicy::Atomic);
        assert_eq!(SyncDomain::IndexWeight.commit_policy(), CommitPolicy::Partial);
        assert_eq!(SyncDomain::IndexValuation.commit_policy(), CommitPolicy::Partial);
        assert_eq!(SyncDomain::StockBasic.commit_policy(), CommitPolicy::Atomic);
        assert_eq!(SyncDomain::SectorIndex.commit_policy(), CommitPolicy::Atomic);
    }

    #[test]
    fn test_universe_kinds() {
        assert_eq!(SyncDomain::Cashflow.universe_kind(), Some(UniverseKind::Equity));
        assert_eq!(SyncDomain::EtfDaily.universe_kind(), Some(UniverseKind::Etf));
        assert_eq!(SyncDomain::SectorMember.universe_kind(), Some(UniverseKind::Sector));
        assert_eq!(SyncDomain::IndexDaily.universe_kind(), Some(UniverseKind::Index));
        assert_eq!(SyncDomain::IndexWeekly.universe_kind(), Some(UniverseKind::Index));
    }

    #[test]
    fn test_every_domain_has_exactly_one_universe_source() {
        for domain in SyncDomain::all() {
            assert!(
                domain.universe_kind().is_some() != domain.fixed_universe().is_some(),
                "{}",
                domain
            );
        }
        assert_eq!(SyncDomain::IndexWeight.fixed_universe(), Some(&MAJOR_INDEXES[..]));
    }

    #[test]
    fn test_fixed_query_parameters() {
        assert_eq!(SyncDomain::IndexWeight.code_param(), "index_code");
        assert_eq!(SyncDomain::IndexWeight.code_field(), "index_code");
        assert_eq!(SyncDomain::IndexValuation.code_param(), "ts_code");
        assert_eq!(SyncDomain::IndexBasic.code_param(), "market");
        assert_eq!(SyncDomain::SectorIndex.fixed_params(), &[("exchange", "A")]);
        assert!(SyncDomain::DailyPrice.fixed_params().is_empty());
        assert_eq!(SyncDomain::IndexValuation.api_name(), "index_dailybasic");
    }

    #[test]
    fn test_reference_domains_are_windowless_snapshots() {
        for domain in [
            SyncDomain::StockBasic,
            SyncDomain::IndexBasic,
            SyncDomain::EtfBasic,
            SyncDomain::SectorIndex,
        ] {
            assert_eq!(domain.kind(), DomainKind::Reference);
            assert!(!domain.is_windowed());
            assert_eq!(domain.fetch_shape(), FetchShape::PerTicker);
        }
        assert!(SyncDomain::IndexWeight.is_windowed());
        assert!(SyncDomain::IndexValuation.is_windowed());
    }

    #[test]
    fn test_fetch_shape() {
        assert_eq!(SyncDomain::DailyPrice.fetch_shape(), FetchShape::SliceNative);
        assert_eq!(SyncDomain::WeeklyPrice.fetch_shape(), FetchShape::PerTicker);
        assert!(!SyncDomain::SectorMember.is_windowed());
        assert!(SyncDomain::Income.is_windowed());
    }
}
