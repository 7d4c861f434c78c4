use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::models::{
    CashflowStatement, DividendRecord, EtfListing, IncomeStatement, IndexListing, IndexValuation,
    IndexWeight, PriceBar, SectorIndex, SectorMember, StockListing,
};

// The bar tables share one column layout
macro_rules! price_row {
    ($name:ident, $table:ident) => {
        #[derive(Debug, Clone, Insertable)]
        #[diesel(table_name = crate::database::schema::$table)]
        pub struct $name {
            pub ts_code: String,
            pub trade_date: NaiveDate,
            pub open: Option<Decimal>,
            pub high: Option<Decimal>,
            pub low: Option<Decimal>,
            pub close: Option<Decimal>,
            pub pre_close: Option<Decimal>,
            pub change: Option<Decimal>,
            pub pct_chg: Option<Decimal>,
            pub vol: Option<Decimal>,
            pub amount: Option<Decimal>,
            pub created_at: DateTime<Utc>,
            pub updated_at: DateTime<Utc>,
        }

        impl $name {
            pub fn from_bar(bar: &PriceBar, now: DateTime<Utc>) -> Self {
                Self {
                    ts_code: bar.ts_code.clone(),
                    trade_date: bar.trade_date,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    pre_close: bar.pre_close,
                    change: bar.change,
                    pct_chg: bar.pct_chg,
                    vol: bar.vol,
                    amount: bar.amount,
                    created_at: now,
                    updated_at: now,
                }
            }
        }
    };
}

price_row!(NewDailyRow, daily_data);
price_row!(NewWeeklyRow, weekly_data);
price_row!(NewIndexDailyRow, index_daily);
price_row!(NewEtfDailyRow, etf_daily);
price_row!(NewSectorDailyRow, ths_daily);
price_row!(NewIndexWeeklyRow, index_weekly);

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::ths_member)]
pub struct NewMemberRow {
    pub ts_code: String,
    pub con_code: String,
    pub con_name: Option<String>,
    pub weight: Option<Decimal>,
    pub in_date: Option<NaiveDate>,
    pub out_date: Option<NaiveDate>,
    pub is_new: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewMemberRow {
    pub fn from_member(member: &SectorMember, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: member.ts_code.clone(),
            con_code: member.con_code.clone(),
            con_name: member.con_name.clone(),
            weight: member.weight,
            in_date: member.in_date,
            out_date: member.out_date,
            is_new: member.is_new.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::income_data)]
pub struct NewIncomeRow {
    pub ts_code: String,
    pub end_date: NaiveDate,
    pub ann_date: Option<NaiveDate>,
    pub f_ann_date: Option<NaiveDate>,
    pub report_type: Option<String>,
    pub total_revenue: Option<Decimal>,
    pub revenue: Option<Decimal>,
    pub operate_profit: Option<Decimal>,
    pub total_profit: Option<Decimal>,
    pub n_income: Option<Decimal>,
    pub n_income_attr_p: Option<Decimal>,
    pub basic_eps: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewIncomeRow {
    pub fn from_statement(s: &IncomeStatement, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: s.ts_code.clone(),
            end_date: s.end_date,
            ann_date: s.ann_date,
            f_ann_date: s.f_ann_date,
            report_type: s.report_type.clone(),
            total_revenue: s.total_revenue,
            revenue: s.revenue,
            operate_profit: s.operate_profit,
            total_profit: s.total_profit,
            n_income: s.n_income,
            n_income_attr_p: s.n_income_attr_p,
            basic_eps: s.basic_eps,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::cashflow_data)]
pub struct NewCashflowRow {
    pub ts_code: String,
    pub end_date: NaiveDate,
    pub ann_date: Option<NaiveDate>,
    pub f_ann_date: Option<NaiveDate>,
    pub report_type: Option<String>,
    pub n_cashflow_act: Option<Decimal>,
    pub n_cashflow_inv_act: Option<Decimal>,
    pub n_cash_flows_fnc_act: Option<Decimal>,
    pub free_cashflow: Option<Decimal>,
    pub c_cash_equ_end_period: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewCashflowRow {
    pub fn from_statement(s: &CashflowStatement, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: s.ts_code.clone(),
            end_date: s.end_date,
            ann_date: s.ann_date,
            f_ann_date: s.f_ann_date,
            report_type: s.report_type.clone(),
            n_cashflow_act: s.n_cashflow_act,
            n_cashflow_inv_act: s.n_cashflow_inv_act,
            n_cash_flows_fnc_act: s.n_cash_flows_fnc_act,
            free_cashflow: s.free_cashflow,
            c_cash_equ_end_period: s.c_cash_equ_end_period,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::dividend_data)]
pub struct NewDividendRow {
    pub ts_code: String,
    pub end_date: NaiveDate,
    pub ann_date: Option<NaiveDate>,
    pub div_proc: Option<String>,
    pub stk_div: Option<Decimal>,
    pub cash_div: Option<Decimal>,
    pub cash_div_tax: Option<Decimal>,
    pub record_date: Option<NaiveDate>,
    pub ex_date: Option<NaiveDate>,
    pub pay_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewDividendRow {
    pub fn from_record(d: &DividendRecord, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: d.ts_code.clone(),
            end_date: d.end_date,
            ann_date: d.ann_date,
            div_proc: d.div_proc.clone(),
            stk_div: d.stk_div,
            cash_div: d.cash_div,
            cash_div_tax: d.cash_div_tax,
            record_date: d.record_date,
            ex_date: d.ex_date,
            pay_date: d.pay_date,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::index_weight)]
pub struct NewIndexWeightRow {
    pub index_code: String,
    pub con_code: String,
    pub trade_date: NaiveDate,
    pub weight: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewIndexWeightRow {
    pub fn from_weight(w: &IndexWeight, now: DateTime<Utc>) -> Self {
        Self {
            index_code: w.index_code.clone(),
            con_code: w.con_code.clone(),
            trade_date: w.trade_date,
            weight: w.weight,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::index_dailybasic)]
pub struct NewIndexValuationRow {
    pub ts_code: String,
    pub trade_date: NaiveDate,
    pub total_mv: Option<Decimal>,
    pub float_mv: Option<Decimal>,
    pub total_share: Option<Decimal>,
    pub float_share: Option<Decimal>,
    pub free_share: Option<Decimal>,
    pub turnover_rate: Option<Decimal>,
    pub turnover_rate_f: Option<Decimal>,
    pub pe: Option<Decimal>,
    pub pe_ttm: Option<Decimal>,
    pub pb: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewIndexValuationRow {
    pub fn from_valuation(v: &IndexValuation, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: v.ts_code.clone(),
            trade_date: v.trade_date,
            total_mv: v.total_mv,
            float_mv: v.float_mv,
            total_share: v.total_share,
            float_share: v.float_share,
            free_share: v.free_share,
            turnover_rate: v.turnover_rate,
            turnover_rate_f: v.turnover_rate_f,
            pe: v.pe,
            pe_ttm: v.pe_ttm,
            pb: v.pb,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::stock_basic)]
pub struct NewStockBasicRow {
    pub ts_code: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub area: Option<String>,
    pub industry: Option<String>,
    pub market: Option<String>,
    pub exchange: Option<String>,
    pub list_date: Option<NaiveDate>,
    pub list_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewStockBasicRow {
    pub fn from_listing(l: &StockListing, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: l.ts_code.clone(),
            symbol: l.symbol.clone(),
            name: l.name.clone(),
            area: l.area.clone(),
            industry: l.industry.clone(),
            market: l.market.clone(),
            exchange: l.exchange.clone(),
            list_date: l.list_date,
            list_status: l.list_status.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::index_basic)]
pub struct NewIndexBasicRow {
    pub ts_code: String,
    pub name: Option<String>,
    pub fullname: Option<String>,
    pub market: Option<String>,
    pub publisher: Option<String>,
    pub index_type: Option<String>,
    pub category: Option<String>,
    pub base_date: Option<NaiveDate>,
    pub base_point: Option<Decimal>,
    pub list_date: Option<NaiveDate>,
    pub weight_rule: Option<String>,
    pub exp_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewIndexBasicRow {
    pub fn from_listing(l: &IndexListing, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: l.ts_code.clone(),
            name: l.name.clone(),
            fullname: l.fullname.clone(),
            market: l.market.clone(),
            publisher: l.publisher.clone(),
            index_type: l.index_type.clone(),
            category: l.category.clone(),
            base_date: l.base_date,
            base_point: l.base_point,
            list_date: l.list_date,
            weight_rule: l.weight_rule.clone(),
            exp_date: l.exp_date,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::etf_basic)]
pub struct NewEtfBasicRow {
    pub ts_code: String,
    pub csname: Option<String>,
    pub extname: Option<String>,
    pub index_code: Option<String>,
    pub index_name: Option<String>,
    pub setup_date: Option<NaiveDate>,
    pub list_date: Option<NaiveDate>,
    pub list_status: Option<String>,
    pub exchange: Option<String>,
    pub mgr_name: Option<String>,
    pub mgt_fee: Option<Decimal>,
    pub etf_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewEtfBasicRow {
    pub fn from_listing(l: &EtfListing, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: l.ts_code.clone(),
            csname: l.csname.clone(),
            extname: l.extname.clone(),
            index_code: l.index_code.clone(),
            index_name: l.index_name.clone(),
            setup_date: l.setup_date,
            list_date: l.list_date,
            list_status: l.list_status.clone(),
            exchange: l.exchange.clone(),
            mgr_name: l.mgr_name.clone(),
            mgt_fee: l.mgt_fee,
            etf_type: l.etf_type.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::ths_index)]
pub struct NewSectorIndexRow {
    pub ts_code: String,
    pub name: Option<String>,
    pub count: Option<i32>,
    pub exchange: Option<String>,
    pub list_date: Option<NaiveDate>,
    pub index_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewSectorIndexRow {
    pub fn from_sector(s: &SectorIndex, now: DateTime<Utc>) -> Self {
        Self {
            ts_code: s.ts_code.clone(),
            name: s.name.clone(),
            count: s.count,
            exchange: s.exchange.clone(),
            list_date: s.list_date,
            index_type: s.index_type.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}
