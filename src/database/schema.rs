// Expected table layout; migrations are managed outside this crate.
// Every market data table is keyed by its natural key.

diesel::table! {
    daily_data (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        open -> Nullable<Numeric>,
        high -> Nullable<Numeric>,
        low -> Nullable<Numeric>,
        close -> Nullable<Numeric>,
        pre_close -> Nullable<Numeric>,
        change -> Nullable<Numeric>,
        pct_chg -> Nullable<Numeric>,
        vol -> Nullable<Numeric>,
        amount -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    weekly_data (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        open -> Nullable<Numeric>,
        high -> Nullable<Numeric>,
        low -> Nullable<Numeric>,
        close -> Nullable<Numeric>,
        pre_close -> Nullable<Numeric>,
        change -> Nullable<Numeric>,
        pct_chg -> Nullable<Numeric>,
        vol -> Nullable<Numeric>,
        amount -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    index_daily (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        open -> Nullable<Numeric>,
        high -> Nullable<Numeric>,
        low -> Nullable<Numeric>,
        close -> Nullable<Numeric>,
        pre_close -> Nullable<Numeric>,
        change -> Nullable<Numeric>,
        pct_chg -> Nullable<Numeric>,
        vol -> Nullable<Numeric>,
        amount -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    etf_daily (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        open -> Nullable<Numeric>,
        high -> Nullable<Numeric>,
        low -> Nullable<Numeric>,
        close -> Nullable<Numeric>,
        pre_close -> Nullable<Numeric>,
        change -> Nullable<Numeric>,
        pct_chg -> Nullable<Numeric>,
        vol -> Nullable<Numeric>,
        amount -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ths_daily (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        open -> Nullable<Numeric>,
        high -> Nullable<Numeric>,
        low -> Nullable<Numeric>,
        close -> Nullable<Numeric>,
        pre_close -> Nullable<Numeric>,
        change -> Nullable<Numeric>,
        pct_chg -> Nullable<Numeric>,
        vol -> Nullable<Numeric>,
        amount -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ths_member (ts_code, con_code) {
        ts_code -> Varchar,
        con_code -> Varchar,
        con_name -> Nullable<Varchar>,
        weight -> Nullable<Numeric>,
        in_date -> Nullable<Date>,
        out_date -> Nullable<Date>,
        is_new -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    income_data (ts_code, end_date) {
        ts_code -> Varchar,
        end_date -> Date,
        ann_date -> Nullable<Date>,
        f_ann_date -> Nullable<Date>,
        report_type -> Nullable<Varchar>,
        total_revenue -> Nullable<Numeric>,
        revenue -> Nullable<Numeric>,
        operate_profit -> Nullable<Numeric>,
        total_profit -> Nullable<Numeric>,
        n_income -> Nullable<Numeric>,
        n_income_attr_p -> Nullable<Numeric>,
        basic_eps -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    cashflow_data (ts_code, end_date) {
        ts_code -> Varchar,
        end_date -> Date,
        ann_date -> Nullable<Date>,
        f_ann_date -> Nullable<Date>,
        report_type -> Nullable<Varchar>,
        n_cashflow_act -> Nullable<Numeric>,
        n_cashflow_inv_act -> Nullable<Numeric>,
        n_cash_flows_fnc_act -> Nullable<Numeric>,
        free_cashflow -> Nullable<Numeric>,
        c_cash_equ_end_period -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    dividend_data (ts_code, end_date) {
        ts_code -> Varchar,
        end_date -> Date,
        ann_date -> Nullable<Date>,
        div_proc -> Nullable<Varchar>,
        stk_div -> Nullable<Numeric>,
        cash_div -> Nullable<Numeric>,
        cash_div_tax -> Nullable<Numeric>,
        record_date -> Nullable<Date>,
        ex_date -> Nullable<Date>,
        pay_date -> Nullable<Date>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    index_weekly (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        open -> Nullable<Numeric>,
        high -> Nullable<Numeric>,
        low -> Nullable<Numeric>,
        close -> Nullable<Numeric>,
        pre_close -> Nullable<Numeric>,
        change -> Nullable<Numeric>,
        pct_chg -> Nullable<Numeric>,
        vol -> Nullable<Numeric>,
        amount -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    index_weight (index_code, con_code, trade_date) {
        index_code -> Varchar,
        con_code -> Varchar,
        trade_date -> Date,
        weight -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    index_dailybasic (ts_code, trade_date) {
        ts_code -> Varchar,
        trade_date -> Date,
        total_mv -> Nullable<Numeric>,
        float_mv -> Nullable<Numeric>,
        total_share -> Nullable<Numeric>,
        float_share -> Nullable<Numeric>,
        free_share -> Nullable<Numeric>,
        turnover_rate -> Nullable<Numeric>,
        turnover_rate_f -> Nullable<Numeric>,
        pe -> Nullable<Numeric>,
        pe_ttm -> Nullable<Numeric>,
        pb -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    stock_basic (ts_code) {
        ts_code -> Varchar,
        symbol -> Nullable<Varchar>,
        name -> Nullable<Varchar>,
        area -> Nullable<Varchar>,
        industry -> Nullable<Varchar>,
        market -> Nullable<Varchar>,
        exchange -> Nullable<Varchar>,
        list_date -> Nullable<Date>,
        list_status -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    index_basic (ts_code) {
        ts_code -> Varchar,
        name -> Nullable<Varchar>,
        fullname -> Nullable<Varchar>,
        market -> Nullable<Varchar>,
        publisher -> Nullable<Varchar>,
        index_type -> Nullable<Varchar>,
        category -> Nullable<Varchar>,
        base_date -> Nullable<Date>,
        base_point -> Nullable<Numeric>,
        list_date -> Nullable<Date>,
        weight_rule -> Nullable<Varchar>,
        exp_date -> Nullable<Date>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    etf_basic (ts_code) {
        ts_code -> Varchar,
        csname -> Nullable<Varchar>,
        extname -> Nullable<Varchar>,
        index_code -> Nullable<Varchar>,
        index_name -> Nullable<Varchar>,
        setup_date -> Nullable<Date>,
        list_date -> Nullable<Date>,
        list_status -> Nullable<Varchar>,
        exchange -> Nullable<Varchar>,
        mgr_name -> Nullable<Varchar>,
        mgt_fee -> Nullable<Numeric>,
        etf_type -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ths_index (ts_code) {
        ts_code -> Varchar,
        name -> Nullable<Varchar>,
        count -> Nullable<Int4>,
        exchange -> Nullable<Varchar>,
        list_date -> Nullable<Date>,
        #[sql_name = "type"]
        index_type -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sync_state (domain) {
        domain -> Varchar,
        last_synced_at -> Nullable<Date>,
        run_owner -> Nullable<Varchar>,
        run_started_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    daily_data,
    weekly_data,
    index_daily,
    etf_daily,
    ths_daily,
    ths_member,
    income_data,
    cashflow_data,
    dividend_data,
    index_weekly,
    index_weight,
    index_dailybasic,
    stock_basic,
    index_basic,
    etf_basic,
    ths_index,
    sync_state,
);
