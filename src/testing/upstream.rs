use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;

use crate::error::FetchError;
use crate::provider::{FetchParams, RawRecord, UpstreamApi};

type Handler = dyn Fn(&str, &FetchParams) -> Result<Vec<RawRecord>, FetchError> + Send + Sync;

/// One observed upstream call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub api_name: String,
    pub params: FetchParams,
}

/// Upstream whose answers come from a closure
///
/// Every call is recorded. `fail_first` injects failures for a given `ts_code`
/// before the closure is consulted.
pub struct ScriptedUpstream {
    handler: Box<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<String, (u32, FetchError)>>,
}

impl ScriptedUpstream {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &FetchParams) -> Result<Vec<RawRecord>, FetchError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` calls whose `ts_code` equals `ts_code`
    pub fn fail_first(&self, ts_code: &str, times: u32, error: FetchError) {
        self.failures
            .lock()
            .insert(ts_code.to_string(), (times, error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls issued for exactly this `ts_code`
    pub fn calls_for(&self, ts_code: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.params.ts_code.as_deref() == Some(ts_code))
            .count()
    }

    fn injected_failure(&self, params: &FetchParams) -> Option<FetchError> {
        let code = params.ts_code.as_deref()?;
        let mut failures = self.failures.lock();
        let (remaining, error) = failures.get_mut(code)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(error.clone())
    }
}

#[async_trait]
impl UpstreamApi for ScriptedUpstream {
    async fn call(
        &self,
        api_name: &str,
        params: &FetchParams,
        _fields: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.lock().push(RecordedCall {
            api_name: api_name.to_string(),
            params: params.clone(),
        });

        if let Some(error) = self.injected_failure(params) {
            return Err(error);
        }
        (self.handler)(api_name, params)
    }
}

/// A plausible price bar row as the provider returns it
pub fn bar_row(ts_code: &str, trade_date: &str) -> RawRecord {
    raw(json!({
        "ts_code": ts_code,
        "trade_date": trade_date,
        "open": 10.0,
        "high": 10.5,
        "low": 9.8,
        "close": 10.2,
        "pre_close": 10.0,
        "change": 0.2,
        "pct_chg": 2.0,
        "vol": 12000.0,
        "amount": 122400.0,
    }))
}

/// A plausible income statement row
pub fn income_row(ts_code: &str, end_date: &str) -> RawRecord {
    raw(json!({
        "ts_code": ts_code,
        "ann_date": end_date,
        "end_date": end_date,
        "report_type": "1",
        "total_revenue": "1500000000.00",
        "revenue": "1480000000.00",
        "n_income": "210000000.00",
        "basic_eps": 0.35,
    }))
}

/// A sector constituent row
pub fn member_row(sector: &str, constituent: &str) -> RawRecord {
    raw(json!({
        "ts_code": sector,
        "con_code": constituent,
        "con_name": constituent,
        "is_new": "Y",
    }))
}

/// An index constituent weight row
pub fn weight_row(index_code: &str, con_code: &str, trade_date: &str) -> RawRecord {
    raw(json!({
        "index_code": index_code,
        "con_code": con_code,
        "trade_date": trade_date,
        "weight": 2.5,
    }))
}

/// A reference listing row carrying only the common columns
pub fn listing_row(ts_code: &str, name: &str) -> RawRecord {
    raw(json!({
        "ts_code": ts_code,
        "name": name,
        "list_date": "20100104",
    }))
}

fn raw(value: serde_json::Value) -> RawRecord {
    RawRecord::from_json(value).unwrap_or_default()
}
