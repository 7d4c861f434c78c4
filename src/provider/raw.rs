use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::DateRange;

/// Upstream date format (`YYYYMMDD`)
pub const UPSTREAM_DATE_FORMAT: &str = "%Y%m%d";

/// One upstream row, keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRecord {
    columns: Map<String, Value>,
}

impl RawRecord {
    /// Zip a tabular row with its column names; surplus values are dropped
    pub fn from_row(fields: &[String], items: Vec<Value>) -> Self {
        let columns = fields.iter().cloned().zip(items).collect();
        Self { columns }
    }

    /// Wrap a JSON object; None for any other JSON value
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(columns) => Some(Self { columns }),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.columns.get(field).filter(|v| !v.is_null())
    }

    /// Text value; numbers are rendered, empty strings count as absent
    pub fn get_str(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Fixed-precision value parsed from the shortest decimal text of the source
    pub fn get_decimal(&self, field: &str) -> Result<Option<Decimal>, String> {
        let text = match self.get(field) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => return Err(format!("{} is not numeric: {}", field, other)),
        };

        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(Some)
            .map_err(|_| format!("{} is not numeric: {}", field, text))
    }

    /// Calendar date in `YYYYMMDD` form
    pub fn get_date(&self, field: &str) -> Result<Option<NaiveDate>, String> {
        let Some(text) = self.get_str(field) else {
            return Ok(None);
        };

        if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("{} is not a YYYYMMDD date: {}", field, text));
        }

        NaiveDate::parse_from_str(&text, UPSTREAM_DATE_FORMAT)
            .map(Some)
            .map_err(|e| format!("{} is not a valid date ({}): {}", field, e, text))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Parameters of one upstream call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    /// Single code or comma-joined codes
    pub ts_code: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// API-specific filters (e.g., `list_status`, `market`)
    pub extra: BTreeMap<String, String>,
}

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_ticker(ts_code: impl Into<String>) -> Self {
        Self {
            ts_code: Some(ts_code.into()),
            ..Self::default()
        }
    }

    /// One call covering several codes
    pub fn for_tickers(codes: &[String]) -> Self {
        Self::for_ticker(codes.join(","))
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.start_date = Some(range.start);
        self.end_date = Some(range.end);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Wire representation; absent parameters are omitted
    pub fn to_json(&self) -> Value {
        let mut params = Map::new();
        if let Some(code) = &self.ts_code {
            params.insert("ts_code".to_string(), Value::String(code.clone()));
        }
        let dates = [
            ("start_date", self.start_date),
            ("end_date", self.end_date),
        ];
        for (key, date) in dates {
            if let Some(date) = date {
                params.insert(
                    key.to_string(),
                    Value::String(date.format(UPSTREAM_DATE_FORMAT).to_string()),
                );
            }
        }
        for (key, value) in &self.extra {
            params.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_from_row_zips_columns() {
        let fields = vec!["ts_code".to_string(), "close".to_string()];
        let row = RawRecord::from_row(&fields, vec![json!("600000.SH"), json!(7.85)]);

        assert_eq!(row.get_str("ts_code").as_deref(), Some("600000.SH"));
        assert_eq!(row.get_decimal("close").unwrap(), Some(dec!(7.85)));
        assert_eq!(row.get_decimal("open").unwrap(), None);
    }

    #[test]
    fn test_decimal_avoids_binary_float_noise() {
        let row = RawRecord::from_json(json!({ "pct_chg": 0.1, "vol": "1e-3" })).unwrap();
        assert_eq!(row.get_decimal("pct_chg").unwrap(), Some(dec!(0.1)));
        assert_eq!(row.get_decimal("vol").unwrap(), Some(dec!(0.001)));
    }

    #[test]
    fn test_date_parsing() {
        let row = RawRecord::from_json(json!({
            "good": "20240229",
            "numeric": 20240301,
            "dashed": "2024-03-01",
            "impossible": "20240230",
            "empty": ""
        }))
        .unwrap();

        assert_eq!(
            row.get_date("good").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            row.get_date("numeric").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert!(row.get_date("dashed").is_err());
        assert!(row.get_date("impossible").is_err());
        assert_eq!(row.get_date("empty").unwrap(), None);
    }

    #[test]
    fn test_params_to_json() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
        );
        let params = FetchParams::for_tickers(&["A.SH".to_string(), "B.SZ".to_string()])
            .with_range(range)
            .with("adj", "qfq");

        assert_eq!(
            params.to_json(),
            json!({
                "ts_code": "A.SH,B.SZ",
                "start_date": "20240102",
                "end_date": "20240628",
                "adj": "qfq"
            })
        );
    }
}
