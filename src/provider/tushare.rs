//! HTTP provider for the Tushare Pro API
//!
//! Every API is a POST of `{api_name, token, params, fields}` to a single URL.
//! The response carries a status code, a message, and a tabular payload.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::client::UpstreamApi;
use super::raw::{FetchParams, RawRecord};
use crate::config::ProviderConfig;
use crate::error::{ConfigError, FetchError};

const CODE_TOKEN_INVALID: i64 = 40001;
const CODE_NO_PERMISSION: i64 = 40101;
const CODE_RATE_LIMITED: i64 = 40203;

#[derive(Debug, Serialize)]
struct TushareRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: Value,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TushareData>,
}

#[derive(Debug, Deserialize)]
struct TushareData {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

pub struct TushareClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl TushareClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        if config.token.trim().is_empty() {
            return Err(ConfigError::Missing("TUSHARE_TOKEN".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
        })
    }

    fn parse_response(api_name: &str, response: TushareResponse) -> Result<Vec<RawRecord>, FetchError> {
        if response.code != 0 {
            return Err(classify_error(
                api_name,
                response.code,
                response.msg.as_deref().unwrap_or_default(),
            ));
        }

        let rows: Vec<RawRecord> = match response.data {
            Some(data) => data
                .items
                .into_iter()
                .map(|items| RawRecord::from_row(&data.fields, items))
                .collect(),
            None => Vec::new(),
        };

        if rows.is_empty() {
            return Err(FetchError::NotFound {
                api: api_name.to_string(),
            });
        }

        Ok(rows)
    }
}

#[async_trait]
impl UpstreamApi for TushareClient {
    async fn call(
        &self,
        api_name: &str,
        params: &FetchParams,
        fields: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let request = TushareRequest {
            api_name,
            token: &self.token,
            params: params.to_json(),
            fields,
        };

        let response = self
            .http
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Transient(format!("{} timed out: {}", api_name, e))
                } else {
                    FetchError::Transient(format!("{} request failed: {}", api_name, e))
                }
            })?;

        let status = response.status();
        if let Some(err) = classify_status(api_name, status) {
            return Err(err);
        }

        let body: TushareResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("{} returned malformed body: {}", api_name, e)))?;

        Self::parse_response(api_name, body)
    }
}

fn classify_status(api_name: &str, status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let message = format!("HTTP {}", status);
    let err = match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimitExceeded {
            api: api_name.to_string(),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Permission {
            api: api_name.to_string(),
            message,
        },
        _ => FetchError::Transient(format!("{}: {}", api_name, message)),
    };
    Some(err)
}

/// Map a non-zero provider code and its message to a fetch error category
pub fn classify_error(api_name: &str, code: i64, msg: &str) -> FetchError {
    let lowered = msg.to_lowercase();

    let rate_limited = code == CODE_RATE_LIMITED
        || msg.contains("每分钟")
        || msg.contains("频率")
        || lowered.contains("per minute")
        || lowered.contains("rate limit");
    if rate_limited {
        return FetchError::RateLimitExceeded {
            api: api_name.to_string(),
            message: msg.to_string(),
        };
    }

    let denied = code == CODE_TOKEN_INVALID
        || code == CODE_NO_PERMISSION
        || msg.contains("权限")
        || msg.contains("积分")
        || lowered.contains("permission")
        || lowered.contains("points");
    if denied {
        return FetchError::Permission {
            api: api_name.to_string(),
            message: msg.to_string(),
        };
    }

    FetchError::Transient(format!("{} failed with code {}: {}", api_name, code, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_error("daily", -2001, "抱歉，您每分钟最多访问该接口500次");
        assert!(err.is_rate_limited());

        let err = classify_error("daily", 40203, "");
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_classify_permission() {
        let err = classify_error("ths_member", -2002, "抱歉，您没有访问该接口的权限");
        assert!(err.is_permission());

        let err = classify_error("income", 40101, "insufficient points");
        assert!(err.is_permission());
    }

    #[test]
    fn test_classify_unknown_code_is_transient() {
        let err = classify_error("weekly", 50001, "internal error");
        assert!(err.is_retryable());
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status("daily", StatusCode::OK).is_none());
        assert!(classify_status("daily", StatusCode::TOO_MANY_REQUESTS)
            .unwrap()
            .is_rate_limited());
        assert!(classify_status("daily", StatusCode::FORBIDDEN)
            .unwrap()
            .is_permission());
        assert!(classify_status("daily", StatusCode::BAD_GATEWAY)
            .unwrap()
            .is_retryable());
    }

    #[test]
    fn test_parse_response_rows() {
        let body: TushareResponse = serde_json::from_value(json!({
            "code": 0,
            "msg": "",
            "data": {
                "fields": ["ts_code", "trade_date", "close"],
                "items": [
                    ["600000.SH", "20240612", 7.85],
                    ["000001.SZ", "20240612", 10.12]
                ]
            }
        }))
        .unwrap();

        let rows = TushareClient::parse_response("daily", body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_str("ts_code").as_deref(), Some("000001.SZ"));
    }

    #[test]
    fn test_parse_empty_response_is_not_found() {
        let body: TushareResponse = serde_json::from_value(json!({
            "code": 0,
            "data": { "fields": ["ts_code"], "items": [] }
        }))
        .unwrap();

        let err = TushareClient::parse_response("dividend", body).unwrap_err();
        assert_eq!(
            err,
            FetchError::NotFound {
                api: "dividend".to_string()
            }
        );
    }
}
