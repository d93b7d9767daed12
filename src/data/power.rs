//! NASA POWER daily point API.
//!
//! One request fetches every variable. When POWER rejects that request as a
//! whole (an unknown parameter name is a 4xx), each variable is fetched on
//! its own and the rejected ones are left out. The JSON body nests the data as
//! `properties.parameter.<NAME>.<YYYYMMDD> = value`; older responses put the
//! parameter block at the top level, so both layouts are accepted.

use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::data::{HistoryProvider, HistoryRequest, match_variable, normalize_units};
use crate::domain::TimeSeries;
use crate::error::AppError;

const BASE_URL: &str = "https://power.larc.nasa.gov/api/temporal/daily/point";
const COMMUNITY: &str = "RE";

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 0.5;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const TRANSIENT_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Statuses worth another attempt.
pub fn is_transient(status: StatusCode) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// Wait before `attempt` (1-based): none, then 0.5 s, 1 s, ...
pub fn backoff(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(BACKOFF_BASE_SECS * f64::from(1u32 << (attempt - 2)))
}

/// Outcome of a POWER request that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum PowerReply {
    Body(Value),
    /// A client error (4xx): the query itself is unacceptable.
    Rejected(StatusCode),
}

pub struct PowerClient {
    client: Client,
    base_url: String,
}

impl PowerClient {
    /// Build a client; `WXF_POWER_URL` and `WXF_TIMEOUT_SECS` (from the
    /// environment or `.env`) override the endpoint and timeout.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("WXF_POWER_URL").unwrap_or_else(|_| BASE_URL.to_string());
        let timeout = match std::env::var("WXF_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| AppError::invalid(format!("Invalid WXF_TIMEOUT_SECS '{raw}'.")))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| AppError::data(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn get_with_retries(&self, query: &[(&str, String)]) -> Result<PowerReply, AppError> {
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let wait = backoff(attempt);
            if !wait.is_zero() {
                warn!(attempt, wait_secs = wait.as_secs_f64(), error = %last_error, "retrying POWER request");
                thread::sleep(wait);
            }

            let resp = match self.client.get(&self.base_url).query(query).send() {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("request failed: {e}");
                    continue;
                }
            };

            let status = resp.status();
            if is_transient(status) {
                last_error = format!("status {status}");
                continue;
            }
            if status.is_client_error() {
                return Ok(PowerReply::Rejected(status));
            }
            if !status.is_success() {
                return Err(AppError::data(format!("POWER request failed with status {status}.")));
            }
            return resp
                .json::<Value>()
                .map(PowerReply::Body)
                .map_err(|e| AppError::data(format!("Failed to parse POWER response: {e}")));
        }
        Err(AppError::data(format!(
            "POWER request failed after {MAX_ATTEMPTS} attempts ({last_error})."
        )))
    }
}

impl HistoryProvider for PowerClient {
    fn name(&self) -> &'static str {
        "NASA POWER"
    }

    fn fetch(&self, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
        let (Some(start), Some(end)) = (request.start_date(), request.end_date()) else {
            return Err(AppError::invalid("Invalid history year range."));
        };
        if end < start {
            return Err(AppError::data(format!("History range {start}..{end} is empty.")));
        }

        info!(lat = request.lat, lon = request.lon, %start, %end, "fetching POWER history");
        fetch_with_fallback(&request.variables, |variables| {
            let query = vec![
                ("parameters", variables.join(",")),
                ("community", COMMUNITY.to_string()),
                ("longitude", request.lon.to_string()),
                ("latitude", request.lat.to_string()),
                ("start", start.format("%Y%m%d").to_string()),
                ("end", end.format("%Y%m%d").to_string()),
                ("format", "JSON".to_string()),
            ];
            self.get_with_retries(&query)
        })
    }
}

/// Request every variable at once; if that is rejected, request them one at
/// a time and skip the rejected ones.
pub fn fetch_with_fallback<F>(variables: &[String], mut get: F) -> Result<Vec<(String, TimeSeries)>, AppError>
where
    F: FnMut(&[String]) -> Result<PowerReply, AppError>,
{
    let status = match get(variables)? {
        PowerReply::Body(body) => return parse_power_response(&body, variables),
        PowerReply::Rejected(status) => status,
    };
    warn!(%status, "POWER rejected the combined request; fetching variables one at a time");

    let mut out = Vec::new();
    for name in variables {
        let single = std::slice::from_ref(name);
        match get(single)? {
            PowerReply::Body(body) => out.extend(parse_power_response(&body, single)?),
            PowerReply::Rejected(status) => {
                warn!(variable = %name, %status, "POWER rejected the variable; leaving it out");
            }
        }
    }
    Ok(out)
}

fn parameter_block(body: &Value) -> Option<&Map<String, Value>> {
    body.pointer("/properties/parameter")
        .or_else(|| body.get("parameters"))
        .or_else(|| body.get("parameter"))
        .and_then(Value::as_object)
}

fn parse_day(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(key, "%Y-%m-%d"))
        .ok()
}

/// Extract one series per requested variable from a POWER JSON body.
pub fn parse_power_response(body: &Value, requested: &[String]) -> Result<Vec<(String, TimeSeries)>, AppError> {
    let block = parameter_block(body)
        .ok_or_else(|| AppError::data("Unexpected POWER response structure."))?;

    let mut out = Vec::new();
    for name in requested {
        let Some(key) = match_variable(name, block.keys().map(String::as_str)) else {
            debug!(variable = %name, "not present in POWER response");
            continue;
        };
        let Some(days) = block.get(key).and_then(Value::as_object) else {
            continue;
        };
        let obs = days
            .iter()
            .filter_map(|(day, v)| parse_day(day).map(|d| (d, v.as_f64())));
        if let Some(series) = TimeSeries::from_observations(obs) {
            if key != name {
                debug!(requested = %name, returned = key, "matched POWER parameter alias");
            }
            out.push((name.clone(), normalize_units(name, series)));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_layout_with_sentinels_and_aliases() {
        let body = json!({
            "properties": {
                "parameter": {
                    "T2M": {"20240101": 5.5, "20240102": -999.0, "20240104": 7.0},
                    "PRECTOTCORR": {"20240101": 0.0, "20240102": 1.25}
                }
            }
        });
        let out = parse_power_response(&body, &["T2M".into(), "PRECTOT".into(), "WS2M".into()]).unwrap();
        assert_eq!(out.len(), 2);

        let (name, t2m) = &out[0];
        assert_eq!(name, "T2M");
        assert_eq!(t2m.len(), 4);
        assert_eq!(t2m.values(), &[Some(5.5), None, None, Some(7.0)]);

        assert_eq!(out[1].0, "PRECTOT");
        assert_eq!(out[1].1.values(), &[Some(0.0), Some(1.25)]);
    }

    #[test]
    fn accepts_flat_layout() {
        let body = json!({"parameter": {"WS2M": {"20230301": 3.0}}});
        let out = parse_power_response(&body, &["WS2M".into()]).unwrap();
        assert_eq!(out[0].1.values(), &[Some(3.0)]);
    }

    #[test]
    fn rejects_unknown_structure() {
        let body = json!({"messages": ["bad request"]});
        assert!(parse_power_response(&body, &["T2M".into()]).is_err());
    }

    fn body_for(variables: &[String]) -> Value {
        let block: Map<String, Value> = variables
            .iter()
            .map(|v| (v.clone(), json!({"20240101": 1.0, "20240102": 2.0})))
            .collect();
        json!({"properties": {"parameter": block}})
    }

    #[test]
    fn rejected_combined_request_falls_back_to_single_variables() {
        let variables: Vec<String> = vec!["T2M".into(), "NOT_A_VARIABLE".into(), "WS2M".into()];
        let mut calls: Vec<Vec<String>> = Vec::new();
        let out = fetch_with_fallback(&variables, |vars| {
            calls.push(vars.to_vec());
            if vars.iter().any(|v| v == "NOT_A_VARIABLE") {
                Ok(PowerReply::Rejected(StatusCode::UNPROCESSABLE_ENTITY))
            } else {
                Ok(PowerReply::Body(body_for(vars)))
            }
        })
        .unwrap();

        let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["T2M", "WS2M"]);
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], variables);
    }

    #[test]
    fn accepted_combined_request_is_fetched_once() {
        let variables: Vec<String> = vec!["T2M".into(), "RH2M".into()];
        let mut calls = 0;
        let out = fetch_with_fallback(&variables, |vars| {
            calls += 1;
            Ok(PowerReply::Body(body_for(vars)))
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn server_failures_still_abort() {
        let variables: Vec<String> = vec!["T2M".into()];
        let err = fetch_with_fallback(&variables, |_| Err(AppError::data("POWER request failed after 3 attempts.")))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DataUnavailable);
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_transient() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_transient(StatusCode::from_u16(code).unwrap()), "{code} should be retried");
        }
        for code in [200, 400, 404, 422, 501] {
            assert!(!is_transient(StatusCode::from_u16(code).unwrap()), "{code} should not be retried");
        }
    }

    #[test]
    fn backoff_doubles_from_half_a_second() {
        assert_eq!(backoff(1), Duration::ZERO);
        assert_eq!(backoff(2), Duration::from_millis(500));
        assert_eq!(backoff(3), Duration::from_secs(1));
        assert_eq!((1..=MAX_ATTEMPTS).filter(|a| !backoff(*a).is_zero()).count(), 2);
    }
}
