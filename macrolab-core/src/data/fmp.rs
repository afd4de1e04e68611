//! Financial Modeling Prep (FMP) economic-indicator provider.
//!
//! Fetches raw `{date, value}` rows from FMP's `v4/economic` endpoint. Handles
//! retries with exponential backoff, `Retry-After`, FMP's in-band error
//! objects, and the shared circuit breaker.
//!
//! Rows are returned untouched; cleaning is the pipeline's job.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataSource, FetchError, RawRecord, RawSeries, SeriesSource};
use crate::domain::Indicator;

const BASE_URL: &str = "https://financialmodelingprep.com/api/v4/economic";

/// Environment variable holding the FMP API key.
pub const API_KEY_ENV: &str = "FMP_API_KEY";

/// FMP economic-indicator provider.
pub struct FmpProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl FmpProvider {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            from: None,
            to: None,
        })
    }

    /// Provider keyed from `FMP_API_KEY`.
    pub fn from_env(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            FetchError::AuthenticationRequired(format!("{API_KEY_ENV} is not set"))
        })?;
        Self::new(api_key, circuit_breaker)
    }

    /// Ask the provider for a bounded date window (both inclusive, either optional).
    pub fn with_window(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    fn query(&self, indicator: &Indicator) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("name", indicator.id.clone()),
            ("apikey", self.api_key.clone()),
        ];
        if let Some(from) = self.from {
            query.push(("from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to {
            query.push(("to", to.format("%Y-%m-%d").to_string()));
        }
        query
    }

    /// Execute the request with retry and circuit breaker logic.
    fn fetch_with_retry(&self, indicator: &Indicator) -> Result<Vec<RawRecord>, FetchError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(FetchError::CircuitBreakerTripped);
        }

        let query = self.query(indicator);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(indicator = %indicator.id, attempt, ?delay, "retrying FMP request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(FetchError::CircuitBreakerTripped);
            }

            match self.client.get(BASE_URL).query(&query).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(FetchError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(FetchError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(FetchError::AuthenticationRequired(
                            "FMP rejected the API key".into(),
                        ));
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(FetchError::Other(format!(
                            "HTTP {status} for {}",
                            indicator.id
                        )));
                        continue;
                    }

                    let body: Value = resp.json().map_err(|e| {
                        FetchError::ResponseFormatChanged(format!(
                            "failed to parse response for {}: {e}",
                            indicator.id
                        ))
                    })?;

                    let records = parse_response(indicator, body)?;
                    self.circuit_breaker.record_success();
                    return Ok(records);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(FetchError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(FetchError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Other("max retries exceeded".into())))
    }
}

/// Turn an FMP response body into raw records.
///
/// FMP answers with a JSON array of rows on success and a JSON object carrying
/// an `"Error Message"` on failure (often still with HTTP 200).
pub(crate) fn parse_response(indicator: &Indicator, body: Value) -> Result<Vec<RawRecord>, FetchError> {
    match body {
        Value::Array(rows) => rows
            .into_iter()
            .map(|row| {
                serde_json::from_value::<RawRecord>(row).map_err(|e| {
                    FetchError::ResponseFormatChanged(format!("unexpected row shape: {e}"))
                })
            })
            .collect(),
        Value::Object(map) => {
            let message = map
                .get("Error Message")
                .and_then(Value::as_str)
                .unwrap_or("object returned where an array was expected");
            if message.to_ascii_lowercase().contains("api key") {
                Err(FetchError::AuthenticationRequired(message.to_string()))
            } else if message.to_ascii_lowercase().contains("invalid") {
                Err(FetchError::NotFound {
                    indicator: indicator.name.clone(),
                })
            } else {
                Err(FetchError::ResponseFormatChanged(message.to_string()))
            }
        }
        other => Err(FetchError::ResponseFormatChanged(format!(
            "unexpected response body: {other}"
        ))),
    }
}

impl SeriesSource for FmpProvider {
    fn name(&self) -> &str {
        "fmp"
    }

    fn fetch(&self, indicator: &Indicator) -> Result<RawSeries, FetchError> {
        let records = self.fetch_with_retry(indicator)?;
        Ok(RawSeries::new(indicator.clone(), records, DataSource::Fmp))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
