use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{FetchError, PriceSource};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::raw::{ColumnKey, RawColumn, RawSeries, RawTime};
use crate::retry::RetryConfig;
use crate::Symbol;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Daily history from Yahoo Finance's v8 chart endpoint.
///
/// Prices are split/dividend adjusted when the response carries an
/// `adjclose` series. Each row is stamped with its exchange-local calendar
/// date, so an in-progress session and its final bar share a key.
#[derive(Clone)]
pub struct YahooSource {
    http_client: Arc<dyn HttpClient>,
    retry: RetryConfig,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
    request_timeout_ms: u64,
}

impl Default for YahooSource {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            retry: RetryConfig::default(),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Size the per-request timeout so the current retry policy fits in a
    /// per-symbol `budget`. Call after [`Self::with_retry`].
    #[must_use]
    pub fn with_fetch_budget(self, budget: Duration) -> Self {
        let timeout = self.retry.request_timeout_within(budget);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.with_request_timeout_ms(timeout_ms)
    }

    fn chart_url(&self, symbol: &Symbol, start: Date) -> String {
        let period1 = start.midnight().assume_utc().unix_timestamp();
        let period2 = OffsetDateTime::now_utc().unix_timestamp();
        format!(
            "{}/v8/finance/chart/{}?period1={period1}&period2={period2}&interval=1d&events=history&includeAdjustedClose=true",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
        )
    }

    /// GET with retry. A 404 is returned as a response: it carries the
    /// upstream's reason for not knowing the symbol.
    ///
    /// While the circuit is open the request is still made once, without
    /// retries.
    async fn get_with_retry(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let attempts = self.circuit_breaker.attempt_budget(self.retry.attempts());
        if attempts < self.retry.attempts() {
            debug!(url, "yahoo circuit is open; trying once without retries");
        }

        let mut attempt = 0;
        loop {
            let request = HttpRequest::get(url)
                .with_header("referer", "https://finance.yahoo.com/")
                .with_timeout_ms(self.request_timeout_ms);
            let last_attempt = attempt + 1 >= attempts;

            match self.http_client.execute(request).await {
                Ok(response) if response.is_success() || response.status == 404 => {
                    self.circuit_breaker.record_success();
                    return Ok(response);
                }
                Ok(response) if !last_attempt && self.retry.should_retry_status(response.status) => {
                    debug!(status = response.status, attempt, "retrying yahoo chart request");
                }
                Ok(response) => {
                    self.circuit_breaker.record_failure();
                    return Err(status_error(response.status));
                }
                Err(error) if !last_attempt && self.retry.should_retry_error(&error) => {
                    debug!(error = %error, attempt, "retrying yahoo chart request");
                }
                Err(error) => {
                    self.circuit_breaker.record_failure();
                    return Err(if error.is_timeout() {
                        FetchError::timeout(format!("yahoo request timed out: {}", error.message()))
                    } else {
                        FetchError::unreachable(format!("yahoo transport error: {}", error.message()))
                    });
                }
            }

            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

impl PriceSource for YahooSource {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    fn fetch_daily<'a>(
        &'a self,
        symbol: &'a Symbol,
        start: Date,
    ) -> Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.chart_url(symbol, start);
            let response = self.get_with_retry(&url).await?;
            parse_chart(symbol, &response)
        })
    }
}

fn status_error(status: u16) -> FetchError {
    match status {
        429 => FetchError::rate_limited("yahoo returned status 429"),
        _ => FetchError::unreachable(format!("yahoo returned status {status}")),
    }
}

fn parse_chart(symbol: &Symbol, response: &HttpResponse) -> Result<RawSeries, FetchError> {
    let decoded = serde_json::from_str::<YahooChartResponse>(&response.body);

    let chart = match decoded {
        Ok(decoded) => decoded.chart,
        Err(_) if response.status == 404 => {
            return Err(FetchError::symbol_not_found(format!(
                "yahoo does not know {symbol}"
            )));
        }
        Err(error) => {
            return Err(FetchError::malformed_response(format!(
                "failed to parse yahoo chart: {error}"
            )));
        }
    };

    if let Some(error) = chart.error {
        let detail = format!("{}: {}", error.code, error.description);
        let lowered = detail.to_ascii_lowercase();
        return Err(
            if response.status == 404
                || lowered.contains("no data found")
                || lowered.contains("delisted")
                || lowered.contains("not found")
            {
                FetchError::symbol_not_found(format!("{symbol}: {detail}"))
            } else {
                FetchError::unreachable(format!("yahoo chart error for {symbol}: {detail}"))
            },
        );
    }

    if response.status == 404 {
        return Err(FetchError::symbol_not_found(format!(
            "yahoo does not know {symbol}"
        )));
    }

    let result = chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| FetchError::malformed_response("no chart result in response"))?;

    let timestamps = match result.timestamp {
        Some(timestamps) if !timestamps.is_empty() => timestamps,
        _ => return Ok(RawSeries::empty()),
    };

    let offset = UtcOffset::from_whole_seconds(result.meta.gmtoffset.unwrap_or(0))
        .map_err(|e| FetchError::malformed_response(format!("invalid gmtoffset: {e}")))?;
    let dates = timestamps
        .iter()
        .map(|&seconds| {
            OffsetDateTime::from_unix_timestamp(seconds)
                .map(|utc| RawTime::Date(utc.to_offset(offset).date()))
                .map_err(|e| FetchError::malformed_response(format!("invalid timestamp: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::malformed_response("no quote data in chart result"))?;
    let adjclose = result
        .indicators
        .adjclose
        .and_then(|series| series.into_iter().next())
        .map(|series| series.adjclose);

    let (open, high, low, close) = adjust_prices(quote.open, quote.high, quote.low, quote.close, adjclose);

    Ok(RawSeries::empty()
        .with_index(RawColumn::times(ColumnKey::flat("Date"), dates))
        .with_column(RawColumn::numbers(ColumnKey::flat("Open"), open))
        .with_column(RawColumn::numbers(ColumnKey::flat("High"), high))
        .with_column(RawColumn::numbers(ColumnKey::flat("Low"), low))
        .with_column(RawColumn::numbers(ColumnKey::flat("Close"), close))
        .with_column(RawColumn::numbers(ColumnKey::flat("Volume"), quote.volume)))
}

type PriceColumns = (
    Vec<Option<f64>>,
    Vec<Option<f64>>,
    Vec<Option<f64>>,
    Vec<Option<f64>>,
);

/// Scale open/high/low by `adjclose / close` and replace close with the
/// adjusted close. Rows without both values stay unadjusted.
fn adjust_prices(
    mut open: Vec<Option<f64>>,
    mut high: Vec<Option<f64>>,
    mut low: Vec<Option<f64>>,
    mut close: Vec<Option<f64>>,
    adjclose: Option<Vec<Option<f64>>>,
) -> PriceColumns {
    let Some(adjclose) = adjclose.filter(|adjusted| adjusted.len() == close.len()) else {
        return (open, high, low, close);
    };

    for (row, adjusted) in adjclose.into_iter().enumerate() {
        let (Some(adjusted), Some(raw_close)) = (adjusted, close[row]) else {
            continue;
        };
        if raw_close == 0.0 || !adjusted.is_finite() {
            continue;
        }
        let ratio = adjusted / raw_close;
        for column in [&mut open, &mut high, &mut low] {
            if let Some(value) = column.get_mut(row).and_then(Option::as_mut) {
                *value *= ratio;
            }
        }
        close[row] = Some(adjusted);
    }

    (open, high, low, close)
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: YahooChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::data_source::FetchErrorKind;
    use crate::http_client::HttpError;
    use crate::normalize::normalize;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use time::macros::{date, datetime};

    struct ScriptedHttpClient {
        responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().expect("requests").len()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests.lock().expect("requests").push(request);
            let next = self
                .responses
                .lock()
                .expect("responses")
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::new("script exhausted")));
            Box::pin(async move { next })
        }
    }

    fn source(client: Arc<ScriptedHttpClient>) -> YahooSource {
        YahooSource::new(client).with_retry(RetryConfig::fixed(Duration::ZERO, 2))
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("symbol")
    }

    const CHART_BODY: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"SPY","gmtoffset":-14400},
        "timestamp":[1719408600,1719495000,1719581400],
        "indicators":{
            "quote":[{"open":[100.0,101.0,null],"high":[102.0,103.0,104.0],
                      "low":[99.0,100.0,101.0],"close":[101.0,102.0,103.0],
                      "volume":[1000,null,3000]}],
            "adjclose":[{"adjclose":[50.5,102.0,103.0]}]}}],"error":null}}"#;

    #[tokio::test]
    async fn parses_chart_into_adjusted_raw_series() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(CHART_BODY))]);
        let spy = symbol("spy");

        let raw = source(client.clone())
            .fetch_daily(&spy, date!(2024-01-01))
            .await
            .expect("fetch");
        let bars = normalize(&raw, &spy, date!(2024-01-01)).expect("normalize");

        // third row has no open and is dropped
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, datetime!(2024-06-26 00:00:00));
        assert_eq!(bars[0].close, 50.5);
        assert_eq!(bars[0].open, 50.0);
        assert_eq!(bars[1].volume, 0);

        let requests = client.requests.lock().expect("requests");
        assert!(requests[0].url.contains("/v8/finance/chart/SPY?period1=1704067200"));
        assert!(requests[0].url.contains("interval=1d"));
    }

    #[tokio::test]
    async fn result_without_timestamps_is_an_empty_series() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(body))]);

        let raw = source(client)
            .fetch_daily(&symbol("WAY"), date!(2022-01-01))
            .await
            .expect("fetch");

        assert!(raw.is_empty());
    }

    #[tokio::test]
    async fn delisted_symbol_is_reported_as_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::new(404, body))]);

        let error = source(client.clone())
            .fetch_daily(&symbol("ZZZ"), date!(2022-01-01))
            .await
            .expect_err("not found");

        assert_eq!(error.kind(), FetchErrorKind::SymbolNotFound);
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json("<html>oops</html>"))]);

        let error = source(client)
            .fetch_daily(&symbol("SPY"), date!(2022-01-01))
            .await
            .expect_err("malformed");

        assert_eq!(error.kind(), FetchErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn retries_transient_statuses_then_succeeds() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(503, "")),
            Err(HttpError::new("connection reset")),
            Ok(HttpResponse::ok_json(CHART_BODY)),
        ]);

        let raw = source(client.clone())
            .fetch_daily(&symbol("SPY"), date!(2024-01-01))
            .await
            .expect("third attempt succeeds");

        assert_eq!(raw.row_count(), 3);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_maps_to_rate_limited() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
        ]);

        let error = source(client.clone())
            .fetch_daily(&symbol("SPY"), date!(2024-01-01))
            .await
            .expect_err("rate limited");

        assert_eq!(error.kind(), FetchErrorKind::RateLimited);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn fetch_budget_is_split_across_attempts() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(CHART_BODY))]);
        let yahoo = source(client.clone()).with_fetch_budget(Duration::from_millis(15_000));

        yahoo
            .fetch_daily(&symbol("SPY"), date!(2024-01-01))
            .await
            .expect("fetch");

        // three attempts plus a share for backoff
        assert_eq!(client.requests.lock().expect("requests")[0].timeout_ms, 3_750);
    }

    #[tokio::test]
    async fn open_circuit_still_fetches_every_symbol_once() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::ok_json(CHART_BODY)),
        ]);
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
        }));
        let yahoo = YahooSource::new(client.clone())
            .with_retry(RetryConfig::fixed(Duration::ZERO, 2))
            .with_circuit_breaker(Arc::clone(&breaker));

        // two symbols exhaust three attempts each and open the circuit
        for ticker in ["BADA", "BADB"] {
            let error = yahoo
                .fetch_daily(&symbol(ticker), date!(2024-01-01))
                .await
                .expect_err("server error");
            assert_eq!(error.kind(), FetchErrorKind::Unreachable);
        }
        assert_eq!(client.request_count(), 6);
        assert_eq!(breaker.state(), CircuitState::Open);

        let raw = yahoo
            .fetch_daily(&symbol("GOOD"), date!(2024-01-01))
            .await
            .expect("healthy symbol is still fetched");

        assert_eq!(raw.row_count(), 3);
        assert_eq!(client.request_count(), 7);
        assert!(client.requests.lock().expect("requests")[6].url.contains("/chart/GOOD?"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_drops_retries_for_a_failing_symbol() {
        let client = ScriptedHttpClient::new(vec![
            Err(HttpError::timeout("slow upstream")),
            Err(HttpError::timeout("slow upstream")),
            Ok(HttpResponse::ok_json(CHART_BODY)),
        ]);
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
        }));
        let yahoo = YahooSource::new(client.clone())
            .with_retry(RetryConfig::no_retry())
            .with_circuit_breaker(Arc::clone(&breaker));

        let first = yahoo
            .fetch_daily(&symbol("SPY"), date!(2024-01-01))
            .await
            .expect_err("timeout");
        assert_eq!(first.kind(), FetchErrorKind::Timeout);
        assert_eq!(breaker.state(), CircuitState::Open);

        let yahoo = yahoo.with_retry(RetryConfig::fixed(Duration::ZERO, 2));
        let second = yahoo
            .fetch_daily(&symbol("XBI"), date!(2024-01-01))
            .await
            .expect_err("single attempt");
        assert_eq!(second.kind(), FetchErrorKind::Timeout);
        // one request for XBI even though the policy allows three
        assert_eq!(client.request_count(), 2);
    }
}
