//! Close-price history and the one-period percentage change.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::http::{FetchError, HttpFetcher};

/// Lookback that still spans two sessions over a weekend or holiday.
pub const DEFAULT_CHANGE_PERIOD: &str = "5d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarInterval {
    Daily,
    Monthly,
}

impl BarInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Monthly => "1mo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub ts_utc: DateTime<Utc>,
    pub close: f64,
}

pub trait PriceHistoryProvider: Send + Sync {
    /// Ordered close series; may be empty for an unknown symbol.
    fn close_history(
        &self,
        symbol: &str,
        range: &str,
        interval: BarInterval,
    ) -> Result<Vec<PriceBar>, FetchError>;
}

/// Yahoo Finance v8 chart endpoint.
pub struct YahooChartProvider {
    http: Arc<dyn HttpFetcher>,
    base_url: String,
}

impl YahooChartProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://query1.finance.yahoo.com";

    pub fn new(http: Arc<dyn HttpFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn chart_url(&self, symbol: &str, range: &str, interval: BarInterval) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(symbol.as_bytes()).collect();
        format!(
            "{}/v8/finance/chart/{encoded}?range={range}&interval={}",
            self.base_url.trim_end_matches('/'),
            interval.as_str()
        )
    }
}

impl PriceHistoryProvider for YahooChartProvider {
    fn close_history(
        &self,
        symbol: &str,
        range: &str,
        interval: BarInterval,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let url = self.chart_url(symbol, range, interval);
        let payload = self.http.get_bytes(&url)?;
        parse_chart_response(&payload)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Decodes a chart payload, dropping bars whose close is missing.
pub fn parse_chart_response(payload: &[u8]) -> Result<Vec<PriceBar>, FetchError> {
    let envelope: ChartEnvelope =
        serde_json::from_slice(payload).map_err(|err| FetchError::parse("chart response", err))?;

    if let Some(error) = envelope.chart.error.filter(|value| !value.is_null()) {
        return Err(FetchError::parse("chart response", error));
    }

    let Some(result) = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Ok(Vec::new());
    };

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|quote| quote.close)
        .unwrap_or_default();

    Ok(result
        .timestamp
        .into_iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close.filter(|value| value.is_finite())?;
            let ts_utc = Utc.timestamp_opt(ts, 0).single()?;
            Some(PriceBar { ts_utc, close })
        })
        .collect())
}

/// `(last / previous - 1) * 100` over the last two observed closes, rounded to 2 dp.
pub fn percent_change(closes: &[f64]) -> Result<f64, FetchError> {
    let observed: Vec<f64> = closes
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .collect();
    let [.., previous, latest] = observed.as_slice() else {
        return Err(FetchError::insufficient(format!(
            "{} observed closes, need 2",
            observed.len()
        )));
    };

    if *previous == 0.0 {
        return Err(FetchError::insufficient("previous close is zero"));
    }

    let change = (latest / previous - 1.0) * 100.0;
    Ok(round2(change))
}

/// Tries each alias in order and returns the first usable change, else `0.0`.
pub fn safe_change(provider: &dyn PriceHistoryProvider, aliases: &[String], period: &str) -> f64 {
    for alias in aliases {
        let attempt = provider
            .close_history(alias, period, BarInterval::Daily)
            .and_then(|bars| {
                let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
                percent_change(&closes)
            });

        match attempt {
            Ok(change) => {
                debug!(
                    component = "market",
                    event = "market.change.resolved",
                    symbol = %alias,
                    change
                );
                return change;
            }
            Err(err) => warn!(
                component = "market",
                event = "market.alias.failed",
                symbol = %alias,
                reason = err.reason(),
                error = %err
            ),
        }
    }

    0.0
}

pub fn format_change(change: f64) -> String {
    format!("{change:+.2}%")
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
