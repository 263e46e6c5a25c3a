//! Same-calendar-month average return over prior years.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::MARKET_TZ;
use crate::http::FetchError;
use crate::market::{BarInterval, PriceBar, PriceHistoryProvider};

pub const DEFAULT_SEASONALITY_RANGE: &str = "15y";
pub const MIN_HISTORY_BARS: usize = 24;
pub const MIN_SEASONAL_SAMPLES: usize = 3;

pub const SEASONALITY_NOT_AVAILABLE: &str = "N/A";
pub const SEASONALITY_LIMITED: &str = "Limited data";
pub const SEASONALITY_ERROR: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeasonalBias {
    StronglyBullish,
    Bullish,
    Neutral,
    Bearish,
    StronglyBearish,
}

impl SeasonalBias {
    pub fn classify(average_pct: f64) -> Self {
        if average_pct > 1.2 {
            Self::StronglyBullish
        } else if average_pct > 0.5 {
            Self::Bullish
        } else if average_pct < -1.2 {
            Self::StronglyBearish
        } else if average_pct < -0.5 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::StronglyBullish => "Strongly Bullish",
            Self::Bullish => "Bullish",
            Self::Neutral => "Neutral",
            Self::Bearish => "Bearish",
            Self::StronglyBearish => "Strongly Bearish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub value: String,
    pub bias: SeasonalBias,
    pub samples: usize,
}

impl Seasonality {
    fn sentinel(value: &str) -> Self {
        Self {
            value: value.to_string(),
            bias: SeasonalBias::Neutral,
            samples: 0,
        }
    }
}

/// Mean close-to-close return of the bars in `today`'s calendar month,
/// excluding a bar that belongs to the still-running month itself.
///
/// Returns the average in percent and the number of samples averaged.
pub fn seasonal_average(bars: &[PriceBar], today: NaiveDate) -> Result<(f64, usize), FetchError> {
    let mut same_month: Vec<(i32, Option<f64>)> = Vec::new();
    let mut previous_close: Option<f64> = None;

    for bar in bars {
        let local = bar.ts_utc.with_timezone(&MARKET_TZ).date_naive();
        let period_return = previous_close
            .filter(|prev| *prev != 0.0)
            .map(|prev| (bar.close / prev - 1.0) * 100.0);
        previous_close = Some(bar.close);

        if local.month() == today.month() {
            same_month.push((local.year(), period_return));
        }
    }

    if same_month
        .last()
        .is_some_and(|(year, _)| *year == today.year())
    {
        same_month.pop();
    }

    let samples: Vec<f64> = same_month
        .into_iter()
        .filter_map(|(_, period_return)| period_return)
        .filter(|value| value.is_finite())
        .collect();

    if samples.len() < MIN_SEASONAL_SAMPLES {
        return Err(FetchError::insufficient(format!(
            "{} same-month samples, need {MIN_SEASONAL_SAMPLES}",
            samples.len()
        )));
    }

    let average = samples.iter().sum::<f64>() / samples.len() as f64;
    Ok((average, samples.len()))
}

/// Never fails: errors collapse into a sentinel value with a neutral bias.
pub fn estimate_seasonality(
    provider: &dyn PriceHistoryProvider,
    symbol: &str,
    range: &str,
    today: NaiveDate,
) -> Seasonality {
    let bars = match provider.close_history(symbol, range, BarInterval::Monthly) {
        Ok(bars) => bars,
        Err(err) => {
            warn!(
                component = "seasonality",
                event = "seasonality.fetch.degraded",
                symbol,
                reason = err.reason(),
                error = %err
            );
            return Seasonality::sentinel(SEASONALITY_ERROR);
        }
    };

    if bars.len() < MIN_HISTORY_BARS {
        warn!(
            component = "seasonality",
            event = "seasonality.history.short",
            symbol,
            bars = bars.len()
        );
        return Seasonality::sentinel(SEASONALITY_NOT_AVAILABLE);
    }

    match seasonal_average(&bars, today) {
        Ok((average, samples)) => {
            let bias = SeasonalBias::classify(average);
            info!(
                component = "seasonality",
                event = "seasonality.finish",
                symbol,
                month = today.month(),
                samples,
                average,
                bias = bias.label()
            );
            Seasonality {
                value: format!("{average:+.2}%"),
                bias,
                samples,
            }
        }
        Err(FetchError::InsufficientData(message)) => {
            warn!(
                component = "seasonality",
                event = "seasonality.samples.limited",
                symbol,
                detail = %message
            );
            Seasonality::sentinel(SEASONALITY_LIMITED)
        }
        Err(err) => {
            warn!(
                component = "seasonality",
                event = "seasonality.compute.degraded",
                symbol,
                reason = err.reason(),
                error = %err
            );
            Seasonality::sentinel(SEASONALITY_ERROR)
        }
    }
}
