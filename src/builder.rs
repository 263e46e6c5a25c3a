//! One build cycle: query every source, degrade per source, persist the table.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::calendar::{
    format_event_date, macro_events, market_now, next_weekly_expiry, MacroCalendar,
};
use crate::flows::{fetch_institutional_flows, flow_impact, format_crore, DEFAULT_FLOWS_URL};
use crate::http::HttpFetcher;
use crate::market::{
    format_change, safe_change, PriceHistoryProvider, YahooChartProvider, DEFAULT_CHANGE_PERIOD,
};
use crate::news::{NewsConfig, NewsFetcher};
use crate::news_cache::NewsCache;
use crate::seasonality::{estimate_seasonality, DEFAULT_SEASONALITY_RANGE};
use crate::table::{write_table, DriverRecord, DriverTable, TableError, Timeframe};

pub const META_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a rise in an instrument reads for the home market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactPolarity {
    RiseIsBullish,
    RiseIsNegative,
    RiseIsVolatile,
}

impl ImpactPolarity {
    pub fn impact(self, change: f64) -> &'static str {
        if change == 0.0 {
            return "Neutral";
        }
        let rising = change > 0.0;
        match (self, rising) {
            (Self::RiseIsBullish, true) => "Bullish",
            (Self::RiseIsBullish, false) => "Bearish",
            (Self::RiseIsNegative, true) => "Negative",
            (Self::RiseIsNegative, false) => "Positive",
            (Self::RiseIsVolatile, true) => "Volatile",
            (Self::RiseIsVolatile, false) => "Calm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInstrument {
    pub event: String,
    /// Primary symbol first, fallbacks after.
    pub aliases: Vec<String>,
    pub polarity: ImpactPolarity,
    pub news_topic: String,
    pub news_lookback_days: u32,
}

impl TrackedInstrument {
    pub fn new(
        event: &str,
        aliases: &[&str],
        polarity: ImpactPolarity,
        news_topic: &str,
        news_lookback_days: u32,
    ) -> Self {
        Self {
            event: event.to_string(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
            polarity,
            news_topic: news_topic.to_string(),
            news_lookback_days,
        }
    }
}

pub fn default_instruments() -> Vec<TrackedInstrument> {
    vec![
        TrackedInstrument::new(
            "NIFTY 50",
            &["^NSEI"],
            ImpactPolarity::RiseIsBullish,
            "Nifty 50 today",
            2,
        ),
        TrackedInstrument::new(
            "US Market (S&P500)",
            &["^GSPC", "SPY"],
            ImpactPolarity::RiseIsBullish,
            "S&P 500 today",
            2,
        ),
        TrackedInstrument::new(
            "Crude Oil",
            &["CL=F", "BZ=F"],
            ImpactPolarity::RiseIsNegative,
            "crude oil price",
            2,
        ),
        TrackedInstrument::new(
            "India VIX",
            &["^INDIAVIX"],
            ImpactPolarity::RiseIsVolatile,
            "India VIX volatility",
            2,
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub instruments: Vec<TrackedInstrument>,
    pub change_period: String,
    pub seasonality_symbol: String,
    pub seasonality_label: String,
    pub seasonality_range: String,
    pub expiry_weekday: Weekday,
    pub expiry_label: String,
    /// `None` switches the FII/DII records off.
    pub flows_url: Option<String>,
    pub calendar: MacroCalendar,
    pub yahoo_base_url: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            change_period: DEFAULT_CHANGE_PERIOD.to_string(),
            seasonality_symbol: "^NSEI".to_string(),
            seasonality_label: "NIFTY".to_string(),
            seasonality_range: DEFAULT_SEASONALITY_RANGE.to_string(),
            expiry_weekday: Weekday::Thu,
            expiry_label: "Weekly F&O Expiry".to_string(),
            flows_url: Some(DEFAULT_FLOWS_URL.to_string()),
            calendar: MacroCalendar::default(),
            yahoo_base_url: YahooChartProvider::DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct DashboardBuilder {
    http: Arc<dyn HttpFetcher>,
    prices: Arc<dyn PriceHistoryProvider>,
    news: NewsFetcher,
    cfg: BuilderConfig,
}

impl DashboardBuilder {
    pub fn new(
        http: Arc<dyn HttpFetcher>,
        news_cache: Arc<dyn NewsCache>,
        news_cfg: NewsConfig,
        cfg: BuilderConfig,
    ) -> Self {
        let prices: Arc<dyn PriceHistoryProvider> = Arc::new(YahooChartProvider::new(
            Arc::clone(&http),
            cfg.yahoo_base_url.clone(),
        ));
        let news = NewsFetcher::new(Arc::clone(&http), news_cache, news_cfg);
        Self {
            http,
            prices,
            news,
            cfg,
        }
    }

    pub fn with_price_provider(mut self, prices: Arc<dyn PriceHistoryProvider>) -> Self {
        self.prices = prices;
        self
    }

    pub fn news(&self) -> &NewsFetcher {
        &self.news
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.cfg
    }

    /// Always returns a table ending in the `Meta` row stamped at completion.
    pub fn build(&self) -> DriverTable {
        self.build_stamped(market_now(), market_now)
    }

    /// Deterministic variant: `now` is used for both the inputs and the `Meta` stamp.
    pub fn build_at(&self, now: DateTime<Tz>) -> DriverTable {
        self.build_stamped(now, || now)
    }

    /// Sources are evaluated against `now`; `stamp` is read only after the last one answered.
    pub fn build_stamped(
        &self,
        now: DateTime<Tz>,
        stamp: impl FnOnce() -> DateTime<Tz>,
    ) -> DriverTable {
        let mut rows = self.collect_drivers(now);
        rows.push(meta_record(stamp()));
        DriverTable::new(rows)
    }

    pub fn build_and_persist(&self, path: &Path) -> Result<DriverTable, TableError> {
        let table = self.build();
        persist_table(path, &table)?;
        Ok(table)
    }

    pub fn build_and_persist_at(
        &self,
        path: &Path,
        now: DateTime<Tz>,
    ) -> Result<DriverTable, TableError> {
        let table = self.build_at(now);
        persist_table(path, &table)?;
        Ok(table)
    }

    fn collect_drivers(&self, now: DateTime<Tz>) -> Vec<DriverRecord> {
        let started = Instant::now();
        let now_utc = now.with_timezone(&Utc);
        let today = now.date_naive();
        info!(
            component = "builder",
            event = "builder.start",
            today = %today,
            instruments = self.cfg.instruments.len()
        );

        let mut rows = Vec::new();

        for instrument in &self.cfg.instruments {
            let change = safe_change(
                self.prices.as_ref(),
                &instrument.aliases,
                &self.cfg.change_period,
            );
            rows.push(DriverRecord::new(
                Timeframe::OneDay,
                instrument.event.clone(),
                format_change(change),
                instrument.polarity.impact(change),
                self.news.related_news_at(
                    &instrument.news_topic,
                    instrument.news_lookback_days,
                    now_utc,
                ),
            ));
        }

        if let Some(url) = &self.cfg.flows_url {
            rows.extend(self.flow_records(url, now_utc));
        }

        let expiry = next_weekly_expiry(today, self.cfg.expiry_weekday);
        rows.push(DriverRecord::new(
            Timeframe::SevenDay,
            self.cfg.expiry_label.clone(),
            expiry.format("%a %d %b %Y").to_string(),
            "Volatile",
            self.news.related_news_at("Nifty weekly expiry", 3, now_utc),
        ));

        let seasonality = estimate_seasonality(
            self.prices.as_ref(),
            &self.cfg.seasonality_symbol,
            &self.cfg.seasonality_range,
            today,
        );
        let month_name = now.format("%B").to_string();
        rows.push(DriverRecord::new(
            Timeframe::ThirtyDay,
            format!("{} {month_name} Seasonality", self.cfg.seasonality_label),
            seasonality.value,
            seasonality.bias.label(),
            self.news.related_news_at(
                &format!("{} outlook {month_name}", self.cfg.seasonality_label),
                7,
                now_utc,
            ),
        ));

        for event in macro_events(&self.cfg.calendar, today) {
            rows.push(DriverRecord::new(
                event.timeframe,
                event.event,
                event.value,
                event.impact,
                self.news
                    .related_news_at(&event.news_topic, event.news_lookback_days, now_utc),
            ));
        }

        info!(
            component = "builder",
            event = "builder.finish",
            rows = rows.len() + 1,
            elapsed_ms = started.elapsed().as_millis() as u64,
            next_expiry = %format_event_date(expiry)
        );
        rows
    }

    fn flow_records(&self, url: &str, now_utc: DateTime<Utc>) -> Vec<DriverRecord> {
        let details = self.news.related_news_at("FII DII flows", 2, now_utc);
        match fetch_institutional_flows(self.http.as_ref(), url) {
            Ok(snapshot) => vec![
                DriverRecord::new(
                    Timeframe::OneDay,
                    format!("FII Net Flow ({})", snapshot.date),
                    format_crore(snapshot.fii_net_cr),
                    flow_impact(snapshot.fii_net_cr),
                    details.clone(),
                ),
                DriverRecord::new(
                    Timeframe::OneDay,
                    format!("DII Net Flow ({})", snapshot.date),
                    format_crore(snapshot.dii_net_cr),
                    flow_impact(snapshot.dii_net_cr),
                    details,
                ),
            ],
            Err(err) => {
                warn!(
                    component = "builder",
                    event = "builder.source.degraded",
                    source = "institutional_flows",
                    reason = err.reason(),
                    error = %err
                );
                ["FII Net Flow", "DII Net Flow"]
                    .into_iter()
                    .map(|event| {
                        DriverRecord::new(Timeframe::OneDay, event, "N/A", "Neutral", details.clone())
                    })
                    .collect()
            }
        }
    }
}

fn meta_record(completed: DateTime<Tz>) -> DriverRecord {
    DriverRecord::meta(completed.format(META_TIMESTAMP_FORMAT).to_string())
}

/// Atomic write with `table.write.finish` / `table.write.error` events; the error is handed back.
pub fn persist_table(path: &Path, table: &DriverTable) -> Result<(), TableError> {
    match write_table(path, table) {
        Ok(()) => {
            info!(
                component = "builder",
                event = "table.write.finish",
                path = %path.display(),
                rows = table.rows.len()
            );
            Ok(())
        }
        Err(err) => {
            warn!(
                component = "builder",
                event = "table.write.error",
                path = %path.display(),
                error = %err
            );
            Err(err)
        }
    }
}
