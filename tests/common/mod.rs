#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use market_drivers::{
    BuilderConfig, DashboardBuilder, FetchError, HttpFetcher, InMemoryNewsCache, NewsCache,
    NewsConfig, MARKET_TZ,
};
use serde_json::json;

pub const CHART_BASE: &str = "https://chart.test";
pub const FLOWS_URL: &str = "https://flows.test/FIIDII.csv";
pub const NEWS_BASE: &str = "https://news.test/rss";

/// Answers by the first route whose pattern is a substring of the URL.
#[derive(Default)]
pub struct RoutedFetcher {
    routes: Vec<(String, Result<Vec<u8>, FetchError>)>,
    calls: Mutex<Vec<String>>,
}

impl RoutedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.push((pattern.to_string(), Ok(body.into())));
        self
    }

    pub fn fail(mut self, pattern: &str, err: FetchError) -> Self {
        self.routes.push((pattern.to_string(), Err(err)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock should not be poisoned").clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls().iter().filter(|url| url.contains(needle)).count()
    }
}

impl HttpFetcher for RoutedFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls
            .lock()
            .expect("calls lock should not be poisoned")
            .push(url.to_string());
        self.routes
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| {
                Err(FetchError::Transport {
                    url: url.to_string(),
                    message: "no route".to_string(),
                })
            })
    }
}

/// Every request times out.
pub struct DownFetcher;

impl HttpFetcher for DownFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Timeout {
            url: url.to_string(),
        })
    }
}

pub fn ist(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
    MARKET_TZ
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid IST timestamp")
}

pub fn daily_chart(closes: &[f64]) -> Vec<u8> {
    let timestamps: Vec<i64> = (0..closes.len())
        .map(|idx| 1_765_000_000 + idx as i64 * 86_400)
        .collect();
    chart_json(&timestamps, closes)
}

/// Monthly bars Jan 2021..=Dec 2025; Decembers return 1, 2, 3, 4 and 50 percent.
pub fn monthly_chart_with_strong_decembers() -> Vec<u8> {
    let december_pct = [1.0, 2.0, 3.0, 4.0, 50.0];
    let mut timestamps = Vec::new();
    let mut closes = Vec::new();
    let mut close = 100.0;
    for (year_idx, year) in (2021..=2025).enumerate() {
        for month in 1..=12 {
            close *= if month == 12 {
                1.0 + december_pct[year_idx] / 100.0
            } else {
                1.001
            };
            timestamps.push(ist(year, month, 1, 0, 0).timestamp());
            closes.push(close);
        }
    }
    chart_json(&timestamps, &closes)
}

fn chart_json(timestamps: &[i64], closes: &[f64]) -> Vec<u8> {
    json!({
        "chart": {
            "result": [{
                "timestamp": timestamps,
                "indicators": { "quote": [{ "close": closes }] }
            }],
            "error": null
        }
    })
    .to_string()
    .into_bytes()
}

pub fn news_feed() -> Vec<u8> {
    br#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
<title>feed</title><link>https://news.test</link><description>search</description>
<item><title>Nifty rallies | banks lead</title><link>https://news.test/a</link><pubDate>Wed, 10 Dec 2025 04:30:00 GMT</pubDate></item>
<item><title>Second story</title><link>https://news.test/b</link></item>
</channel></rss>"#
        .to_vec()
}

pub fn flows_csv() -> Vec<u8> {
    b"Date,FII Net (Cr.),DII Net (Cr.)\n\"10-Dec-2025\",\"-1,234.50\",\"2,456.25\"\n".to_vec()
}

/// Every upstream answers; `^GSPC` is missing so `SPY` is used.
pub fn healthy_upstream() -> RoutedFetcher {
    RoutedFetcher::new()
        .route("news.test", news_feed())
        .route(FLOWS_URL, flows_csv())
        .route("chart/%5ENSEI?range=15y", monthly_chart_with_strong_decembers())
        .route("chart/%5ENSEI?range=5d", daily_chart(&[100.0, 101.0]))
        .route("chart/SPY?", daily_chart(&[200.0, 198.0]))
        .route("chart/CL%3DF?", daily_chart(&[80.0, 78.0]))
        .route("chart/%5EINDIAVIX?", daily_chart(&[14.0, 15.4]))
}

pub fn test_builder_config() -> BuilderConfig {
    BuilderConfig {
        yahoo_base_url: CHART_BASE.to_string(),
        flows_url: Some(FLOWS_URL.to_string()),
        ..BuilderConfig::default()
    }
}

pub fn test_news_config() -> NewsConfig {
    NewsConfig {
        feed_base_url: NEWS_BASE.to_string(),
        ..NewsConfig::default()
    }
}

pub fn builder_with(http: Arc<dyn HttpFetcher>) -> DashboardBuilder {
    let cache: Arc<dyn NewsCache> = Arc::new(InMemoryNewsCache::new());
    DashboardBuilder::new(http, cache, test_news_config(), test_builder_config())
}
