//! Environment-driven application configuration.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Weekday};
use thiserror::Error;

use crate::builder::{BuilderConfig, DashboardBuilder};
use crate::flows::DEFAULT_FLOWS_URL;
use crate::http::{FetchError, HttpConfig, ReqwestBlockingFetcher};
use crate::news::NewsConfig;
use crate::news_cache::{FileNewsCache, InMemoryNewsCache, NewsCache, NewsCacheError};
use crate::observability::{LogFormat, LoggingConfig};
use crate::render::{RenderOptions, Theme};
use crate::source::TableCacheConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {var}='{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("HTTP client: {0}")]
    Http(#[from] FetchError),
    #[error("news cache: {0}")]
    NewsCache(#[from] NewsCacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsCacheBackend {
    File,
    Sqlite,
    Memory,
}

impl NewsCacheBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_file: PathBuf,
    pub cache_dir: PathBuf,
    pub news_cache: NewsCacheBackend,
    pub http: HttpConfig,
    pub news: NewsConfig,
    pub builder: BuilderConfig,
    pub table_cache: TableCacheConfig,
    pub render: RenderOptions,
    pub bind_addr: SocketAddr,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("dashboard_data.csv"),
            cache_dir: PathBuf::from("cache"),
            news_cache: NewsCacheBackend::File,
            http: HttpConfig::default(),
            news: NewsConfig::default(),
            builder: BuilderConfig::default(),
            table_cache: TableCacheConfig::default(),
            render: RenderOptions::default(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Overlays `MDRV_*` values from `lookup` on the defaults; blank values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut cfg = Self::default();

        if let Some(path) = get("MDRV_DATA_FILE") {
            cfg.data_file = PathBuf::from(path);
        }
        if let Some(dir) = get("MDRV_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("MDRV_NEWS_CACHE") {
            cfg.news_cache = NewsCacheBackend::parse(&raw)
                .ok_or_else(|| invalid("MDRV_NEWS_CACHE", &raw, "expected file, sqlite or memory"))?;
        }
        if let Some(raw) = get("MDRV_NEWS_FRESHNESS_SECS") {
            cfg.news.freshness_secs = parse_positive("MDRV_NEWS_FRESHNESS_SECS", &raw)?;
        }
        if let Some(raw) = get("MDRV_HTTP_TIMEOUT_MS") {
            cfg.http.timeout_ms = parse_positive("MDRV_HTTP_TIMEOUT_MS", &raw)? as u64;
        }
        if let Some(raw) = get("MDRV_TABLE_TTL_SECS") {
            cfg.table_cache.ttl_secs = parse_non_negative("MDRV_TABLE_TTL_SECS", &raw)?;
        }
        if let Some(raw) = get("MDRV_TABLE_MAX_AGE_SECS") {
            let secs = parse_non_negative("MDRV_TABLE_MAX_AGE_SECS", &raw)?;
            cfg.table_cache.max_file_age_secs = (secs > 0).then_some(secs);
        }
        if let Some(raw) = get("MDRV_EXPIRY_WEEKDAY") {
            cfg.builder.expiry_weekday = raw
                .parse::<Weekday>()
                .map_err(|_| invalid("MDRV_EXPIRY_WEEKDAY", &raw, "expected a weekday like thu"))?;
        }
        if let Some(raw) = get("MDRV_FLOWS_ENABLED") {
            let enabled = parse_bool(&raw)
                .ok_or_else(|| invalid("MDRV_FLOWS_ENABLED", &raw, "expected true or false"))?;
            cfg.builder.flows_url = enabled.then(|| DEFAULT_FLOWS_URL.to_string());
        }
        if let Some(raw) = get("MDRV_RBI_DATES") {
            cfg.builder.calendar.rbi_policy_dates = parse_dates("MDRV_RBI_DATES", &raw)?;
        }
        if let Some(raw) = get("MDRV_FOMC_DATES") {
            cfg.builder.calendar.fomc_decision_dates = parse_dates("MDRV_FOMC_DATES", &raw)?;
        }
        if let Some(raw) = get("MDRV_DASHBOARD_ADDR") {
            cfg.bind_addr = raw
                .parse()
                .map_err(|err| invalid("MDRV_DASHBOARD_ADDR", &raw, err))?;
        }
        if let Some(raw) = get("MDRV_AUTO_REFRESH_SECS") {
            cfg.render.auto_refresh_secs = parse_non_negative("MDRV_AUTO_REFRESH_SECS", &raw)? as u64;
        }
        if let Some(raw) = get("MDRV_THEME") {
            cfg.render.theme =
                Theme::parse(&raw).ok_or_else(|| invalid("MDRV_THEME", &raw, "expected dark or light"))?;
        }
        if let Some(raw) = get("MDRV_LOG_LEVEL") {
            cfg.logging.filter = raw;
            cfg.logging
                .env_filter()
                .map_err(|err| invalid("MDRV_LOG_LEVEL", &cfg.logging.filter, err))?;
        }
        if let Some(raw) = get("MDRV_LOG_FORMAT") {
            cfg.logging.format = LogFormat::parse(&raw)
                .ok_or_else(|| invalid("MDRV_LOG_FORMAT", &raw, "expected json or pretty"))?;
        }
        if let Some(raw) = get("MDRV_LOG_TARGET") {
            cfg.logging.include_target = parse_bool(&raw)
                .ok_or_else(|| invalid("MDRV_LOG_TARGET", &raw, "expected true or false"))?;
        }

        Ok(cfg)
    }

    pub fn open_news_cache(&self) -> Result<Arc<dyn NewsCache>, ConfigError> {
        match self.news_cache {
            NewsCacheBackend::File => Ok(Arc::new(FileNewsCache::new(self.cache_dir.clone()))),
            NewsCacheBackend::Memory => Ok(Arc::new(InMemoryNewsCache::new())),
            NewsCacheBackend::Sqlite => self.open_sqlite_cache(),
        }
    }

    #[cfg(feature = "sqlite-cache")]
    fn open_sqlite_cache(&self) -> Result<Arc<dyn NewsCache>, ConfigError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(NewsCacheError::from)?;
        let path = self.cache_dir.join("news_cache.sqlite");
        Ok(Arc::new(crate::news_cache::SqliteNewsCache::open(&path)?))
    }

    #[cfg(not(feature = "sqlite-cache"))]
    fn open_sqlite_cache(&self) -> Result<Arc<dyn NewsCache>, ConfigError> {
        Err(invalid(
            "MDRV_NEWS_CACHE",
            "sqlite",
            "built without the sqlite-cache feature",
        ))
    }

    /// Live builder: reqwest client, configured news cache, default providers.
    pub fn dashboard_builder(&self) -> Result<DashboardBuilder, ConfigError> {
        let http = Arc::new(ReqwestBlockingFetcher::new(&self.http)?);
        let cache = self.open_news_cache()?;
        Ok(DashboardBuilder::new(
            http,
            cache,
            self.news.clone(),
            self.builder.clone(),
        ))
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_non_negative(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    raw.parse::<i64>()
        .ok()
        .filter(|value| *value >= 0)
        .ok_or_else(|| invalid(var, raw, "expected a non-negative integer"))
}

fn parse_positive(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    raw.parse::<i64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| invalid(var, raw, "expected a positive integer"))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_dates(var: &'static str, raw: &str) -> Result<Vec<NaiveDate>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            NaiveDate::parse_from_str(part, "%Y-%m-%d")
                .map_err(|err| invalid(var, part, format!("expected YYYY-MM-DD ({err})")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.news.freshness_secs, 1800);
        assert_eq!(cfg.builder.expiry_weekday, Weekday::Thu);
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn overlays_values_and_ignores_blank_ones() {
        let cfg = config_from(&[
            ("MDRV_DATA_FILE", "out/drivers.csv"),
            ("MDRV_NEWS_CACHE", "MEMORY"),
            ("MDRV_NEWS_FRESHNESS_SECS", "600"),
            ("MDRV_TABLE_MAX_AGE_SECS", "0"),
            ("MDRV_EXPIRY_WEEKDAY", "tue"),
            ("MDRV_FLOWS_ENABLED", "off"),
            ("MDRV_RBI_DATES", "2026-12-04, 2027-02-05"),
            ("MDRV_THEME", "light"),
            ("MDRV_HTTP_TIMEOUT_MS", "   "),
        ])
        .unwrap();

        assert_eq!(cfg.data_file, PathBuf::from("out/drivers.csv"));
        assert_eq!(cfg.news_cache, NewsCacheBackend::Memory);
        assert_eq!(cfg.news.freshness_secs, 600);
        assert_eq!(cfg.table_cache.max_file_age_secs, None);
        assert_eq!(cfg.builder.expiry_weekday, Weekday::Tue);
        assert_eq!(cfg.builder.flows_url, None);
        assert_eq!(
            cfg.builder.calendar.rbi_policy_dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 12, 4).unwrap(),
                NaiveDate::from_ymd_opt(2027, 2, 5).unwrap()
            ]
        );
        assert_eq!(cfg.render.theme, Theme::Light);
        assert_eq!(cfg.http.timeout_ms, HttpConfig::default().timeout_ms);
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        let err = config_from(&[("MDRV_TABLE_TTL_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("MDRV_TABLE_TTL_SECS"));

        let err = config_from(&[("MDRV_FOMC_DATES", "2026-13-01")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MDRV_FOMC_DATES", .. }));

        assert!(config_from(&[("MDRV_NEWS_CACHE", "redis")]).is_err());
        assert!(config_from(&[("MDRV_DASHBOARD_ADDR", "localhost")]).is_err());
        assert!(config_from(&[("MDRV_NEWS_FRESHNESS_SECS", "0")]).is_err());
    }

    #[test]
    fn logging_variables_are_validated_like_the_rest() {
        let cfg = config_from(&[
            ("MDRV_LOG_LEVEL", "market_drivers=debug,warn"),
            ("MDRV_LOG_FORMAT", "JSON"),
            ("MDRV_LOG_TARGET", "no"),
        ])
        .unwrap();
        assert_eq!(cfg.logging.filter, "market_drivers=debug,warn");
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(!cfg.logging.include_target);

        let err = config_from(&[("MDRV_LOG_FORMAT", "yaml")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MDRV_LOG_FORMAT", .. }));
        let err = config_from(&[("MDRV_LOG_TARGET", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MDRV_LOG_TARGET", .. }));
        let err = config_from(&[("MDRV_LOG_LEVEL", "market_drivers=loud")]).unwrap_err();
        assert!(err.to_string().contains("MDRV_LOG_LEVEL"));
    }

    #[test]
    fn memory_backend_opens_without_touching_disk() {
        let cfg = AppConfig {
            news_cache: NewsCacheBackend::Memory,
            cache_dir: PathBuf::from("/nonexistent/never-created"),
            ..AppConfig::default()
        };
        assert!(cfg.open_news_cache().is_ok());
        assert!(!cfg.cache_dir.exists());
    }
}
