//! Market-driver dashboard core.
//!
//! Implemented scope:
//! - data builder: index/commodity changes, FII/DII flows, weekly expiry,
//!   seasonality, macro calendar, each with cached news citations
//! - persisted CSV table with TTL/staleness-aware loading
//! - HTML renderer and axum routes (page, JSON, CSV export, forced refresh)

mod builder;
mod calendar;
mod config;
mod flows;
mod http;
mod market;
mod news;
mod news_cache;
mod observability;
mod render;
mod seasonality;
mod server;
mod source;
mod table;

pub use builder::{
    default_instruments, persist_table, BuilderConfig, DashboardBuilder, ImpactPolarity,
    TrackedInstrument, META_TIMESTAMP_FORMAT,
};
pub use calendar::{
    earnings_season, format_event_date, macro_events, next_cpi_release, next_scheduled,
    market_now, next_weekly_expiry, CalendarEvent, EarningsSeason, MacroCalendar, MARKET_TZ,
};
pub use config::{AppConfig, ConfigError, NewsCacheBackend};
pub use flows::{
    fetch_institutional_flows, flow_impact, format_crore, parse_amount, parse_flow_csv,
    FlowSnapshot, DEFAULT_FLOWS_URL,
};
pub use http::{FetchError, HttpConfig, HttpFetcher, ReqwestBlockingFetcher};
pub use market::{
    format_change, parse_chart_response, percent_change, safe_change, BarInterval, PriceBar,
    PriceHistoryProvider, YahooChartProvider, DEFAULT_CHANGE_PERIOD,
};
pub use news::{
    encode_citations, format_pub_date, is_no_news, parse_citations, parse_feed, Citation,
    NewsConfig, NewsFetcher, NEWS_UNAVAILABLE, NO_RECENT_NEWS, RECENT_DATE_MARKER,
};
#[cfg(feature = "sqlite-cache")]
pub use news_cache::SqliteNewsCache;
pub use news_cache::{
    FileNewsCache, InMemoryNewsCache, NewsCache, NewsCacheEntry, NewsCacheError, NewsCacheKey,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_table_source, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use render::{
    export_file_name, group_by_timeframe, impact_tone, render_card, render_dashboard_html,
    render_news_panel, DisplayBucket, DisplayGroup, RenderOptions, Theme, Tone,
};
pub use seasonality::{
    estimate_seasonality, seasonal_average, SeasonalBias, Seasonality, DEFAULT_SEASONALITY_RANGE,
    MIN_HISTORY_BARS, MIN_SEASONAL_SAMPLES, SEASONALITY_ERROR, SEASONALITY_LIMITED,
    SEASONALITY_NOT_AVAILABLE,
};
pub use server::{dashboard_router, DashboardQuery, ServerError};
pub use source::{CachedTableSource, DriverTableSource, InMemoryTableSource, TableCacheConfig};
pub use table::{
    read_table, write_table, DriverRecord, DriverTable, TableError, Timeframe, META_EVENT,
    TABLE_HEADERS,
};
