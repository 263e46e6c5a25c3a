mod common;

use std::sync::Arc;

use common::{builder_with, healthy_upstream, ist, DownFetcher};
use market_drivers::{
    parse_citations, read_table, DriverRecord, DriverTable, TableError, Timeframe, NEWS_UNAVAILABLE,
};
use tempfile::tempdir;

fn find<'a>(table: &'a DriverTable, event_prefix: &str) -> &'a DriverRecord {
    table
        .rows
        .iter()
        .find(|row| row.event.starts_with(event_prefix))
        .unwrap_or_else(|| panic!("missing row starting with '{event_prefix}'"))
}

#[test]
fn all_sources_down_still_yields_a_complete_table() {
    let builder = builder_with(Arc::new(DownFetcher));
    let table = builder.build_at(ist(2025, 12, 10, 10, 0));

    for event in ["NIFTY 50", "US Market (S&P500)", "Crude Oil", "India VIX"] {
        let row = find(&table, event);
        assert_eq!(row.timeframe, Timeframe::OneDay);
        assert_eq!(row.value, "+0.00%");
        assert_eq!(row.impact, "Neutral");
        assert_eq!(row.details, NEWS_UNAVAILABLE);
    }

    let fii = find(&table, "FII Net Flow");
    assert_eq!((fii.value.as_str(), fii.impact.as_str()), ("N/A", "Neutral"));
    let dii = find(&table, "DII Net Flow");
    assert_eq!((dii.value.as_str(), dii.impact.as_str()), ("N/A", "Neutral"));

    let expiry = find(&table, "Weekly F&O Expiry");
    assert_eq!(expiry.timeframe, Timeframe::SevenDay);
    assert_eq!(expiry.value, "Thu 11 Dec 2025");
    assert_eq!(expiry.impact, "Volatile");

    let seasonality = find(&table, "NIFTY December Seasonality");
    assert_eq!(seasonality.timeframe, Timeframe::ThirtyDay);
    assert_eq!(seasonality.value, "Error");
    assert_eq!(seasonality.impact, "Neutral");

    let last = table.rows.last().expect("table should not be empty");
    assert!(last.is_meta());
    assert_eq!(table.last_updated(), Some("2025-12-10 10:00:00"));
}

#[test]
fn calendar_rows_are_classified_against_the_build_date() {
    let builder = builder_with(Arc::new(DownFetcher));
    let table = builder.build_at(ist(2025, 12, 10, 10, 0));

    let fomc = find(&table, "US Fed (FOMC) Decision");
    assert_eq!(fomc.timeframe, Timeframe::Ongoing);
    assert_eq!(fomc.value, "Today");

    let rbi = find(&table, "RBI Policy Decision");
    assert_eq!(rbi.timeframe, Timeframe::Upcoming);
    assert_eq!(rbi.value, "06 Feb 2026");

    let cpi = find(&table, "India CPI Inflation Release");
    assert_eq!(cpi.value, "12 Dec 2025");

    let earnings = find(&table, "Q3 Earnings Season");
    assert_eq!(earnings.timeframe, Timeframe::Upcoming);
    assert_eq!(earnings.value, "From 10 Jan 2026");
}

#[test]
fn healthy_upstream_fills_every_driver() {
    let http = Arc::new(healthy_upstream());
    let builder = builder_with(http.clone());
    let table = builder.build_at(ist(2025, 12, 10, 10, 0));

    let nifty = find(&table, "NIFTY 50");
    assert_eq!((nifty.value.as_str(), nifty.impact.as_str()), ("+1.00%", "Bullish"));

    let spx = find(&table, "US Market (S&P500)");
    assert_eq!((spx.value.as_str(), spx.impact.as_str()), ("-1.00%", "Bearish"));
    assert_eq!(http.calls_matching("chart/%5EGSPC"), 1);
    assert_eq!(http.calls_matching("chart/SPY"), 1);

    let crude = find(&table, "Crude Oil");
    assert_eq!((crude.value.as_str(), crude.impact.as_str()), ("-2.50%", "Positive"));

    let vix = find(&table, "India VIX");
    assert_eq!((vix.value.as_str(), vix.impact.as_str()), ("+10.00%", "Volatile"));

    let fii = find(&table, "FII Net Flow");
    assert_eq!(fii.event, "FII Net Flow (10-Dec-2025)");
    assert_eq!((fii.value.as_str(), fii.impact.as_str()), ("₹-1,235 Cr", "Negative"));
    let dii = find(&table, "DII Net Flow");
    assert_eq!((dii.value.as_str(), dii.impact.as_str()), ("₹2,456 Cr", "Positive"));

    let seasonality = find(&table, "NIFTY December Seasonality");
    assert_eq!(seasonality.value, "+2.50%");
    assert_eq!(seasonality.impact, "Strongly Bullish");

    let citations = parse_citations(&nifty.details);
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].headline, "Nifty rallies / banks lead");
    assert_eq!(citations[0].date, "Dec 10");
    assert_eq!(citations[1].date, "Recent");
}

#[test]
fn rebuilding_at_the_same_moment_is_idempotent_and_served_from_the_news_cache() {
    let http = Arc::new(healthy_upstream());
    let builder = builder_with(http.clone());
    let now = ist(2025, 12, 10, 10, 0);

    let first = builder.build_at(now);
    let news_calls = http.calls_matching("news.test");
    assert!(news_calls > 0);

    let second = builder.build_at(now);
    assert_eq!(first, second);
    assert_eq!(http.calls_matching("news.test"), news_calls);
}

#[test]
fn persisted_table_reads_back_identically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("dashboard_data.csv");
    let builder = builder_with(Arc::new(healthy_upstream()));

    let table = builder
        .build_and_persist_at(&path, ist(2025, 12, 10, 10, 0))
        .unwrap();
    let reread = read_table(&path).unwrap();

    assert_eq!(reread, table);
    assert!(!path.with_file_name("dashboard_data.csv.tmp").exists());
}

#[test]
fn write_failure_is_returned_to_the_caller() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let path = blocker.join("dashboard_data.csv");

    let builder = builder_with(Arc::new(DownFetcher));
    let result = builder.build_and_persist_at(&path, ist(2025, 12, 10, 10, 0));

    assert!(matches!(result, Err(TableError::Io(_))));
    assert!(!path.exists());
}

#[test]
fn flows_can_be_switched_off() {
    let mut cfg = common::test_builder_config();
    cfg.flows_url = None;
    let builder = market_drivers::DashboardBuilder::new(
        Arc::new(DownFetcher),
        Arc::new(market_drivers::InMemoryNewsCache::new()),
        common::test_news_config(),
        cfg,
    );
    let table = builder.build_at(ist(2025, 12, 10, 10, 0));

    assert!(table.rows.iter().all(|row| !row.event.contains("Net Flow")));
}

#[test]
fn malformed_and_rejected_payloads_degrade_per_source() {
    let empty_chart = br#"{"chart":{"result":[{"timestamp":[],"indicators":{"quote":[{"close":[]}]}}],"error":null}}"#;
    let http = Arc::new(
        common::RoutedFetcher::new()
            .route("news.test", b"<html><body>Access denied</body></html>".to_vec())
            .route(common::FLOWS_URL, b"<html>blocked</html>".to_vec())
            .route("chart/%5ENSEI?range=15y", b"not json".to_vec())
            .route("chart/%5ENSEI?range=5d", empty_chart.to_vec())
            .fail(
                "chart/",
                market_drivers::FetchError::HttpStatus {
                    url: "https://chart.test".to_string(),
                    status: 500,
                },
            ),
    );
    let builder = builder_with(http);
    let table = builder.build_at(ist(2025, 12, 10, 10, 0));

    assert_eq!(find(&table, "NIFTY 50").value, "+0.00%");
    assert_eq!(find(&table, "Crude Oil").value, "+0.00%");
    assert_eq!(find(&table, "FII Net Flow").value, "N/A");
    assert_eq!(find(&table, "NIFTY December Seasonality").value, "Error");
    assert!(table
        .rows
        .iter()
        .filter(|row| !row.is_meta())
        .all(|row| row.details == NEWS_UNAVAILABLE));
    assert!(table.last_updated().is_some());
}

#[test]
fn consecutive_live_builds_differ_only_in_the_meta_row() {
    let builder = builder_with(Arc::new(healthy_upstream()));

    let first = builder.build();
    let second = builder.build();

    assert_eq!(
        first.without_meta().to_csv_bytes().unwrap(),
        second.without_meta().to_csv_bytes().unwrap()
    );
    assert!(first.last_updated().is_some());
    assert!(second.last_updated().is_some());
}
