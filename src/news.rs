//! Related-news citations: feed query, selection, encoding and caching.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::http::{FetchError, HttpFetcher};
use crate::news_cache::{NewsCache, NewsCacheKey};

pub const NO_RECENT_NEWS: &str = "No recent news";
pub const NEWS_UNAVAILABLE: &str = "News unavailable";
pub const RECENT_DATE_MARKER: &str = "Recent";

const CITATION_SEPARATOR: &str = "|||";
const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub headline: String,
    pub url: String,
    pub date: String,
}

impl Citation {
    pub fn new(headline: impl Into<String>, url: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            url: url.into(),
            date: date.into(),
        }
    }

    fn encode(&self) -> String {
        format!(
            "{}|{}|{}",
            clean_field(&self.headline),
            clean_field(&self.url),
            clean_field(&self.date)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsConfig {
    pub feed_base_url: String,
    pub language: String,
    pub region: String,
    pub edition: String,
    pub freshness_secs: i64,
    pub max_citations: usize,
    pub max_scanned_entries: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_base_url: "https://news.google.com/rss/search".to_string(),
            language: "en-IN".to_string(),
            region: "IN".to_string(),
            edition: "IN:en".to_string(),
            freshness_secs: 30 * 60,
            max_citations: 3,
            max_scanned_entries: 6,
        }
    }
}

/// Serializes citations into the `Details` column form.
pub fn encode_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return NO_RECENT_NEWS.to_string();
    }
    citations
        .iter()
        .map(Citation::encode)
        .collect::<Vec<_>>()
        .join(CITATION_SEPARATOR)
}

/// True for values that mean "no citations available".
pub fn is_no_news(details: &str) -> bool {
    let trimmed = details.trim();
    trimmed.is_empty()
        || trimmed == NO_RECENT_NEWS
        || trimmed == NEWS_UNAVAILABLE
        || trimmed.eq_ignore_ascii_case("nan")
}

/// Parses a `Details` value; fragments without both headline and url are skipped.
pub fn parse_citations(details: &str) -> Vec<Citation> {
    if is_no_news(details) {
        return Vec::new();
    }

    details
        .split(CITATION_SEPARATOR)
        .filter_map(|fragment| {
            let mut parts = fragment.splitn(3, FIELD_SEPARATOR);
            let headline = parts.next()?.trim();
            let url = parts.next()?.trim();
            if headline.is_empty() || url.is_empty() {
                return None;
            }
            let date = parts
                .next()
                .map(str::trim)
                .filter(|date| !date.is_empty())
                .unwrap_or(RECENT_DATE_MARKER);
            Some(Citation::new(headline, url, date))
        })
        .collect()
}

/// Formats an RSS `pubDate` as `Dec 01`, or `Recent` when it cannot be read.
pub fn format_pub_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return parsed.format("%b %d").to_string();
    }

    let head = raw
        .char_indices()
        .nth(25)
        .map(|(idx, _)| &raw[..idx])
        .unwrap_or(raw);
    NaiveDateTime::parse_from_str(head.trim(), "%a, %d %b %Y %H:%M:%S")
        .map(|parsed| parsed.format("%b %d").to_string())
        .unwrap_or_else(|_| RECENT_DATE_MARKER.to_string())
}

/// Picks up to `max_citations` usable entries from the first `max_scanned` feed items.
pub fn parse_feed(
    payload: &[u8],
    max_citations: usize,
    max_scanned: usize,
) -> Result<Vec<Citation>, FetchError> {
    let channel =
        rss::Channel::read_from(payload).map_err(|err| FetchError::parse("news feed", err))?;

    let mut citations = Vec::new();
    for item in channel.items().iter().take(max_scanned) {
        let headline = item.title().map(str::trim).unwrap_or_default();
        let link = item.link().map(str::trim).unwrap_or_default();
        if headline.is_empty() || link.is_empty() {
            continue;
        }

        let date = item
            .pub_date()
            .map(format_pub_date)
            .unwrap_or_else(|| RECENT_DATE_MARKER.to_string());
        citations.push(Citation::new(headline, link, date));
        if citations.len() >= max_citations {
            break;
        }
    }

    Ok(citations)
}

pub struct NewsFetcher {
    http: Arc<dyn HttpFetcher>,
    cache: Arc<dyn NewsCache>,
    cfg: NewsConfig,
}

impl NewsFetcher {
    pub fn new(http: Arc<dyn HttpFetcher>, cache: Arc<dyn NewsCache>, cfg: NewsConfig) -> Self {
        Self { http, cache, cfg }
    }

    pub fn cache(&self) -> &Arc<dyn NewsCache> {
        &self.cache
    }

    pub fn feed_url(&self, topic: &str, lookback_days: u32) -> Result<String, FetchError> {
        let query = format!("{} when:{}d", topic.trim(), lookback_days.max(1));
        Url::parse_with_params(
            &self.cfg.feed_base_url,
            &[
                ("q", query.as_str()),
                ("hl", self.cfg.language.as_str()),
                ("gl", self.cfg.region.as_str()),
                ("ceid", self.cfg.edition.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|err| FetchError::parse("news feed url", err))
    }

    pub fn related_news(&self, topic: &str, lookback_days: u32) -> String {
        self.related_news_at(topic, lookback_days, Utc::now())
    }

    /// Never fails: errors collapse into [`NEWS_UNAVAILABLE`].
    pub fn related_news_at(&self, topic: &str, lookback_days: u32, now: DateTime<Utc>) -> String {
        let lookback_days = lookback_days.max(1);
        let key = NewsCacheKey::new(topic, lookback_days);
        let freshness = chrono::Duration::seconds(self.cfg.freshness_secs);

        match self.cache.get(&key) {
            Ok(Some(entry)) if entry.is_fresh(now, freshness) => {
                debug!(
                    component = "news",
                    event = "news.cache.hit",
                    topic,
                    lookback_days
                );
                return entry.value;
            }
            Ok(_) => {}
            Err(err) => warn!(
                component = "news",
                event = "news.cache.read_error",
                topic,
                error = %err
            ),
        }

        match self.fetch_from_feed(topic, lookback_days) {
            Ok(citations) => {
                let value = encode_citations(&citations);
                if let Err(err) = self.cache.put(&key, &value, now) {
                    warn!(
                        component = "news",
                        event = "news.cache.write_error",
                        topic,
                        error = %err
                    );
                }
                info!(
                    component = "news",
                    event = "news.fetch.finish",
                    topic,
                    lookback_days,
                    citations = citations.len()
                );
                value
            }
            Err(err) => {
                warn!(
                    component = "news",
                    event = "news.fetch.degraded",
                    topic,
                    reason = err.reason(),
                    error = %err
                );
                NEWS_UNAVAILABLE.to_string()
            }
        }
    }

    fn fetch_from_feed(&self, topic: &str, lookback_days: u32) -> Result<Vec<Citation>, FetchError> {
        let url = self.feed_url(topic, lookback_days)?;
        let payload = self.http.get_bytes(&url)?;
        parse_feed(
            &payload,
            self.cfg.max_citations,
            self.cfg.max_scanned_entries,
        )
    }
}

fn clean_field(raw: &str) -> String {
    raw.trim()
        .replace(['\r', '\n'], " ")
        .replace(FIELD_SEPARATOR, "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(items: &[(&str, &str, &str)]) -> Vec<u8> {
        let mut body = String::from(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>t</title><link>http://feed</link><description>d</description>",
        );
        for (title, link, date) in items {
            body.push_str("<item>");
            if !title.is_empty() {
                body.push_str(&format!("<title>{title}</title>"));
            }
            if !link.is_empty() {
                body.push_str(&format!("<link>{link}</link>"));
            }
            if !date.is_empty() {
                body.push_str(&format!("<pubDate>{date}</pubDate>"));
            }
            body.push_str("</item>");
        }
        body.push_str("</channel></rss>");
        body.into_bytes()
    }

    #[test]
    fn parses_two_citations_and_defaults_missing_date() {
        let parsed = parse_citations("Title A|http://a|Dec 01|||Title B|http://b");
        assert_eq!(
            parsed,
            vec![
                Citation::new("Title A", "http://a", "Dec 01"),
                Citation::new("Title B", "http://b", "Recent"),
            ]
        );
    }

    #[test]
    fn sentinels_and_blank_details_parse_to_nothing() {
        for details in ["", "   ", "No recent news", "News unavailable", "nan"] {
            assert!(parse_citations(details).is_empty(), "{details:?}");
        }
        assert!(parse_citations("headline only").is_empty());
    }

    #[test]
    fn third_split_keeps_remaining_pipes_in_the_date_slot() {
        let parsed = parse_citations("A|http://a|Dec 01|extra");
        assert_eq!(parsed[0].date, "Dec 01|extra");
    }

    #[test]
    fn encoding_strips_separators_from_fields() {
        let encoded = encode_citations(&[Citation::new("Nifty | Sensex rally", "http://x", "Dec 02")]);
        assert_eq!(encoded, "Nifty / Sensex rally|http://x|Dec 02");
        assert_eq!(parse_citations(&encoded)[0].headline, "Nifty / Sensex rally");
        assert_eq!(encode_citations(&[]), NO_RECENT_NEWS);
    }

    #[test]
    fn pub_dates_format_or_fall_back_to_recent() {
        assert_eq!(format_pub_date("Mon, 01 Dec 2025 08:30:00 GMT"), "Dec 01");
        assert_eq!(format_pub_date("Tue, 02 Dec 2025 08:30:00 +0530"), "Dec 02");
        assert_eq!(format_pub_date("yesterday"), "Recent");
        assert_eq!(format_pub_date(""), "Recent");
    }

    #[test]
    fn feed_selection_keeps_order_skips_incomplete_and_stops_at_three() {
        let payload = feed(&[
            ("First", "http://1", "Mon, 01 Dec 2025 08:30:00 GMT"),
            ("", "http://skip", ""),
            ("Second", "http://2", "garbage"),
            ("No link", "", ""),
            ("Third", "http://3", ""),
            ("Fourth", "http://4", ""),
        ]);

        let citations = parse_feed(&payload, 3, 6).unwrap();
        assert_eq!(citations.len(), 3);
        assert_eq!(citations[0], Citation::new("First", "http://1", "Dec 01"));
        assert_eq!(citations[1].date, "Recent");
        assert_eq!(citations[2].headline, "Third");
    }

    #[test]
    fn scan_cap_limits_entries_inspected() {
        let payload = feed(&[
            ("", "http://a", ""),
            ("", "http://b", ""),
            ("Late", "http://c", ""),
        ]);
        assert!(parse_feed(&payload, 3, 2).unwrap().is_empty());
    }

    #[test]
    fn malformed_feed_is_a_parse_error() {
        let err = parse_feed(b"<html><body>Access denied</body></html>", 3, 6).unwrap_err();
        assert_eq!(err.reason(), "parse_error");
    }
}
