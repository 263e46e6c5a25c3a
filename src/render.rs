//! HTML rendering of a driver table: grouped cards with expandable news.

use serde::{Deserialize, Serialize};

use crate::news::{is_no_news, parse_citations, NO_RECENT_NEWS};
use crate::table::{DriverRecord, DriverTable, Timeframe};

pub const MAX_RENDERED_CITATIONS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

/// Presentation-only settings; nothing here reaches the data layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub theme: Theme,
    /// `0` disables the page reload timer.
    pub auto_refresh_secs: u64,
    pub title: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            auto_refresh_secs: 300,
            title: "NIFTY Market Drivers".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Favorable,
    Unfavorable,
    Neutral,
}

impl Tone {
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Favorable => "tone-up",
            Self::Unfavorable => "tone-down",
            Self::Neutral => "tone-flat",
        }
    }
}

/// Substring heuristic over an open vocabulary; favourable words win ties.
pub fn impact_tone(impact: &str) -> Tone {
    const FAVORABLE: [&str; 3] = ["Positive", "Bullish", "Low"];
    const UNFAVORABLE: [&str; 4] = ["Negative", "Bearish", "High", "Volatile"];

    if FAVORABLE.iter().any(|word| impact.contains(word)) {
        Tone::Favorable
    } else if UNFAVORABLE.iter().any(|word| impact.contains(word)) {
        Tone::Unfavorable
    } else {
        Tone::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayBucket {
    OneDay,
    SevenDay,
    ThirtyDay,
    Upcoming,
    Ongoing,
    Other,
}

impl DisplayBucket {
    pub const ORDER: [DisplayBucket; 6] = [
        Self::OneDay,
        Self::SevenDay,
        Self::ThirtyDay,
        Self::Upcoming,
        Self::Ongoing,
        Self::Other,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::OneDay => "1-Day Triggers",
            Self::SevenDay => "7-Day Outlook",
            Self::ThirtyDay => "30-Day Trends",
            Self::Upcoming => "Upcoming Events",
            Self::Ongoing => "Ongoing Events",
            Self::Other => "Other Drivers",
        }
    }

    /// `None` for `Meta`, which is never a card.
    pub fn for_timeframe(timeframe: &Timeframe) -> Option<Self> {
        match timeframe {
            Timeframe::OneDay => Some(Self::OneDay),
            Timeframe::SevenDay => Some(Self::SevenDay),
            Timeframe::ThirtyDay => Some(Self::ThirtyDay),
            Timeframe::Upcoming => Some(Self::Upcoming),
            Timeframe::Ongoing => Some(Self::Ongoing),
            Timeframe::Meta => None,
            Timeframe::Other(_) => Some(Self::Other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayGroup<'a> {
    pub bucket: DisplayBucket,
    pub rows: Vec<&'a DriverRecord>,
}

/// Non-empty groups in fixed bucket order, rows in table order.
pub fn group_by_timeframe(table: &DriverTable) -> Vec<DisplayGroup<'_>> {
    DisplayBucket::ORDER
        .iter()
        .filter_map(|bucket| {
            let rows: Vec<&DriverRecord> = table
                .rows
                .iter()
                .filter(|row| DisplayBucket::for_timeframe(&row.timeframe) == Some(*bucket))
                .collect();
            (!rows.is_empty()).then_some(DisplayGroup {
                bucket: *bucket,
                rows,
            })
        })
        .collect()
}

pub fn render_news_panel(details: &str) -> String {
    let citations = if is_no_news(details) {
        Vec::new()
    } else {
        parse_citations(details)
    };

    let mut out = String::from("<details class=\"news\"><summary>Related news</summary>");
    if citations.is_empty() {
        let message = if details.trim().is_empty() || details.trim().eq_ignore_ascii_case("nan") {
            NO_RECENT_NEWS
        } else {
            details.trim()
        };
        out.push_str("<p class=\"news-empty\">");
        out.push_str(&escape_html(message));
        out.push_str("</p>");
    } else {
        out.push_str("<ul>");
        for citation in citations.iter().take(MAX_RENDERED_CITATIONS) {
            out.push_str("<li>");
            if is_web_link(&citation.url) {
                out.push_str("<a target=\"_blank\" rel=\"noopener noreferrer\" href=\"");
                out.push_str(&escape_html(&citation.url));
                out.push_str("\">");
                out.push_str(&escape_html(&citation.headline));
                out.push_str("</a>");
            } else {
                out.push_str(&escape_html(&citation.headline));
            }
            out.push_str(" <span class=\"news-date\">");
            out.push_str(&escape_html(&citation.date));
            out.push_str("</span></li>");
        }
        out.push_str("</ul>");
    }
    out.push_str("</details>");
    out
}

/// Only absolute http(s) URLs become anchors.
fn is_web_link(raw: &str) -> bool {
    url::Url::parse(raw.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

pub fn render_card(row: &DriverRecord) -> String {
    let tone = impact_tone(&row.impact);
    let mut out = format!("<article class=\"driver {}\">", tone.css_class());
    out.push_str("<h3>");
    out.push_str(&escape_html(&row.event));
    out.push_str("</h3><div class=\"metric\">");
    out.push_str(&escape_html(&row.value));
    out.push_str("</div><div class=\"impact\">");
    out.push_str(&escape_html(&row.impact));
    out.push_str("</div>");
    out.push_str(&render_news_panel(&row.details));
    out.push_str("</article>");
    out
}

pub fn render_dashboard_html(table: &DriverTable, options: &RenderOptions) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>");
    out.push_str(&escape_html(&options.title));
    out.push_str("</title>\n");
    out.push_str(STYLE);
    out.push_str(&format!(
        "</head><body class=\"theme-{}\"><main class=\"shell\">\n",
        options.theme.as_str()
    ));

    out.push_str("<section class=\"hero\"><h1>");
    out.push_str(&escape_html(&options.title));
    out.push_str("</h1><div class=\"hero-meta\">");
    out.push_str(&format!(
        "<a class=\"btn\" href=\"/dashboard?theme={}\">{} mode</a>",
        options.theme.toggled().as_str(),
        if options.theme == Theme::Dark { "Light" } else { "Dark" }
    ));
    out.push_str(&format!(
        "<form method=\"post\" action=\"/dashboard/refresh?theme={}\" class=\"refresh-form\"><button class=\"btn\" type=\"submit\">Force Refresh</button></form>",
        options.theme.as_str()
    ));
    out.push_str("<a class=\"btn\" href=\"/dashboard/export.csv\">Export CSV</a>");
    out.push_str("</div></section>\n");

    let groups = group_by_timeframe(table);
    if groups.is_empty() {
        out.push_str("<section class=\"notice\">Data unavailable. Try Force Refresh.</section>\n");
    } else {
        out.push_str("<section class=\"columns\">\n");
        for group in &groups {
            out.push_str("<div class=\"column\"><h2>");
            out.push_str(group.bucket.title());
            out.push_str("</h2>");
            for row in &group.rows {
                out.push_str(&render_card(row));
            }
            out.push_str("</div>\n");
        }
        out.push_str("</section>\n");
    }

    out.push_str("<footer>");
    match table.last_updated() {
        Some(stamp) => {
            out.push_str("Last updated: ");
            out.push_str(&escape_html(stamp));
            out.push_str(" IST");
        }
        None => out.push_str("Last updated: unknown"),
    }
    out.push_str("</footer>\n</main>");

    if options.auto_refresh_secs > 0 {
        out.push_str(&format!(
            "<script>setTimeout(() => window.location.reload(), {});</script>",
            options.auto_refresh_secs.saturating_mul(1000)
        ));
    }
    out.push_str("</body></html>\n");
    out
}

/// `nifty_drivers_YYYYMMDD.csv`
pub fn export_file_name(date: chrono::NaiveDate) -> String {
    format!("nifty_drivers_{}.csv", date.format("%Y%m%d"))
}

pub(crate) fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const STYLE: &str = "<style>.theme-dark{--bg:#0f1a20;--card:#17252d;--ink:#e8eef1;--muted:#9aabb5;--line:#2a3d47;--up:#1f9d55;--down:#d64545;--flat:#8a96a0}.theme-light{--bg:#f5f1e7;--card:#ffffff;--ink:#182026;--muted:#5f6a73;--line:#d7dce1;--up:#16794a;--down:#b83232;--flat:#6b7680}*{box-sizing:border-box}body{margin:0;background:var(--bg);color:var(--ink);font-family:\"Space Grotesk\",\"Avenir Next\",\"Segoe UI\",sans-serif;min-height:100vh}.shell{max-width:1400px;margin:0 auto;padding:24px 18px 28px}.hero{background:linear-gradient(135deg,#102f3a 0%,#24576b 100%);color:#f7fbfc;border-radius:16px;padding:18px 20px}.hero h1{margin:0 0 10px;font-size:1.6rem}.hero-meta{display:flex;gap:12px;flex-wrap:wrap;align-items:center}.refresh-form{margin:0}.btn{display:inline-flex;background:#0c5f78;color:#fff;text-decoration:none;padding:7px 12px;border-radius:9px;font-weight:700;font-size:.8rem;border:1px solid rgba(0,0,0,.12);cursor:pointer}.columns{display:grid;grid-template-columns:repeat(auto-fit,minmax(260px,1fr));gap:16px;margin-top:16px}.column h2{font-size:1rem;text-transform:uppercase;letter-spacing:.04em;color:var(--muted)}.driver{background:var(--card);border:1px solid var(--line);border-left:5px solid var(--flat);border-radius:12px;padding:12px 14px;margin-bottom:12px}.driver h3{margin:0 0 6px;font-size:.95rem}.metric{font-size:1.4rem;font-weight:700}.impact{font-size:.85rem;font-weight:700}.tone-up{border-left-color:var(--up)}.tone-up .impact{color:var(--up)}.tone-down{border-left-color:var(--down)}.tone-down .impact{color:var(--down)}.tone-flat .impact{color:var(--flat)}.news{margin-top:8px;font-size:.82rem}.news a{color:inherit}.news-date,.news-empty{color:var(--muted)}.notice{margin-top:16px;padding:16px;border-radius:12px;background:var(--card);border:1px solid var(--down)}footer{margin-top:20px;font-size:.8rem;color:var(--muted)}</style>\n";
