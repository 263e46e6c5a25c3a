//! Calendar-driven drivers: weekly expiry and scheduled macro events.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use tracing::warn;

use crate::table::Timeframe;

/// Every wall-clock decision (today, month, build timestamp) is taken here.
pub const MARKET_TZ: Tz = chrono_tz::Asia::Kolkata;

pub fn market_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&MARKET_TZ)
}

/// Announced through FY2025-26; FY2026-27 follows the usual bi-monthly cadence until the
/// RBI publishes its schedule. `MDRV_RBI_DATES` replaces the whole table.
const RBI_POLICY_DATES: [(i32, u32, u32); 12] = [
    (2025, 4, 9),
    (2025, 6, 6),
    (2025, 8, 6),
    (2025, 10, 1),
    (2025, 12, 5),
    (2026, 2, 6),
    (2026, 4, 8),
    (2026, 6, 5),
    (2026, 8, 6),
    (2026, 10, 1),
    (2026, 12, 4),
    (2027, 2, 5),
];

/// 2027 entries are tentative until the Fed confirms them.
const FOMC_DECISION_DATES: [(i32, u32, u32); 24] = [
    (2025, 1, 29),
    (2025, 3, 19),
    (2025, 5, 7),
    (2025, 6, 18),
    (2025, 7, 30),
    (2025, 9, 17),
    (2025, 10, 29),
    (2025, 12, 10),
    (2026, 1, 28),
    (2026, 3, 18),
    (2026, 4, 29),
    (2026, 6, 17),
    (2026, 7, 29),
    (2026, 9, 16),
    (2026, 10, 28),
    (2026, 12, 9),
    (2027, 1, 27),
    (2027, 3, 17),
    (2027, 4, 28),
    (2027, 6, 16),
    (2027, 7, 28),
    (2027, 9, 22),
    (2027, 10, 27),
    (2027, 12, 8),
];

/// (start month, start day, end month, end day, fiscal quarter reported)
const EARNINGS_WINDOWS: [(u32, u32, u32, u32, &str); 4] = [
    (1, 10, 2, 15, "Q3"),
    (4, 10, 5, 15, "Q4"),
    (7, 10, 8, 15, "Q1"),
    (10, 10, 11, 15, "Q2"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCalendar {
    pub rbi_policy_dates: Vec<NaiveDate>,
    pub fomc_decision_dates: Vec<NaiveDate>,
    pub cpi_release_day: u32,
    pub horizon_days: i64,
}

impl Default for MacroCalendar {
    fn default() -> Self {
        Self {
            rbi_policy_dates: dates_from_table(&RBI_POLICY_DATES),
            fomc_decision_dates: dates_from_table(&FOMC_DECISION_DATES),
            cpi_release_day: 12,
            horizon_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub timeframe: Timeframe,
    pub event: String,
    pub value: String,
    pub impact: String,
    pub news_topic: String,
    pub news_lookback_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EarningsSeason {
    Ongoing { quarter: &'static str, ends: NaiveDate },
    Upcoming { quarter: &'static str, starts: NaiveDate },
}

/// Next `target` weekday strictly after `today`; a target equal to today rolls a full week.
pub fn next_weekly_expiry(today: NaiveDate, target: Weekday) -> NaiveDate {
    let today_idx = today.weekday().num_days_from_monday();
    let target_idx = target.num_days_from_monday();
    let offset = match (target_idx + 7 - today_idx) % 7 {
        0 => 7,
        days => days,
    };
    today + Days::new(u64::from(offset))
}

/// First scheduled date on or after `today`.
pub fn next_scheduled(dates: &[NaiveDate], today: NaiveDate) -> Option<NaiveDate> {
    dates.iter().copied().filter(|date| *date >= today).min()
}

/// `release_day` of this month, or of next month once it has passed.
pub fn next_cpi_release(today: NaiveDate, release_day: u32) -> Option<NaiveDate> {
    let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), release_day)?;
    if this_month >= today {
        return Some(this_month);
    }
    this_month.checked_add_months(Months::new(1))
}

pub fn earnings_season(today: NaiveDate) -> Option<EarningsSeason> {
    let mut upcoming: Option<(NaiveDate, &'static str)> = None;

    for year in [today.year(), today.year() + 1] {
        for (start_month, start_day, end_month, end_day, quarter) in EARNINGS_WINDOWS {
            let starts = NaiveDate::from_ymd_opt(year, start_month, start_day)?;
            let ends = NaiveDate::from_ymd_opt(year, end_month, end_day)?;
            if starts <= today && today <= ends {
                return Some(EarningsSeason::Ongoing { quarter, ends });
            }
            if starts > today && upcoming.map_or(true, |(best, _)| starts < best) {
                upcoming = Some((starts, quarter));
            }
        }
    }

    upcoming.map(|(starts, quarter)| EarningsSeason::Upcoming { quarter, starts })
}

/// Upcoming/Ongoing macro drivers within the calendar horizon.
pub fn macro_events(calendar: &MacroCalendar, today: NaiveDate) -> Vec<CalendarEvent> {
    let mut events = Vec::new();

    if let Some(date) = next_from_table("rbi", &calendar.rbi_policy_dates, today) {
        push_dated(
            &mut events,
            calendar,
            today,
            date,
            "RBI Policy Decision",
            "High",
            "RBI monetary policy",
        );
    }

    if let Some(date) = next_from_table("fomc", &calendar.fomc_decision_dates, today) {
        push_dated(
            &mut events,
            calendar,
            today,
            date,
            "US Fed (FOMC) Decision",
            "High",
            "Federal Reserve FOMC",
        );
    }

    if let Some(date) = next_cpi_release(today, calendar.cpi_release_day) {
        push_dated(
            &mut events,
            calendar,
            today,
            date,
            "India CPI Inflation Release",
            "Volatile",
            "India CPI inflation",
        );
    }

    match earnings_season(today) {
        Some(EarningsSeason::Ongoing { quarter, ends }) => events.push(CalendarEvent {
            timeframe: Timeframe::Ongoing,
            event: format!("{quarter} Earnings Season"),
            value: format!("Until {}", ends.format("%d %b")),
            impact: "Volatile".to_string(),
            news_topic: "Nifty quarterly results".to_string(),
            news_lookback_days: 3,
        }),
        Some(EarningsSeason::Upcoming { quarter, starts }) if within(calendar, today, starts) => {
            events.push(CalendarEvent {
                timeframe: Timeframe::Upcoming,
                event: format!("{quarter} Earnings Season"),
                value: format!("From {}", format_event_date(starts)),
                impact: "Neutral".to_string(),
                news_topic: "Nifty earnings preview".to_string(),
                news_lookback_days: 7,
            })
        }
        _ => {}
    }

    events
}

pub fn format_event_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

fn next_from_table(table: &'static str, dates: &[NaiveDate], today: NaiveDate) -> Option<NaiveDate> {
    let next = next_scheduled(dates, today);
    if next.is_none() {
        warn!(
            component = "calendar",
            event = "calendar.table.exhausted",
            table,
            today = %today,
            last_entry = ?dates.iter().max()
        );
    }
    next
}

fn push_dated(
    events: &mut Vec<CalendarEvent>,
    calendar: &MacroCalendar,
    today: NaiveDate,
    date: NaiveDate,
    event: &str,
    impact: &str,
    news_topic: &str,
) {
    if !within(calendar, today, date) {
        return;
    }

    let (timeframe, value) = if date == today {
        (Timeframe::Ongoing, "Today".to_string())
    } else {
        (Timeframe::Upcoming, format_event_date(date))
    };

    events.push(CalendarEvent {
        timeframe,
        event: event.to_string(),
        value,
        impact: impact.to_string(),
        news_topic: news_topic.to_string(),
        news_lookback_days: 7,
    });
}

fn within(calendar: &MacroCalendar, today: NaiveDate, date: NaiveDate) -> bool {
    let days = date.signed_duration_since(today).num_days();
    (0..=calendar.horizon_days).contains(&days)
}

fn dates_from_table(table: &[(i32, u32, u32)]) -> Vec<NaiveDate> {
    table
        .iter()
        .filter_map(|(year, month, day)| NaiveDate::from_ymd_opt(*year, *month, *day))
        .collect()
}
