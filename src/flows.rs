//! FII/DII institutional net flows from the exchange CSV export.

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::http::{FetchError, HttpFetcher};

pub const DEFAULT_FLOWS_URL: &str = "https://archives.nseindia.com/content/equities/FIIDII.csv";

/// Header search stops after this many leading lines.
const MAX_PREAMBLE_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub date: String,
    pub fii_net_cr: f64,
    pub dii_net_cr: f64,
}

pub fn fetch_institutional_flows(http: &dyn HttpFetcher, url: &str) -> Result<FlowSnapshot, FetchError> {
    let payload = http.get_bytes(url)?;
    parse_flow_csv(&payload)
}

/// Accepts both the wide layout (`Date, FII Net (Cr.), DII Net (Cr.)`) and the
/// long layout (`Category, Date, ..., Net Value` with one row per institution).
pub fn parse_flow_csv(payload: &[u8]) -> Result<FlowSnapshot, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(payload);

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| FetchError::parse("flow csv", err))?;
        if record.iter().any(|cell| !cell.is_empty()) {
            records.push(record);
        }
    }

    let header_idx = records
        .iter()
        .take(MAX_PREAMBLE_LINES)
        .position(|record| find_column(record, |cell| cell == "date").is_some())
        .ok_or_else(|| FetchError::parse("flow csv", "no header row with a Date column"))?;
    let header = &records[header_idx];
    let rows = &records[header_idx + 1..];
    if rows.is_empty() {
        return Err(FetchError::insufficient("flow csv has no data rows"));
    }

    let date_col = find_column(header, |cell| cell == "date")
        .ok_or_else(|| FetchError::parse("flow csv", "missing Date column"))?;

    let fii_col = find_column(header, |cell| cell.contains("fii") && cell.contains("net"));
    let dii_col = find_column(header, |cell| cell.contains("dii") && cell.contains("net"));
    if let (Some(fii_col), Some(dii_col)) = (fii_col, dii_col) {
        let row = &rows[0];
        return Ok(FlowSnapshot {
            date: cell(row, date_col).to_string(),
            fii_net_cr: parse_amount(cell(row, fii_col))?,
            dii_net_cr: parse_amount(cell(row, dii_col))?,
        });
    }

    let category_col = find_column(header, |cell| cell.contains("category"))
        .ok_or_else(|| FetchError::parse("flow csv", "no FII/DII net columns or category column"))?;
    let net_col = find_column(header, |cell| cell.contains("net"))
        .ok_or_else(|| FetchError::parse("flow csv", "missing net value column"))?;

    let fii_row = find_row(rows, category_col, |label| label.contains("fii") || label.contains("fpi"))
        .ok_or_else(|| FetchError::parse("flow csv", "no FII row"))?;
    let dii_row = find_row(rows, category_col, |label| label.contains("dii"))
        .ok_or_else(|| FetchError::parse("flow csv", "no DII row"))?;

    Ok(FlowSnapshot {
        date: cell(fii_row, date_col).to_string(),
        fii_net_cr: parse_amount(cell(fii_row, net_col))?,
        dii_net_cr: parse_amount(cell(dii_row, net_col))?,
    })
}

/// Parses `"1,234.50"`, `"₹ -1,234"` and similar.
pub fn parse_amount(raw: &str) -> Result<f64, FetchError> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.'))
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| FetchError::parse("flow amount", format!("'{raw}'")))
}

/// `₹-1,234 Cr`
pub fn format_crore(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if rounded < 0 { "-" } else { "" };
    format!("₹{sign}{grouped} Cr")
}

pub fn flow_impact(net_cr: f64) -> &'static str {
    if net_cr > 0.0 {
        "Positive"
    } else if net_cr < 0.0 {
        "Negative"
    } else {
        "Neutral"
    }
}

fn find_column(record: &StringRecord, predicate: impl Fn(&str) -> bool) -> Option<usize> {
    record
        .iter()
        .position(|cell| predicate(&cell.to_ascii_lowercase()))
}

fn find_row<'a>(
    rows: &'a [StringRecord],
    column: usize,
    predicate: impl Fn(&str) -> bool,
) -> Option<&'a StringRecord> {
    rows.iter()
        .find(|row| predicate(&cell(row, column).to_ascii_lowercase()))
}

fn cell(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or_default()
}
