//! Market-driver table: record model and the persisted CSV form.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TABLE_HEADERS: [&str; 5] = ["Timeframe", "Event", "Value", "Impact", "Details"];
pub const META_EVENT: &str = "Last Updated";

/// Display bucket a driver belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Timeframe {
    OneDay,
    SevenDay,
    ThirtyDay,
    Upcoming,
    Ongoing,
    Meta,
    /// Anything a foreign writer put in the column; kept verbatim.
    Other(String),
}

impl Timeframe {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OneDay => "1-Day",
            Self::SevenDay => "7-Day",
            Self::ThirtyDay => "30-Day",
            Self::Upcoming => "Upcoming",
            Self::Ongoing => "Ongoing",
            Self::Meta => "Meta",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1-Day" => Self::OneDay,
            "7-Day" => Self::SevenDay,
            "30-Day" => Self::ThirtyDay,
            "Upcoming" => Self::Upcoming,
            "Ongoing" => Self::Ongoing,
            "Meta" => Self::Meta,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Timeframe {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Timeframe> for String {
    fn from(timeframe: Timeframe) -> Self {
        timeframe.as_str().to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the dashboard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRecord {
    #[serde(rename = "Timeframe")]
    pub timeframe: Timeframe,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Impact")]
    pub impact: String,
    /// `headline|url|date` triples joined by `|||`, or a no-news sentinel.
    #[serde(rename = "Details", default)]
    pub details: String,
}

impl DriverRecord {
    pub fn new(
        timeframe: Timeframe,
        event: impl Into<String>,
        value: impl Into<String>,
        impact: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timeframe,
            event: event.into(),
            value: value.into(),
            impact: impact.into(),
            details: details.into(),
        }
    }

    pub fn meta(completed_at: impl Into<String>) -> Self {
        Self::new(Timeframe::Meta, META_EVENT, completed_at, "", "")
    }

    pub fn is_meta(&self) -> bool {
        self.timeframe == Timeframe::Meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverTable {
    pub rows: Vec<DriverRecord>,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("table has no driver rows")]
    Empty,
    #[error("invalid output path: {0}")]
    InvalidPath(String),
}

impl DriverTable {
    pub fn new(rows: Vec<DriverRecord>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build completion timestamp carried by the `Meta` row.
    pub fn last_updated(&self) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.is_meta() && row.event == META_EVENT)
            .map(|row| row.value.as_str())
    }

    pub fn without_meta(&self) -> DriverTable {
        DriverTable {
            rows: self
                .rows
                .iter()
                .filter(|row| !row.is_meta())
                .cloned()
                .collect(),
        }
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.rows.is_empty() {
            writer.write_record(TABLE_HEADERS)?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer
            .into_inner()
            .map_err(|err| TableError::Io(err.into_error()))
    }

    pub fn from_csv_slice(bytes: &[u8]) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.deserialize::<DriverRecord>() {
            rows.push(record?);
        }

        if rows.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(Self { rows })
    }
}

pub fn read_table(path: &Path) -> Result<DriverTable, TableError> {
    let bytes = fs::read(path)?;
    DriverTable::from_csv_slice(&bytes)
}

/// Replaces the file at `path` in full; readers see the old or the new file, never a mix.
pub fn write_table(path: &Path, table: &DriverTable) -> Result<(), TableError> {
    let bytes = table.to_csv_bytes()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_atomic(path, &bytes)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TableError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| TableError::InvalidPath(path.display().to_string()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_table() -> DriverTable {
        DriverTable::new(vec![
            DriverRecord::new(
                Timeframe::OneDay,
                "US Market (S&P500)",
                "+0.45%",
                "Bullish",
                "Stocks rally|http://a|Dec 01",
            ),
            DriverRecord::new(Timeframe::SevenDay, "Weekly Expiry", "Thu 18 Dec", "Volatile", ""),
            DriverRecord::meta("2025-12-15 10:30:00"),
        ])
    }

    #[test]
    fn timeframe_labels_round_trip_and_keep_unknown_values() {
        for label in ["1-Day", "7-Day", "30-Day", "Upcoming", "Ongoing", "Meta"] {
            assert_eq!(Timeframe::parse(label).as_str(), label);
        }
        assert_eq!(
            Timeframe::parse("Quarterly"),
            Timeframe::Other("Quarterly".to_string())
        );
    }

    #[test]
    fn csv_header_order_is_fixed() {
        let bytes = sample_table().to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Timeframe,Event,Value,Impact,Details\n"));
    }

    #[test]
    fn reader_tolerates_extra_and_missing_columns() {
        let csv = "Timeframe,Event,Value,Impact,Source\n1-Day,Crude Oil,-1.20%,Positive,yahoo\nMeta,Last Updated,2025-12-15 10:00:00,,\n";
        let table = DriverTable::from_csv_slice(csv.as_bytes()).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].details, "");
        assert_eq!(table.rows[0].impact, "Positive");
        assert_eq!(table.last_updated(), Some("2025-12-15 10:00:00"));
    }

    #[test]
    fn header_only_or_schema_broken_files_are_errors() {
        let empty = "Timeframe,Event,Value,Impact,Details\n";
        assert!(matches!(
            DriverTable::from_csv_slice(empty.as_bytes()),
            Err(TableError::Empty)
        ));

        let broken = "foo,bar\n1,2\n";
        assert!(matches!(
            DriverTable::from_csv_slice(broken.as_bytes()),
            Err(TableError::Csv(_))
        ));
    }

    #[test]
    fn write_replaces_previous_file_in_full() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested/dashboard_data.csv");

        write_table(&path, &sample_table()).unwrap();
        let smaller = DriverTable::new(vec![DriverRecord::meta("2025-12-16 09:00:00")]);
        write_table(&path, &smaller).unwrap();

        let reread = read_table(&path).unwrap();
        assert_eq!(reread, smaller);
        assert!(!path.with_file_name("dashboard_data.csv.tmp").exists());
    }

    #[test]
    fn without_meta_drops_only_meta_rows() {
        let table = sample_table().without_meta();
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|row| !row.is_meta()));
        assert_eq!(table.last_updated(), None);
    }
}
