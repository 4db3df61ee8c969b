/// Core data types for the backyard bird monitoring tool.
///
/// This module defines the shared domain model imported by all other modules.
/// A `Detection` is one bird-identification event after normalization; a
/// `Dataset` is the flat table the analysis layer works on, together with the
/// set of columns the source actually provided.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::columns::Field;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A single normalized detection.
///
/// Calendar fields are derived once from `timestamp` when the record is
/// built and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Wall-clock time of the recorder. Source offsets are dropped.
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,
    pub hour: u32,
    pub weekday: Weekday,
    pub iso_week: u32,

    pub common_name: String,
    pub scientific_name: Option<String>,
    /// Always within `0.0..=1.0`.
    pub confidence: f64,
    pub source: Option<String>,

    pub verified: bool,
    pub locked: bool,
    pub is_new_species: bool,
    pub is_new_this_year: bool,
    pub is_new_this_season: bool,

    pub days_since_first_seen: Option<f64>,
    pub days_this_year: Option<f64>,
    pub days_this_season: Option<f64>,
    pub current_season: Option<String>,

    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
}

impl Detection {
    /// Builds a detection with every optional attribute unset.
    pub fn new(timestamp: NaiveDateTime, common_name: impl Into<String>, confidence: f64) -> Self {
        Detection {
            timestamp,
            date: timestamp.date(),
            hour: timestamp.hour(),
            weekday: timestamp.weekday(),
            iso_week: timestamp.iso_week().week(),
            common_name: common_name.into(),
            scientific_name: None,
            confidence,
            source: None,
            verified: false,
            locked: false,
            is_new_species: false,
            is_new_this_year: false,
            is_new_this_season: false,
            days_since_first_seen: None,
            days_this_year: None,
            days_this_season: None,
            current_season: None,
            temperature_c: None,
            precipitation_mm: None,
            cloud_cover_pct: None,
        }
    }

    /// Full English weekday name, e.g. "Monday".
    pub fn day_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }

    /// Start of the hour this detection falls in.
    pub fn hour_bucket(&self) -> NaiveDateTime {
        self.date.and_hms_opt(self.hour, 0, 0).unwrap_or(self.timestamp)
    }

    pub fn has_weather(&self) -> bool {
        self.temperature_c.is_some() || self.precipitation_mm.is_some() || self.cloud_cover_pct.is_some()
    }
}

/// Weekdays in display order, Monday first.
pub const WEEK_ORDER: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Canonical columns present in the source a dataset was loaded from.
pub type ColumnSet = BTreeSet<Field>;

/// Normalized detections plus the columns that were present at load time.
///
/// Column presence matters independently of values: a source without a
/// `verified` column is reported differently from one where nothing is
/// verified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub detections: Vec<Detection>,
    pub columns: ColumnSet,
}

impl Dataset {
    pub fn new(detections: Vec<Detection>, columns: ColumnSet) -> Self {
        Dataset { detections, columns }
    }

    pub fn empty() -> Self {
        Dataset::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn has(&self, field: Field) -> bool {
        self.columns.contains(&field)
    }

    /// Sorted, de-duplicated common names.
    pub fn species_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.detections.iter().map(|d| d.common_name.as_str()).collect();
        names.into_iter().map(String::from).collect()
    }

    /// Earliest and latest detection date, or `None` when empty.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.detections.iter().map(|d| d.date).min()?;
        let max = self.detections.iter().map(|d| d.date).max()?;
        Some((min, max))
    }

    /// A new dataset holding only the detections matching `keep`, with the
    /// same column presence.
    pub fn subset<F>(&self, keep: F) -> Dataset
    where
        F: Fn(&Detection) -> bool,
    {
        Dataset {
            detections: self.detections.iter().filter(|d| keep(d)).cloned().collect(),
            columns: self.columns.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while loading detections from any source.
#[derive(Debug, PartialEq)]
pub enum LoadError {
    /// The embedded database file does not exist.
    DatabaseNotFound(String),
    /// The database driver reported a failure.
    Database(String),
    /// Non-2xx HTTP response from the detection or weather API.
    HttpError(u16),
    /// The request could not be sent or the body could not be read.
    Network(String),
    /// A response body or value could not be interpreted.
    ParseError(String),
    /// Required canonical columns were not found among the source columns.
    MissingColumns(Vec<String>),
    /// The configured table name or query is not usable.
    InvalidQuery(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::DatabaseNotFound(path) => write!(f, "Database file '{}' not found", path),
            LoadError::Database(msg) => write!(f, "Database error: {}", msg),
            LoadError::HttpError(code) => write!(f, "HTTP error: {}", code),
            LoadError::Network(msg) => write!(f, "Network error: {}", msg),
            LoadError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LoadError::MissingColumns(cols) => {
                write!(f, "Missing required columns: {}", cols.join(", "))
            }
            LoadError::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        LoadError::Database(err.to_string())
    }
}

impl From<postgres::Error> for LoadError {
    fn from(err: postgres::Error) -> Self {
        LoadError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => LoadError::HttpError(status.as_u16()),
            None => LoadError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_detection_derives_calendar_fields() {
        // 2024-05-01 was a Wednesday in ISO week 18.
        let d = Detection::new(at("2024-05-01 06:45:10"), "American Robin", 0.91);
        assert_eq!(d.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(d.hour, 6);
        assert_eq!(d.weekday, Weekday::Wed);
        assert_eq!(d.day_name(), "Wednesday");
        assert_eq!(d.iso_week, 18);
        assert_eq!(d.hour_bucket(), at("2024-05-01 06:00:00"));
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2021-01-01 belongs to ISO week 53 of 2020.
        let d = Detection::new(at("2021-01-01 12:00:00"), "Blue Jay", 0.8);
        assert_eq!(d.iso_week, 53);
    }

    #[test]
    fn test_dataset_species_and_bounds() {
        let ds = Dataset::new(
            vec![
                Detection::new(at("2024-05-03 07:00:00"), "Northern Cardinal", 0.9),
                Detection::new(at("2024-05-01 07:00:00"), "American Robin", 0.8),
                Detection::new(at("2024-05-02 07:00:00"), "Northern Cardinal", 0.7),
            ],
            ColumnSet::new(),
        );
        assert_eq!(ds.species_names(), vec!["American Robin", "Northern Cardinal"]);
        let (min, max) = ds.date_bounds().unwrap();
        assert_eq!(min, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(max, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert!(Dataset::empty().date_bounds().is_none());
    }

    #[test]
    fn test_subset_keeps_column_presence() {
        let mut cols = ColumnSet::new();
        cols.insert(Field::Verified);
        let ds = Dataset::new(
            vec![Detection::new(at("2024-05-01 07:00:00"), "American Robin", 0.4)],
            cols,
        );
        let sub = ds.subset(|d| d.confidence > 0.5);
        assert!(sub.is_empty());
        assert!(sub.has(Field::Verified));
    }

    #[test]
    fn test_load_error_display() {
        assert_eq!(LoadError::HttpError(503).to_string(), "HTTP error: 503");
        assert_eq!(
            LoadError::MissingColumns(vec!["common_name".into(), "confidence".into()]).to_string(),
            "Missing required columns: common_name, confidence"
        );
    }
}
