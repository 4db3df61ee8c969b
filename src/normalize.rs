//! Raw record normalization.
//!
//! Every source (embedded database, PostgreSQL, detection API, synthetic
//! generator) hands over a `RawTable`: column names as the source spelled
//! them, and loosely typed cell values. This module resolves the columns
//! through the registry, coerces each cell, drops rows that cannot be
//! salvaged and produces the canonical `Dataset`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::columns::{self, Field};
use crate::logging::{self, DataSource};
use crate::model::{ColumnSet, Dataset, Detection, LoadError};

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// A single loosely typed cell value as delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

/// Column names plus row-major cells. Rows shorter than the header are
/// treated as `Null`-padded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        RawTable { columns, rows: Vec::new() }
    }

    pub fn push_row(&mut self, row: Vec<RawValue>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Row accounting for one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub kept: usize,
    pub dropped_confidence: usize,
    pub dropped_timestamp: usize,
    pub dropped_name: usize,
}

impl NormalizeReport {
    pub fn dropped(&self) -> usize {
        self.dropped_confidence + self.dropped_timestamp + self.dropped_name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub dataset: Dataset,
    pub report: NormalizeReport,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Converts a raw table into the canonical dataset.
///
/// Fails only when required columns are missing; individual bad rows are
/// dropped and counted in the report.
pub fn normalize_table(table: RawTable) -> Result<Normalized, LoadError> {
    if table.is_empty() {
        return Ok(Normalized {
            dataset: Dataset::empty(),
            report: NormalizeReport::default(),
        });
    }

    // First source column wins when two aliases resolve to the same field.
    let mut index: HashMap<Field, usize> = HashMap::new();
    for (i, name) in table.columns.iter().enumerate() {
        match columns::resolve(name) {
            Some(field) => {
                index.entry(field).or_insert(i);
            }
            None => logging::debug(
                DataSource::System,
                Some(name.as_str()),
                "ignoring unrecognized column",
            ),
        }
    }

    let present: Vec<Field> = index.keys().copied().collect();
    let missing = columns::required_missing(&present);
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    let mut report = NormalizeReport {
        input_rows: table.rows.len(),
        ..NormalizeReport::default()
    };
    let mut detections = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let cell = |field: Field| cell_for(&index, row, field);

        let Some(confidence) = coerce_confidence(cell(Field::Confidence)) else {
            report.dropped_confidence += 1;
            continue;
        };

        let timestamp = match (index.contains_key(&Field::Date), index.contains_key(&Field::Time)) {
            (true, true) => combine_date_time(cell(Field::Date), cell(Field::Time))
                .or_else(|| coerce_timestamp(cell(Field::Timestamp))),
            _ => coerce_timestamp(cell(Field::Timestamp)),
        };
        let Some(timestamp) = timestamp else {
            report.dropped_timestamp += 1;
            continue;
        };

        let Some(common_name) = coerce_text(cell(Field::CommonName)) else {
            report.dropped_name += 1;
            continue;
        };

        let mut d = Detection::new(timestamp, common_name, confidence);
        d.scientific_name = coerce_text(cell(Field::ScientificName));
        d.source = coerce_text(cell(Field::Source));
        d.verified = coerce_flag(cell(Field::Verified));
        d.locked = coerce_flag(cell(Field::Locked));
        d.is_new_species = coerce_flag(cell(Field::IsNewSpecies));
        d.is_new_this_year = coerce_flag(cell(Field::IsNewThisYear));
        d.is_new_this_season = coerce_flag(cell(Field::IsNewThisSeason));
        d.days_since_first_seen = coerce_number(cell(Field::DaysSinceFirstSeen));
        d.days_this_year = coerce_number(cell(Field::DaysThisYear));
        d.days_this_season = coerce_number(cell(Field::DaysThisSeason));
        d.current_season = coerce_text(cell(Field::CurrentSeason));
        d.temperature_c = coerce_number(cell(Field::Temperature));
        d.precipitation_mm = coerce_number(cell(Field::Precipitation));
        d.cloud_cover_pct = coerce_number(cell(Field::CloudCover));

        detections.push(d);
    }

    report.kept = detections.len();
    if report.dropped() > 0 {
        logging::info(
            DataSource::System,
            None,
            &format!(
                "normalized {}/{} rows ({} bad confidence, {} bad timestamp, {} missing name)",
                report.kept,
                report.input_rows,
                report.dropped_confidence,
                report.dropped_timestamp,
                report.dropped_name
            ),
        );
    }

    let columns: ColumnSet = present.into_iter().collect();
    Ok(Normalized {
        dataset: Dataset::new(detections, columns),
        report,
    })
}

static NULL_CELL: RawValue = RawValue::Null;

fn cell_for<'a>(index: &HashMap<Field, usize>, row: &'a [RawValue], field: Field) -> &'a RawValue {
    index
        .get(&field)
        .and_then(|&i| row.get(i))
        .unwrap_or(&NULL_CELL)
}

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

/// Numeric value of a cell, or `None` for anything non-numeric or NaN.
pub fn coerce_number(value: &RawValue) -> Option<f64> {
    let n = match value {
        RawValue::Int(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.is_finite() { Some(n) } else { None }
}

/// Confidence in `0.0..=1.0`. Values in `(1, 100]` are read as percentages.
pub fn coerce_confidence(value: &RawValue) -> Option<f64> {
    let mut c = coerce_number(value)?;
    if c > 1.0 && c <= 100.0 {
        c /= 100.0;
    }
    if (0.0..=1.0).contains(&c) { Some(c) } else { None }
}

/// Truthiness the way the detection exports encode it: `true`, `1` and `yes`
/// (any case, surrounding whitespace ignored). Everything else is false.
pub fn coerce_flag(value: &RawValue) -> bool {
    match value {
        RawValue::Bool(b) => *b,
        RawValue::Int(i) => *i == 1,
        RawValue::Float(f) => *f == 1.0,
        RawValue::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

/// Trimmed non-empty text. Numbers are rendered so numeric codes survive.
pub fn coerce_text(value: &RawValue) -> Option<String> {
    let s = match value {
        RawValue::Text(s) => s.trim().to_string(),
        RawValue::Int(i) => i.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

fn coerce_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Date(d) => Some(*d),
        RawValue::DateTime(dt) => Some(dt.date()),
        RawValue::Text(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .or_else(|| parse_datetime_text(s).map(|dt| dt.date()))
        }
        _ => None,
    }
}

fn coerce_time(value: &RawValue) -> Option<NaiveTime> {
    match value {
        RawValue::Time(t) => Some(*t),
        RawValue::DateTime(dt) => Some(dt.time()),
        RawValue::Text(s) => {
            let s = s.trim();
            TIME_FORMATS.iter().find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        }
        _ => None,
    }
}

/// Joins separate date and time cells into one timestamp.
pub fn combine_date_time(date: &RawValue, time: &RawValue) -> Option<NaiveDateTime> {
    Some(coerce_date(date)?.and_time(coerce_time(time)?))
}

/// Parses a single timestamp cell: typed values, RFC 3339, naive ISO
/// variants or epoch numbers.
pub fn coerce_timestamp(value: &RawValue) -> Option<NaiveDateTime> {
    match value {
        RawValue::DateTime(dt) => Some(*dt),
        RawValue::Date(d) => d.and_hms_opt(0, 0, 0),
        RawValue::Int(i) => from_epoch(*i as f64),
        RawValue::Float(f) => from_epoch(*f),
        RawValue::Text(s) => {
            let s = s.trim();
            if let Some(dt) = parse_datetime_text(s) {
                return Some(dt);
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        _ => None,
    }
}

fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Epoch seconds below 1e11, milliseconds above. Interpreted as UTC.
fn from_epoch(n: f64) -> Option<NaiveDateTime> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let millis = if n < 1e11 { n * 1000.0 } else { n };
    DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
