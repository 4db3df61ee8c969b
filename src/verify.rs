//! Source Verification Module
//!
//! Probes the configured detection source and the weather archive to find
//! out whether they are reachable and shaped the way the loader expects,
//! before pointing the reports at them.
//!
//! Run with `birdmon check`; the report prints as JSON.

use std::path::Path;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::columns::{self, Field};
use crate::config::{Config, SourceKind};
use crate::ingest::api::{self, PageFetcher, PageQuery};
use crate::ingest::{postgres, sqlite, weather};
use crate::loader::LoadWindow;
use crate::logging::{self, DataSource};
use crate::model::LoadError;

/// Records requested when sampling the detection API.
const SAMPLE_PAGE_SIZE: usize = 10;
/// The archive lags real time by a few days; probe a day safely in the past.
const WEATHER_PROBE_LAG_DAYS: i64 = 7;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub source: String,
    pub database: Option<DatabaseVerification>,
    pub api: Option<ApiVerification>,
    pub weather: Option<WeatherVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationSummary {
    pub checks: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseVerification {
    /// File path, or "postgres" for a server database.
    pub location: String,
    pub table: String,
    pub status: VerificationStatus,
    pub reachable: bool,
    pub table_readable: bool,
    pub row_count: usize,
    pub required_missing: Vec<String>,
    pub optional_found: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiVerification {
    pub url: String,
    pub status: VerificationStatus,
    pub api_responsive: bool,
    pub sample_record_count: usize,
    pub total_reported: Option<usize>,
    pub required_missing: Vec<String>,
    pub optional_found: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherVerification {
    pub url: String,
    pub status: VerificationStatus,
    pub api_responsive: bool,
    pub hours_returned: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Column checks
// ============================================================================

/// Splits source column names into the required canonical columns that are
/// missing and the optional canonical columns that were recognized.
pub fn check_columns(names: &[String]) -> (Vec<String>, Vec<String>) {
    let mut present: Vec<Field> = names.iter().filter_map(|n| columns::resolve(n)).collect();
    present.sort();
    present.dedup();

    let required = [
        Field::Date,
        Field::Time,
        Field::Timestamp,
        Field::CommonName,
        Field::Confidence,
    ];
    let optional_found = present
        .iter()
        .filter(|f| !required.contains(f))
        .map(|&f| columns::canonical_name(f).to_string())
        .collect();

    (columns::required_missing(&present), optional_found)
}

fn table_status(required_missing: &[String], rows: usize) -> VerificationStatus {
    if !required_missing.is_empty() {
        VerificationStatus::Failed
    } else if rows == 0 {
        VerificationStatus::PartialSuccess
    } else {
        VerificationStatus::Success
    }
}

// ============================================================================
// Database Verification
// ============================================================================

fn database_result(location: &str, table: &str) -> DatabaseVerification {
    DatabaseVerification {
        location: location.to_string(),
        table: table.to_string(),
        status: VerificationStatus::Failed,
        reachable: false,
        table_readable: false,
        row_count: 0,
        required_missing: Vec::new(),
        optional_found: Vec::new(),
        error_message: None,
    }
}

pub fn verify_sqlite(path: &Path, table: &str) -> DatabaseVerification {
    let mut result = database_result(&path.display().to_string(), table);

    let conn = match sqlite::open_read_only(path) {
        Ok(conn) => conn,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };
    result.reachable = true;

    let probe = sqlite::table_columns(&conn, table)
        .and_then(|cols| Ok((cols, sqlite::count_rows(&conn, table)?)));
    finish_database(result, probe)
}

pub fn verify_postgres(url: &str, table: &str) -> DatabaseVerification {
    let mut result = database_result("postgres", table);

    let mut client = match postgres::connect(url) {
        Ok(client) => client,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };
    result.reachable = true;

    let probe = postgres::table_columns(&mut client, table)
        .and_then(|cols| Ok((cols, postgres::count_rows(&mut client, table)?)));
    finish_database(result, probe)
}

fn finish_database(
    mut result: DatabaseVerification,
    probe: Result<(Vec<String>, usize), LoadError>,
) -> DatabaseVerification {
    match probe {
        Ok((cols, rows)) => {
            let (missing, optional) = check_columns(&cols);
            result.table_readable = true;
            result.row_count = rows;
            result.status = table_status(&missing, rows);
            result.required_missing = missing;
            result.optional_found = optional;
        }
        Err(e) => result.error_message = Some(e.to_string()),
    }
    result
}

// ============================================================================
// API Verification
// ============================================================================

/// Requests a single small page for the window ending `today`.
pub fn verify_api(fetcher: &dyn PageFetcher, url: &str, today: NaiveDate, lookback_days: i64) -> ApiVerification {
    let mut result = ApiVerification {
        url: url.to_string(),
        status: VerificationStatus::Failed,
        api_responsive: false,
        sample_record_count: 0,
        total_reported: None,
        required_missing: Vec::new(),
        optional_found: Vec::new(),
        error_message: None,
    };

    let query = PageQuery {
        start: LoadWindow::resolve(None, None, lookback_days, today).start,
        end: today,
        offset: 0,
        limit: SAMPLE_PAGE_SIZE,
    };

    let page = fetcher.fetch_page(&query).and_then(|body| {
        result.api_responsive = true;
        api::parse_page(&body)
    });

    match page {
        Ok(page) => {
            result.sample_record_count = page.records.len();
            result.total_reported = page.total;
            if page.records.is_empty() {
                result.status = VerificationStatus::PartialSuccess;
                return result;
            }
            let table = api::records_to_table(page.records);
            let (missing, optional) = check_columns(&table.columns);
            result.status = table_status(&missing, result.sample_record_count);
            result.required_missing = missing;
            result.optional_found = optional;
        }
        Err(e) => result.error_message = Some(e.to_string()),
    }
    result
}

// ============================================================================
// Weather Verification
// ============================================================================

pub fn verify_weather(config: &Config, today: NaiveDate) -> WeatherVerification {
    let day = today - Duration::days(WEATHER_PROBE_LAG_DAYS);
    let w = &config.weather;
    let mut result = WeatherVerification {
        url: weather::build_archive_url(&w.base_url, w.latitude, w.longitude, day, day),
        status: VerificationStatus::Failed,
        api_responsive: false,
        hours_returned: 0,
        error_message: None,
    };

    let samples = weather::build_client(w.timeout_secs)
        .and_then(|client| weather::fetch_hourly(&client, &w.base_url, w.latitude, w.longitude, day, day));

    match samples {
        Ok(samples) => {
            result.api_responsive = true;
            result.hours_returned = samples.len();
            result.status = if samples.is_empty() {
                VerificationStatus::PartialSuccess
            } else {
                VerificationStatus::Success
            };
        }
        Err(e) => result.error_message = Some(e.to_string()),
    }
    result
}

// ============================================================================
// Full verification
// ============================================================================

fn tally(summary: &mut VerificationSummary, status: VerificationStatus) {
    summary.checks += 1;
    match status {
        VerificationStatus::Failed => summary.failed += 1,
        _ => summary.working += 1,
    }
}

/// Verifies the configured detection source and, when enabled, the weather
/// archive.
pub fn run_full_verification(config: &Config, today: NaiveDate) -> VerificationReport {
    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        source: format!("{:?}", config.source.kind).to_lowercase(),
        database: None,
        api: None,
        weather: None,
        summary: VerificationSummary::default(),
    };

    match config.source.kind {
        SourceKind::Sqlite => {
            let result = verify_sqlite(&config.source.database_file, &config.source.table);
            log_status(DataSource::Database, &result.location, result.status, &result.error_message);
            tally(&mut report.summary, result.status);
            report.database = Some(result);
        }
        SourceKind::Postgres => {
            let result = match config.source.postgres_url.as_deref() {
                Some(url) => verify_postgres(url, &config.source.table),
                None => {
                    let mut r = database_result("postgres", &config.source.table);
                    r.error_message = Some("no PostgreSQL URL configured (set DATABASE_URL)".to_string());
                    r
                }
            };
            log_status(DataSource::Database, &result.location, result.status, &result.error_message);
            tally(&mut report.summary, result.status);
            report.database = Some(result);
        }
        SourceKind::Api => {
            let url = format!(
                "{}/{}",
                config.api.base_url.trim_end_matches('/'),
                config.api.path.trim_start_matches('/')
            );
            let result = match api::HttpPageFetcher::new(&config.api.base_url, &config.api.path, config.api.timeout_secs) {
                Ok(fetcher) => verify_api(&fetcher, &url, today, config.api.lookback_days),
                Err(e) => ApiVerification {
                    url: url.clone(),
                    status: VerificationStatus::Failed,
                    api_responsive: false,
                    sample_record_count: 0,
                    total_reported: None,
                    required_missing: Vec::new(),
                    optional_found: Vec::new(),
                    error_message: Some(e.to_string()),
                },
            };
            log_status(DataSource::Api, &result.url, result.status, &result.error_message);
            tally(&mut report.summary, result.status);
            report.api = Some(result);
        }
        SourceKind::Synthetic => {
            logging::info(DataSource::Synthetic, None, "synthetic source needs no verification");
        }
    }

    if config.weather.enabled {
        let result = verify_weather(config, today);
        log_status(DataSource::Weather, "archive", result.status, &result.error_message);
        tally(&mut report.summary, result.status);
        report.weather = Some(result);
    }

    report
}

fn log_status(source: DataSource, context: &str, status: VerificationStatus, error: &Option<String>) {
    match status {
        VerificationStatus::Success => logging::info(source, Some(context), "OK"),
        VerificationStatus::PartialSuccess => logging::warn(source, Some(context), "reachable but no rows"),
        VerificationStatus::Failed => logging::error(
            source,
            Some(context),
            &format!("FAILED: {}", error.as_deref().unwrap_or("required columns missing")),
        ),
    }
}

pub fn render_summary(report: &VerificationReport) -> String {
    let rate = if report.summary.checks > 0 {
        report.summary.working as f64 / report.summary.checks as f64 * 100.0
    } else {
        0.0
    };
    format!(
        "Verification ({} source): {}/{} checks working ({} failed), {:.1}%",
        report.source, report.summary.working, report.summary.checks, report.summary.failed, rate
    )
}
