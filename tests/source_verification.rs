/// Source verification tests
///
/// Runs the `check` diagnostics against configured sources and confirms
/// the JSON report reflects what was found.
///
/// The PostgreSQL test is #[ignore]d: it needs DATABASE_URL pointing at a
/// server with a detections table.
///
/// Run with: cargo test --test source_verification -- --include-ignored

use birdmon::config::{Config, SourceKind};
use birdmon::loader::{self, DataOrigin, LoadWindow};
use birdmon::verify::{self, VerificationStatus};

use chrono::NaiveDate;
use rusqlite::Connection;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
}

fn offline_config() -> Config {
    let mut config = Config::default();
    config.weather.enabled = false;
    config
}

#[test]
fn test_check_reports_working_sqlite_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("birds.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE notes (Date TEXT, Time TEXT, Com_Name TEXT, Confidence REAL, Locked INTEGER);
         INSERT INTO notes VALUES ('2024-05-01', '06:00:00', 'Blue Jay', 0.9, 0);
         INSERT INTO notes VALUES ('2024-05-01', '07:00:00', 'Wood Duck', 0.8, 1);",
    )
    .unwrap();
    drop(conn);

    let mut config = offline_config();
    config.source.kind = SourceKind::Sqlite;
    config.source.database_file = path;
    config.source.table = "notes".to_string();

    let report = verify::run_full_verification(&config, today());
    let db = report.database.as_ref().unwrap();
    assert_eq!(db.status, VerificationStatus::Success);
    assert_eq!(db.row_count, 2);
    assert_eq!(db.optional_found, vec!["locked"]);
    assert_eq!(report.summary.working, 1);
    assert_eq!(report.summary.failed, 0);

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["database"]["status"], "Success");
    assert_eq!(json["source"], "sqlite");
}

#[test]
fn test_check_reports_missing_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("birds.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE detections (Com_Name TEXT, Sci_Name TEXT);").unwrap();
    drop(conn);

    let mut config = offline_config();
    config.source.database_file = path;

    let report = verify::run_full_verification(&config, today());
    let db = report.database.unwrap();
    assert_eq!(db.status, VerificationStatus::Failed);
    assert!(db.table_readable);
    assert_eq!(db.required_missing, vec!["confidence", "date", "time"]);
    assert_eq!(report.summary.failed, 1);
}

#[test]
fn test_check_and_load_agree_on_missing_file() {
    let mut config = offline_config();
    config.source.database_file = "/nonexistent/birds.db".into();

    let report = verify::run_full_verification(&config, today());
    assert!(!report.database.unwrap().reachable);

    let outcome = loader::load(&config, LoadWindow::resolve(None, None, 30, today()));
    assert_eq!(outcome.origin, DataOrigin::Synthetic);
}

#[test]
#[ignore]
fn test_live_postgres_detections_table() {
    dotenv::dotenv().ok();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let mut config = offline_config();
    config.source.kind = SourceKind::Postgres;
    config.source.postgres_url = Some(url);

    let report = verify::run_full_verification(&config, today());
    let db = report.database.unwrap();
    assert!(db.reachable, "{:?}", db.error_message);
    assert!(db.table_readable, "{:?}", db.error_message);
    assert!(db.required_missing.is_empty(), "missing: {:?}", db.required_missing);
}
