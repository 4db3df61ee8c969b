/// Detection and weather sources.
///
/// Every detection source produces a `normalize::RawTable`; the loader
/// normalizes it and attaches weather. Submodules:
/// - `sqlite`    — embedded detections database file.
/// - `postgres`  — detections table on a PostgreSQL server.
/// - `api`       — paginated HTTP detection API.
/// - `weather`   — hourly weather archive lookups and the join.
/// - `synthetic` — seeded demo data used as a fallback.

pub mod api;
pub mod postgres;
pub mod sqlite;
pub mod synthetic;
pub mod weather;

use crate::config::is_identifier;
use crate::model::LoadError;

/// The statement a database source runs: the configured query, or every
/// column of `table`.
pub fn select_statement(table: &str, query: Option<&str>) -> Result<String, LoadError> {
    if let Some(q) = query {
        let q = q.trim();
        if q.is_empty() {
            return Err(LoadError::InvalidQuery("configured query is empty".into()));
        }
        return Ok(q.to_string());
    }
    if !is_identifier(table) {
        return Err(LoadError::InvalidQuery(format!(
            "table name '{}' must be a plain identifier",
            table
        )));
    }
    Ok(format!("SELECT * FROM {}", table))
}
