/// Embedded detections database reader.
///
/// Reads a detections table from a local SQLite file, opened read-only.
/// Columns are read dynamically: whatever the recorder wrote comes through
/// as a `RawTable` and the normalizer sorts out names and types.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::ingest::select_statement;
use crate::logging::{self, DataSource};
use crate::model::LoadError;
use crate::normalize::{RawTable, RawValue};

/// Opens the database file read-only. A missing file is reported as
/// `DatabaseNotFound` rather than letting SQLite create an empty one.
pub fn open_read_only(path: &Path) -> Result<Connection, LoadError> {
    if !path.exists() {
        return Err(LoadError::DatabaseNotFound(path.display().to_string()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Reads every row of `table` (or the result of `query`) from the file.
pub fn read_detections(path: &Path, table: &str, query: Option<&str>) -> Result<RawTable, LoadError> {
    let conn = open_read_only(path)?;
    let sql = select_statement(table, query)?;
    let raw = read_query(&conn, &sql)?;

    logging::info(
        DataSource::Database,
        Some(path.display().to_string().as_str()),
        &format!("read {} rows, {} columns", raw.rows.len(), raw.columns.len()),
    );
    Ok(raw)
}

/// Runs `sql` and collects the result set as a raw table.
pub fn read_query(conn: &Connection, sql: &str) -> Result<RawTable, LoadError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut table = RawTable::new(columns);
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(to_raw(row.get_ref(i)?));
        }
        table.push_row(cells);
    }
    Ok(table)
}

/// Lists the column names of `table` without reading rows.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, LoadError> {
    let sql = select_statement(table, None)?;
    let stmt = conn.prepare(&sql)?;
    Ok(stmt.column_names().into_iter().map(String::from).collect())
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<usize, LoadError> {
    let sql = select_statement(table, None)?.replacen("SELECT *", "SELECT COUNT(*)", 1);
    let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(n.max(0) as usize)
}

fn to_raw(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Int(i),
        ValueRef::Real(f) => RawValue::Float(f),
        ValueRef::Text(bytes) => RawValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        // Audio clips and thumbnails; nothing to normalize.
        ValueRef::Blob(_) => RawValue::Null,
    }
}
