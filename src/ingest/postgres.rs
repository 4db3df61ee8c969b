/// PostgreSQL detections reader.
///
/// Some recorders log into a shared PostgreSQL server instead of a local
/// file. The same detections table is read, column types are mapped to
/// `RawValue` from the server's type metadata.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use postgres::types::Type;
use postgres::{Client, NoTls, Row};

use crate::ingest::select_statement;
use crate::logging::{self, DataSource};
use crate::model::LoadError;
use crate::normalize::{RawTable, RawValue};

pub fn connect(url: &str) -> Result<Client, LoadError> {
    Ok(Client::connect(url, NoTls)?)
}

/// Reads every row of `table` (or the result of `query`) from the server.
pub fn read_detections(url: &str, table: &str, query: Option<&str>) -> Result<RawTable, LoadError> {
    let mut client = connect(url)?;
    let sql = select_statement(table, query)?;
    let rows = client.query(sql.as_str(), &[])?;
    let raw = rows_to_table(&rows)?;

    logging::info(
        DataSource::Database,
        Some("postgres"),
        &format!("read {} rows, {} columns", raw.rows.len(), raw.columns.len()),
    );
    Ok(raw)
}

/// Lists the column names of `table` from the prepared statement, without
/// reading rows.
pub fn table_columns(client: &mut Client, table: &str) -> Result<Vec<String>, LoadError> {
    let sql = select_statement(table, None)?;
    let stmt = client.prepare(sql.as_str())?;
    Ok(stmt.columns().iter().map(|c| c.name().to_string()).collect())
}

pub fn count_rows(client: &mut Client, table: &str) -> Result<usize, LoadError> {
    let sql = select_statement(table, None)?.replacen("SELECT *", "SELECT COUNT(*)", 1);
    let n: i64 = client.query_one(sql.as_str(), &[])?.try_get(0)?;
    Ok(n.max(0) as usize)
}

fn rows_to_table(rows: &[Row]) -> Result<RawTable, LoadError> {
    let Some(first) = rows.first() else {
        return Ok(RawTable::default());
    };
    let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();

    let mut table = RawTable::new(columns);
    for row in rows {
        let mut cells = Vec::with_capacity(row.len());
        for (i, column) in row.columns().iter().enumerate() {
            cells.push(cell(row, i, column.type_())?);
        }
        table.push_row(cells);
    }
    Ok(table)
}

/// `timestamptz` keeps only the instant; render it on the host's clock so
/// it reads like the recorder's own `timestamp` columns.
fn wall_clock<Tz: TimeZone>(instant: DateTime<Utc>, zone: &Tz) -> NaiveDateTime {
    instant.with_timezone(zone).naive_local()
}

/// Reads one cell by its declared type. Types the normalizer has no use
/// for (numeric, json, arrays, bytea) come through as `Null`.
fn cell(row: &Row, i: usize, ty: &Type) -> Result<RawValue, LoadError> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(i)?.map(RawValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(i)?.map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(i)?.map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(i)?.map(RawValue::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(i)?.map(|v| RawValue::Float(v.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(i)?.map(RawValue::Float)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        row.try_get::<_, Option<String>>(i)?.map(RawValue::Text)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(i)?.map(RawValue::Date)
    } else if *ty == Type::TIME {
        row.try_get::<_, Option<NaiveTime>>(i)?.map(RawValue::Time)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(i)?.map(RawValue::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(i)?
            .map(|dt| RawValue::DateTime(wall_clock(dt, &Local)))
    } else {
        logging::debug(
            DataSource::Database,
            Some(row.columns()[i].name()),
            &format!("unsupported column type {}, reading as null", ty),
        );
        None
    };
    Ok(value.unwrap_or(RawValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_timestamptz_reads_as_wall_clock() {
        let instant = "2024-05-01T11:15:00Z".parse::<DateTime<Utc>>().unwrap();
        let central = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(wall_clock(instant, &central).to_string(), "2024-05-01 06:15:00");
        assert_eq!(wall_clock(instant, &Utc), instant.naive_utc());
    }
}
