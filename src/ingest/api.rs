/// Detection API client
///
/// Retrieves detections from a recorder's HTTP API, one page at a time:
///
///   GET {base_url}{path}?start=YYYY-MM-DD&end=YYYY-MM-DD&offset=N&limit=M
///
/// The response is either a bare JSON array of detection objects or an
/// object wrapping the array (`data`, `detections`, `results` or `items`),
/// optionally with a `total` count. Pages are requested until the server
/// runs out of records. There is no retry: a failed page fails the load.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::logging::{self, DataSource};
use crate::model::LoadError;
use crate::normalize::{RawTable, RawValue};

/// Keys a wrapped response may keep its records under, in lookup order.
const RECORD_KEYS: &[&str] = &["data", "detections", "results", "items"];

// ============================================================================
// Page requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub offset: usize,
    pub limit: usize,
}

/// Fetches the raw body of one page. Implemented over HTTP for real use;
/// tests substitute canned pages.
pub trait PageFetcher {
    fn fetch_page(&self, query: &PageQuery) -> Result<String, LoadError>;
}

/// Builds the URL for one page of detections.
pub fn build_page_url(base_url: &str, path: &str, query: &PageQuery) -> String {
    format!(
        "{}/{}?start={}&end={}&offset={}&limit={}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/'),
        query.start.format("%Y-%m-%d"),
        query.end.format("%Y-%m-%d"),
        query.offset,
        query.limit
    )
}

pub struct HttpPageFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    path: String,
}

impl HttpPageFetcher {
    pub fn new(base_url: &str, path: &str, timeout_secs: u64) -> Result<Self, LoadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(HttpPageFetcher {
            client,
            base_url: base_url.to_string(),
            path: path.to_string(),
        })
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_page(&self, query: &PageQuery) -> Result<String, LoadError> {
        let url = build_page_url(&self.base_url, &self.path, query);
        logging::debug(DataSource::Api, Some(url.as_str()), "requesting page");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(LoadError::HttpError(response.status().as_u16()));
        }
        Ok(response.text()?)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// One parsed page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Map<String, Value>>,
    pub total: Option<usize>,
}

/// Parses a page body. Non-object entries in the record array are skipped.
pub fn parse_page(body: &str) -> Result<Page, LoadError> {
    let value: Value = serde_json::from_str(body)?;

    let (array, total) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut obj) => {
            let total = obj.get("total").and_then(Value::as_u64).map(|t| t as usize);
            let items = RECORD_KEYS
                .iter()
                .find_map(|key| match obj.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    LoadError::ParseError(format!(
                        "response object has no record array (expected one of: {})",
                        RECORD_KEYS.join(", ")
                    ))
                })?;
            (items, total)
        }
        other => {
            return Err(LoadError::ParseError(format!(
                "expected a JSON array or object, got {}",
                json_kind(&other)
            )));
        }
    };

    let records = array
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(obj),
            _ => None,
        })
        .collect();

    Ok(Page { records, total })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages: usize,
    pub records: usize,
    /// The page limit stopped the loop before the server ran out of data.
    pub truncated: bool,
}

/// Requests pages until one comes back empty or short, the reported total
/// is reached, or `max_pages` pages have been read.
pub fn fetch_all(
    fetcher: &dyn PageFetcher,
    start: NaiveDate,
    end: NaiveDate,
    page_size: usize,
    max_pages: usize,
) -> Result<(RawTable, FetchSummary), LoadError> {
    let limit = page_size.max(1);
    let mut records = Vec::new();
    let mut summary = FetchSummary::default();
    let mut offset = 0;

    loop {
        if summary.pages >= max_pages {
            summary.truncated = true;
            break;
        }

        let query = PageQuery { start, end, offset, limit };
        let body = fetcher.fetch_page(&query)?;
        let page = parse_page(&body)?;
        summary.pages += 1;

        let received = page.records.len();
        records.extend(page.records);
        offset += received;

        logging::debug(
            DataSource::Api,
            Some(format!("page {}", summary.pages).as_str()),
            &format!("{} records (offset now {})", received, offset),
        );

        if received == 0 || received < limit {
            break;
        }
        if let Some(total) = page.total {
            if offset >= total {
                break;
            }
        }
    }

    summary.records = records.len();
    logging::log_pagination_summary(summary.pages, summary.records, summary.truncated);
    Ok((records_to_table(records), summary))
}

// ============================================================================
// Records → table
// ============================================================================

/// Lays detection objects out as a table. Columns appear in first-seen
/// order; records lacking a column get `Null`.
///
/// Nested objects (e.g. a `weather` block) contribute their child keys,
/// unless the record already has a top-level key of the same name.
pub fn records_to_table(records: Vec<Map<String, Value>>) -> RawTable {
    let flattened: Vec<Vec<(String, Value)>> = records.into_iter().map(flatten_record).collect();

    let mut columns: Vec<String> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for record in &flattened {
        for (key, _) in record {
            if !position.contains_key(key) {
                position.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let mut table = RawTable::new(columns);
    for record in flattened {
        let mut row = vec![RawValue::Null; table.columns.len()];
        for (key, value) in record {
            if let Some(&i) = position.get(&key) {
                row[i] = json_to_raw(&value);
            }
        }
        table.push_row(row);
    }
    table
}

fn flatten_record(record: Map<String, Value>) -> Vec<(String, Value)> {
    let mut fields: Vec<(String, Value)> = Vec::new();
    let mut nested: Vec<Map<String, Value>> = Vec::new();

    for (key, value) in record {
        match value {
            Value::Object(child) => nested.push(child),
            other => fields.push((key, other)),
        }
    }
    for child in nested {
        for (key, value) in child {
            if !fields.iter().any(|(k, _)| *k == key) {
                fields.push((key, value));
            }
        }
    }
    fields
}

fn json_to_raw(value: &Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => RawValue::Int(i),
            None => n.as_f64().map(RawValue::Float).unwrap_or(RawValue::Null),
        },
        Value::String(s) => RawValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => RawValue::Null,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    /// Serves `records` in offset/limit slices, optionally wrapped with a
    /// total, and remembers every query it saw.
    struct CannedApi {
        records: Vec<Value>,
        wrapped: bool,
        queries: RefCell<Vec<PageQuery>>,
    }

    impl CannedApi {
        fn new(n: usize, wrapped: bool) -> Self {
            let records = (0..n)
                .map(|i| {
                    json!({
                        "date": "2024-05-01",
                        "time": format!("06:{:02}:00", i % 60),
                        "commonName": "House Finch",
                        "confidence": 0.8,
                    })
                })
                .collect();
            CannedApi { records, wrapped, queries: RefCell::new(Vec::new()) }
        }
    }

    impl PageFetcher for CannedApi {
        fn fetch_page(&self, query: &PageQuery) -> Result<String, LoadError> {
            self.queries.borrow_mut().push(query.clone());
            let end = (query.offset + query.limit).min(self.records.len());
            let start = query.offset.min(end);
            let slice: Vec<Value> = self.records[start..end].to_vec();
            let body = if self.wrapped {
                json!({ "data": slice, "total": self.records.len() })
            } else {
                Value::Array(slice)
            };
            Ok(body.to_string())
        }
    }

    struct FailingApi;

    impl PageFetcher for FailingApi {
        fn fetch_page(&self, _query: &PageQuery) -> Result<String, LoadError> {
            Err(LoadError::HttpError(503))
        }
    }

    #[test]
    fn test_build_page_url() {
        let q = PageQuery { start: day(1), end: day(7), offset: 100, limit: 50 };
        assert_eq!(
            build_page_url("http://birdnet.local:8080/", "/api/v2/detections", &q),
            "http://birdnet.local:8080/api/v2/detections?start=2024-05-01&end=2024-05-07&offset=100&limit=50"
        );
    }

    #[test]
    fn test_parse_page_shapes() {
        let bare = parse_page(r#"[{"commonName": "Blue Jay"}, 5]"#).unwrap();
        assert_eq!(bare.records.len(), 1);
        assert_eq!(bare.total, None);

        let wrapped = parse_page(r#"{"detections": [{"a": 1}, {"a": 2}], "total": 40}"#).unwrap();
        assert_eq!(wrapped.records.len(), 2);
        assert_eq!(wrapped.total, Some(40));

        assert!(matches!(parse_page(r#"{"message": "ok"}"#), Err(LoadError::ParseError(_))));
        assert!(matches!(parse_page("\"nope\""), Err(LoadError::ParseError(_))));
        assert!(matches!(parse_page("<html>"), Err(LoadError::ParseError(_))));
    }

    #[test]
    fn test_fetch_all_stops_on_short_page() {
        let api = CannedApi::new(25, false);
        let (table, summary) = fetch_all(&api, day(1), day(2), 10, 100).unwrap();
        assert_eq!(table.rows.len(), 25);
        assert_eq!(summary, FetchSummary { pages: 3, records: 25, truncated: false });

        let offsets: Vec<usize> = api.queries.borrow().iter().map(|q| q.offset).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
    }

    #[test]
    fn test_fetch_all_uses_total_to_skip_trailing_empty_page() {
        let api = CannedApi::new(20, true);
        let (_, summary) = fetch_all(&api, day(1), day(2), 10, 100).unwrap();
        assert_eq!(summary.pages, 2);

        // Without a total the server has to answer one empty page.
        let bare = CannedApi::new(20, false);
        let (_, summary) = fetch_all(&bare, day(1), day(2), 10, 100).unwrap();
        assert_eq!(summary.pages, 3);
    }

    #[test]
    fn test_fetch_all_truncates_at_max_pages() {
        let api = CannedApi::new(100, false);
        let (table, summary) = fetch_all(&api, day(1), day(2), 10, 3).unwrap();
        assert_eq!(table.rows.len(), 30);
        assert!(summary.truncated);
    }

    #[test]
    fn test_fetch_all_propagates_http_errors() {
        let err = fetch_all(&FailingApi, day(1), day(2), 10, 3).unwrap_err();
        assert_eq!(err, LoadError::HttpError(503));
    }

    #[test]
    fn test_records_to_table_aligns_and_flattens() {
        let records = vec![
            json!({"commonName": "Wood Duck", "confidence": 0.9,
                   "weather": {"temperature": 12.5, "confidence": 0.1}}),
            json!({"commonName": "Mallard", "verified": true, "tags": ["a"]}),
        ];
        let records: Vec<Map<String, Value>> = records
            .into_iter()
            .map(|v| match v {
                Value::Object(o) => o,
                _ => unreachable!(),
            })
            .collect();

        let table = records_to_table(records);
        let col = |name: &str| table.columns.iter().position(|c| c == name).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][col("temperature")], RawValue::Float(12.5));
        // Top-level confidence wins over the nested one.
        assert_eq!(table.rows[0][col("confidence")], RawValue::Float(0.9));
        assert_eq!(table.rows[1][col("confidence")], RawValue::Null);
        assert_eq!(table.rows[1][col("verified")], RawValue::Bool(true));
        assert_eq!(table.rows[1][col("tags")], RawValue::Null);
        assert!(!table.columns.contains(&"weather".to_string()));
    }
}
