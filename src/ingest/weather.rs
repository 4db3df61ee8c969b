/// Weather Archive API Client
///
/// Retrieves hourly temperature, precipitation and cloud cover for the
/// recorder's coordinates from the Open-Meteo historical archive, and joins
/// them onto detections by hour.
///
/// API Documentation: https://open-meteo.com/en/docs/historical-weather-api

use std::collections::HashMap;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;

use crate::columns;
use crate::logging::{self, DataSource};
use crate::model::{Dataset, LoadError};

const HOURLY_VARIABLES: &str = "temperature_2m,precipitation,cloud_cover";

// ============================================================================
// Archive API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ArchiveResponse {
    pub hourly: Option<HourlySeries>,
    pub error: Option<bool>,
    pub reason: Option<String>,
}

/// Column-oriented hourly series; every vector is indexed like `time`.
#[derive(Debug, Deserialize)]
pub struct HourlySeries {
    pub time: Vec<String>,  // "2024-05-01T06:00", local to the coordinates
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,  // °C
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,  // mm over the preceding hour
    #[serde(default)]
    pub cloud_cover: Vec<Option<f64>>,  // % of sky
}

/// One hour of weather at the recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSample {
    pub time: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
}

// ============================================================================
// API Client Functions
// ============================================================================

pub fn build_archive_url(
    base_url: &str,
    latitude: f64,
    longitude: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> String {
    format!(
        "{}/v1/archive?latitude={:.4}&longitude={:.4}&start_date={}&end_date={}&hourly={}&timezone=auto",
        base_url.trim_end_matches('/'),
        latitude,
        longitude,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        HOURLY_VARIABLES
    )
}

/// Fetch hourly weather for a coordinate and an inclusive date range.
pub fn fetch_hourly(
    client: &reqwest::blocking::Client,
    base_url: &str,
    latitude: f64,
    longitude: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<WeatherSample>, LoadError> {
    let url = build_archive_url(base_url, latitude, longitude, start, end);
    logging::debug(DataSource::Weather, Some(url.as_str()), "requesting hourly archive");

    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()?;

    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
        // The archive explains 400s in the body; keep the code as the error.
        if let Ok(body) = serde_json::from_str::<ArchiveResponse>(&text) {
            if let Some(reason) = body.reason {
                logging::warn(DataSource::Weather, None, &reason);
            }
        }
        return Err(LoadError::HttpError(status.as_u16()));
    }

    parse_archive_response(&text)
}

pub fn build_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, LoadError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Parse an archive response body into hourly samples.
pub fn parse_archive_response(body: &str) -> Result<Vec<WeatherSample>, LoadError> {
    let response: ArchiveResponse = serde_json::from_str(body)?;

    if response.error.unwrap_or(false) {
        return Err(LoadError::ParseError(
            response.reason.unwrap_or_else(|| "archive reported an error".to_string()),
        ));
    }

    let hourly = response
        .hourly
        .ok_or_else(|| LoadError::ParseError("response has no hourly block".to_string()))?;

    let n = hourly.time.len();
    for (name, len) in [
        ("temperature_2m", hourly.temperature_2m.len()),
        ("precipitation", hourly.precipitation.len()),
        ("cloud_cover", hourly.cloud_cover.len()),
    ] {
        // An absent variable deserializes empty; a partial one is corrupt.
        if len != 0 && len != n {
            return Err(LoadError::ParseError(format!(
                "hourly.{} has {} values for {} timestamps",
                name, len, n
            )));
        }
    }

    let mut samples = Vec::with_capacity(n);
    for (i, time) in hourly.time.iter().enumerate() {
        let time = NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M")
            .map_err(|e| LoadError::ParseError(format!("bad hourly time '{}': {}", time, e)))?;
        samples.push(WeatherSample {
            time,
            temperature_c: hourly.temperature_2m.get(i).copied().flatten(),
            precipitation_mm: hourly.precipitation.get(i).copied().flatten(),
            cloud_cover_pct: hourly.cloud_cover.get(i).copied().flatten(),
        });
    }

    Ok(samples)
}

// ============================================================================
// Join
// ============================================================================

/// Fills weather on each detection from the sample for its hour.
///
/// Values the detection already carries are left alone. Weather columns are
/// marked present only when at least one value was attached. Returns the
/// number of detections that received weather.
pub fn attach_weather(dataset: &mut Dataset, samples: &[WeatherSample]) -> usize {
    let by_hour: HashMap<NaiveDateTime, &WeatherSample> = samples
        .iter()
        .filter_map(|s| s.time.with_minute(0).and_then(|t| t.with_second(0)).map(|t| (t, s)))
        .collect();

    let mut attached = 0;
    let mut filled = [false; 3];

    for detection in &mut dataset.detections {
        let Some(sample) = by_hour.get(&detection.hour_bucket()) else {
            continue;
        };
        let mut touched = false;

        if detection.temperature_c.is_none() && sample.temperature_c.is_some() {
            detection.temperature_c = sample.temperature_c;
            filled[0] = true;
            touched = true;
        }
        if detection.precipitation_mm.is_none() && sample.precipitation_mm.is_some() {
            detection.precipitation_mm = sample.precipitation_mm;
            filled[1] = true;
            touched = true;
        }
        if detection.cloud_cover_pct.is_none() && sample.cloud_cover_pct.is_some() {
            detection.cloud_cover_pct = sample.cloud_cover_pct;
            filled[2] = true;
            touched = true;
        }
        if touched {
            attached += 1;
        }
    }

    for (field, was_filled) in columns::WEATHER_FIELDS.into_iter().zip(filled) {
        if was_filled {
            dataset.columns.insert(field);
        }
    }

    attached
}

// ============================================================================
// Precipitation Helpers
// ============================================================================

/// Total precipitation across samples, in millimetres.
pub fn cumulative_precipitation(samples: &[WeatherSample]) -> f64 {
    samples.iter().filter_map(|s| s.precipitation_mm).sum()
}

/// Hours with at least `threshold_mm` of precipitation.
pub fn wet_hours(samples: &[WeatherSample], threshold_mm: f64) -> usize {
    samples
        .iter()
        .filter(|s| s.precipitation_mm.is_some_and(|p| p >= threshold_mm))
        .count()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::Field;
    use crate::model::{ColumnSet, Detection};

    const SAMPLE_BODY: &str = r#"{
        "latitude": 40.69, "longitude": -89.59, "timezone": "America/Chicago",
        "hourly_units": {"time": "iso8601", "temperature_2m": "°C"},
        "hourly": {
            "time": ["2024-05-01T05:00", "2024-05-01T06:00", "2024-05-01T07:00"],
            "temperature_2m": [9.1, 10.4, null],
            "precipitation": [0.0, 1.2, 0.4],
            "cloud_cover": [100, 85, 40]
        }
    }"#;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_build_archive_url() {
        let url = build_archive_url(
            "https://archive-api.open-meteo.com/",
            40.69391,
            -89.58899,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 7).unwrap(),
        );
        assert_eq!(
            url,
            "https://archive-api.open-meteo.com/v1/archive?latitude=40.6939&longitude=-89.5890\
             &start_date=2024-05-01&end_date=2024-05-07\
             &hourly=temperature_2m,precipitation,cloud_cover&timezone=auto"
        );
    }

    #[test]
    fn test_parse_archive_response() {
        let samples = parse_archive_response(SAMPLE_BODY).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].time, at("2024-05-01 06:00:00"));
        assert_eq!(samples[1].temperature_c, Some(10.4));
        assert_eq!(samples[2].temperature_c, None);
        assert_eq!(samples[0].cloud_cover_pct, Some(100.0));
    }

    #[test]
    fn test_parse_rejects_error_and_ragged_bodies() {
        let err = parse_archive_response(r#"{"error": true, "reason": "Latitude must be in range"}"#)
            .unwrap_err();
        assert_eq!(err, LoadError::ParseError("Latitude must be in range".to_string()));

        let ragged = r#"{"hourly": {"time": ["2024-05-01T05:00", "2024-05-01T06:00"],
                                    "temperature_2m": [1.0]}}"#;
        assert!(matches!(parse_archive_response(ragged), Err(LoadError::ParseError(_))));
    }

    #[test]
    fn test_attach_weather_fills_by_hour_and_keeps_existing_values() {
        let samples = parse_archive_response(SAMPLE_BODY).unwrap();

        let mut own = Detection::new(at("2024-05-01 06:10:00"), "Robin", 0.9);
        own.temperature_c = Some(20.0);
        let mut dataset = Dataset::new(
            vec![
                Detection::new(at("2024-05-01 06:45:30"), "Robin", 0.9),
                own,
                Detection::new(at("2024-05-02 06:45:00"), "Robin", 0.9),
            ],
            ColumnSet::new(),
        );

        let attached = attach_weather(&mut dataset, &samples);
        assert_eq!(attached, 2);
        assert_eq!(dataset.detections[0].temperature_c, Some(10.4));
        assert_eq!(dataset.detections[0].precipitation_mm, Some(1.2));
        assert_eq!(dataset.detections[1].temperature_c, Some(20.0));
        assert_eq!(dataset.detections[1].cloud_cover_pct, Some(85.0));
        assert!(!dataset.detections[2].has_weather());
        assert!(columns::WEATHER_FIELDS.iter().all(|f| dataset.has(*f)));
    }

    #[test]
    fn test_attach_without_matches_leaves_columns_absent() {
        let samples = parse_archive_response(SAMPLE_BODY).unwrap();
        let mut dataset = Dataset::new(
            vec![Detection::new(at("2023-01-01 06:00:00"), "Robin", 0.9)],
            ColumnSet::new(),
        );
        assert_eq!(attach_weather(&mut dataset, &samples), 0);
        assert!(!dataset.has(Field::Temperature));
    }

    #[test]
    fn test_precipitation_helpers() {
        let samples = parse_archive_response(SAMPLE_BODY).unwrap();
        assert!((cumulative_precipitation(&samples) - 1.6).abs() < 1e-9);
        assert_eq!(wet_hours(&samples, 0.2), 2);
        assert_eq!(wet_hours(&samples, 5.0), 0);
    }
}
