//! Hourly activity alongside weather.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::analysis::mean;
use crate::model::Detection;

/// One clock hour with detections that carry weather.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherActivity {
    pub hour: NaiveDateTime,
    pub detections: usize,
    pub species: usize,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
}

/// Groups weather-bearing detections by hour, oldest first. Weather values
/// are averaged over the hour's detections.
pub fn hourly_weather_activity(detections: &[Detection]) -> Vec<WeatherActivity> {
    let mut buckets: BTreeMap<NaiveDateTime, Vec<&Detection>> = BTreeMap::new();
    for d in detections.iter().filter(|d| d.has_weather()) {
        buckets.entry(d.hour_bucket()).or_default().push(d);
    }

    buckets
        .into_iter()
        .map(|(hour, group)| {
            let mut names: Vec<&str> = group.iter().map(|d| d.common_name.as_str()).collect();
            names.sort_unstable();
            names.dedup();
            WeatherActivity {
                hour,
                detections: group.len(),
                species: names.len(),
                temperature_c: mean(group.iter().filter_map(|d| d.temperature_c)),
                precipitation_mm: mean(group.iter().filter_map(|d| d.precipitation_mm)),
                cloud_cover_pct: mean(group.iter().filter_map(|d| d.cloud_cover_pct)),
            }
        })
        .collect()
}

/// Detections in wet hours versus dry hours, split at `threshold_mm`.
/// Hours without a precipitation value are not counted.
pub fn wet_dry_split(rows: &[WeatherActivity], threshold_mm: f64) -> (usize, usize) {
    rows.iter().fold((0, 0), |(wet, dry), row| match row.precipitation_mm {
        Some(p) if p >= threshold_mm => (wet + row.detections, dry),
        Some(_) => (wet, dry + row.detections),
        None => (wet, dry),
    })
}
