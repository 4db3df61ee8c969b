//! Overview page aggregates.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Weekday};

use crate::analysis::mean;
use crate::model::{Detection, WEEK_ORDER};

/// Default number of confidence histogram bins.
pub const CONFIDENCE_BINS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewMetrics {
    pub total_detections: usize,
    pub unique_species: usize,
    /// `None` when there are no detections.
    pub avg_confidence: Option<f64>,
    pub days_recorded: usize,
}

pub fn overview_metrics(detections: &[Detection]) -> OverviewMetrics {
    let species: BTreeSet<&str> = detections.iter().map(|d| d.common_name.as_str()).collect();
    let days: BTreeSet<NaiveDate> = detections.iter().map(|d| d.date).collect();
    OverviewMetrics {
        total_detections: detections.len(),
        unique_species: species.len(),
        avg_confidence: mean(detections.iter().map(|d| d.confidence)),
        days_recorded: days.len(),
    }
}

/// Detections per calendar day. Days without detections are absent.
pub fn daily_counts(detections: &[Detection]) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for d in detections {
        *counts.entry(d.date).or_insert(0) += 1;
    }
    counts
}

/// Detections per hour of day, all 24 hours present.
pub fn hourly_counts(detections: &[Detection]) -> [usize; 24] {
    let mut counts = [0; 24];
    for d in detections {
        counts[(d.hour as usize).min(23)] += 1;
    }
    counts
}

/// Detections per weekday, Monday through Sunday, zero-filled.
pub fn weekday_counts(detections: &[Detection]) -> [(Weekday, usize); 7] {
    let mut counts = WEEK_ORDER.map(|day| (day, 0));
    for d in detections {
        let i = d.weekday.num_days_from_monday() as usize;
        counts[i].1 += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Confidence histogram
// ---------------------------------------------------------------------------

/// One right-closed histogram bin `(left, right]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub left: f64,
    pub right: f64,
    pub count: usize,
}

impl HistogramBin {
    pub fn label(&self) -> String {
        format!("{:.2}-{:.2}", self.left, self.right)
    }
}

/// Equal-width bin edges spanning `min..=max`.
///
/// The first edge sits 0.1% of the range below the minimum so the minimum
/// falls inside the first right-closed bin. A zero-width range is widened by
/// 0.1% on each side (±0.001 around zero).
pub fn bin_edges(min: f64, max: f64, bins: usize) -> Vec<f64> {
    let bins = bins.max(1);
    let (lo, hi) = if min == max {
        let pad = |v: f64| if v == 0.0 { 0.001 } else { 0.001 * v.abs() };
        (min - pad(min), max + pad(max))
    } else {
        (min, max)
    };

    let step = (hi - lo) / bins as f64;
    let mut edges: Vec<f64> = (0..=bins).map(|i| lo + step * i as f64).collect();
    edges[bins] = hi;
    if min != max {
        edges[0] -= (max - min) * 0.001;
    }
    edges
}

/// Confidence histogram over the data's own range. Empty input yields no
/// bins; every bin is reported, including empty ones.
pub fn confidence_histogram(detections: &[Detection], bins: usize) -> Vec<HistogramBin> {
    let values: Vec<f64> = detections.iter().map(|d| d.confidence).collect();
    let (Some(min), Some(max)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };

    let edges = bin_edges(min, max, bins);
    let n = edges.len() - 1;
    let mut counts = vec![0usize; n];
    for v in values {
        // First edge >= v closes the bin that holds v.
        let idx = edges.partition_point(|&e| e < v);
        counts[idx.saturating_sub(1).min(n - 1)] += 1;
    }

    edges
        .windows(2)
        .zip(counts)
        .map(|(w, count)| HistogramBin { left: w[0], right: w[1], count })
        .collect()
}
