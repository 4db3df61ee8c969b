//! Species insights: per-species summary, leaderboard, snapshot metrics and
//! the single-species deep dive.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::analysis::overview::{daily_counts, hourly_counts};
use crate::analysis::{mean, round2};
use crate::columns::Field;
use crate::model::{Dataset, Detection};

/// Rows shown on the leaderboard by default.
pub const LEADERBOARD_SIZE: usize = 15;
/// Most recent detections listed in a species focus.
pub const LATEST_LIMIT: usize = 25;
/// Hours counted as morning activity, inclusive.
pub const MORNING_HOURS: (u32, u32) = (5, 11);

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesSummary {
    pub common_name: String,
    pub count: usize,
    /// Rounded to two decimals.
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    /// Calendar span from first to last sighting, inclusive.
    pub active_days: i64,
}

/// Inclusive day span between two dates.
pub fn active_days(first: NaiveDate, last: NaiveDate) -> i64 {
    (last - first).num_days() + 1
}

/// One row per species, most detected first (ties by name).
pub fn species_summary(detections: &[Detection]) -> Vec<SpeciesSummary> {
    let mut groups: BTreeMap<&str, Vec<&Detection>> = BTreeMap::new();
    for d in detections {
        groups.entry(d.common_name.as_str()).or_default().push(d);
    }

    let mut rows: Vec<SpeciesSummary> = groups
        .into_iter()
        .filter_map(|(name, group)| {
            let first_seen = group.iter().map(|d| d.date).min()?;
            let last_seen = group.iter().map(|d| d.date).max()?;
            let confidences = group.iter().map(|d| d.confidence);
            Some(SpeciesSummary {
                common_name: name.to_string(),
                count: group.len(),
                avg_confidence: round2(mean(confidences.clone())?),
                min_confidence: round2(confidences.clone().fold(f64::INFINITY, f64::min)),
                max_confidence: round2(confidences.fold(f64::NEG_INFINITY, f64::max)),
                first_seen,
                last_seen,
                active_days: active_days(first_seen, last_seen),
            })
        })
        .collect();

    // BTreeMap order is by name, and the sort is stable.
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// The top `n` rows of the species summary.
pub fn leaderboard(detections: &[Detection], n: usize) -> Vec<SpeciesSummary> {
    let mut rows = species_summary(detections);
    rows.truncate(n);
    rows
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Third snapshot metric: verified total when the source tracks
/// verification, average confidence otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Headline {
    Verified(usize),
    AvgConfidence(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub top_species: String,
    pub top_count: usize,
    pub unique_species: usize,
    pub headline: Headline,
    /// Detections flagged new this season, or new species when none are.
    pub new_this_season: usize,
}

/// Headline metrics for the species page. `None` for an empty dataset.
pub fn snapshot(dataset: &Dataset) -> Option<Snapshot> {
    let summary = species_summary(&dataset.detections);
    let top = summary.first()?;
    let detections = &dataset.detections;

    let headline = if dataset.has(Field::Verified) {
        Headline::Verified(detections.iter().filter(|d| d.verified).count())
    } else {
        Headline::AvgConfidence(mean(detections.iter().map(|d| d.confidence)).unwrap_or(0.0))
    };

    let new_season = detections.iter().filter(|d| d.is_new_this_season).count();
    let new_species = detections.iter().filter(|d| d.is_new_species).count();

    Some(Snapshot {
        top_species: top.common_name.clone(),
        top_count: top.count,
        unique_species: summary.len(),
        headline,
        new_this_season: if new_season > 0 { new_season } else { new_species },
    })
}

// ---------------------------------------------------------------------------
// Species focus
// ---------------------------------------------------------------------------

/// Share of detections, in percent: verified when the source tracks it,
/// morning (05:00-11:59) otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum FocusRate {
    Verified(f64),
    Morning(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesFocus {
    pub common_name: String,
    pub detections: usize,
    pub avg_confidence: f64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub active_days: i64,
    pub rate: FocusRate,
    pub daily: BTreeMap<NaiveDate, usize>,
    pub hourly: [usize; 24],
    /// Ascending, for the distribution chart.
    pub confidences: Vec<f64>,
    /// Newest first, at most `LATEST_LIMIT`.
    pub latest: Vec<Detection>,
}

/// Deep dive into one species. `None` when the species has no detections.
pub fn species_focus(dataset: &Dataset, common_name: &str) -> Option<SpeciesFocus> {
    let focus: Vec<Detection> = dataset
        .detections
        .iter()
        .filter(|d| d.common_name == common_name)
        .cloned()
        .collect();

    let first_seen = focus.iter().map(|d| d.date).min()?;
    let last_seen = focus.iter().map(|d| d.date).max()?;
    let n = focus.len() as f64;

    let rate = if dataset.has(Field::Verified) {
        FocusRate::Verified(focus.iter().filter(|d| d.verified).count() as f64 / n * 100.0)
    } else {
        let (from, to) = MORNING_HOURS;
        let morning = focus.iter().filter(|d| d.hour >= from && d.hour <= to).count();
        FocusRate::Morning(morning as f64 / n * 100.0)
    };

    let mut confidences: Vec<f64> = focus.iter().map(|d| d.confidence).collect();
    confidences.sort_by(f64::total_cmp);

    let mut latest = focus.clone();
    latest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    latest.truncate(LATEST_LIMIT);

    Some(SpeciesFocus {
        common_name: common_name.to_string(),
        detections: focus.len(),
        avg_confidence: mean(focus.iter().map(|d| d.confidence)).unwrap_or(0.0),
        first_seen,
        last_seen,
        active_days: active_days(first_seen, last_seen),
        rate,
        daily: daily_counts(&focus),
        hourly: hourly_counts(&focus),
        confidences,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::det;
    use crate::model::ColumnSet;

    fn sample() -> Vec<Detection> {
        vec![
            det("2024-05-01 06:00", "Blue Jay", 0.91),
            det("2024-05-03 07:00", "Blue Jay", 0.70),
            det("2024-05-10 19:00", "Blue Jay", 0.884),
            det("2024-05-02 06:00", "American Robin", 0.95),
            det("2024-05-02 20:00", "American Robin", 0.75),
            det("2024-05-05 06:00", "Wood Duck", 0.80),
            det("2024-05-06 06:00", "Cedar Waxwing", 0.85),
        ]
    }

    #[test]
    fn test_species_summary_orders_and_rounds() {
        let rows = species_summary(&sample());
        let names: Vec<&str> = rows.iter().map(|r| r.common_name.as_str()).collect();
        assert_eq!(names, vec!["Blue Jay", "American Robin", "Cedar Waxwing", "Wood Duck"]);

        let jay = &rows[0];
        assert_eq!(jay.count, 3);
        assert_eq!(jay.avg_confidence, 0.83);
        assert_eq!(jay.min_confidence, 0.7);
        assert_eq!(jay.max_confidence, 0.91);
        assert_eq!(jay.first_seen.to_string(), "2024-05-01");
        assert_eq!(jay.last_seen.to_string(), "2024-05-10");
        assert_eq!(jay.active_days, 10);

        // Single-day species are active for one day.
        assert_eq!(rows[1].active_days, 1);
    }

    #[test]
    fn test_leaderboard_truncates() {
        assert_eq!(leaderboard(&sample(), 2).len(), 2);
        assert_eq!(leaderboard(&sample(), LEADERBOARD_SIZE).len(), 4);
    }

    #[test]
    fn test_snapshot_without_verified_column_uses_avg_confidence() {
        let ds = Dataset::new(sample(), ColumnSet::new());
        let snap = snapshot(&ds).unwrap();
        assert_eq!(snap.top_species, "Blue Jay");
        assert_eq!(snap.top_count, 3);
        assert_eq!(snap.unique_species, 4);
        assert!(matches!(snap.headline, Headline::AvgConfidence(c) if (c - 0.834).abs() < 1e-9));
        assert_eq!(snap.new_this_season, 0);
    }

    #[test]
    fn test_snapshot_counts_verified_and_falls_back_to_new_species() {
        let mut detections = sample();
        detections[0].verified = true;
        detections[3].verified = true;
        detections[5].is_new_species = true;
        let mut cols = ColumnSet::new();
        cols.insert(Field::Verified);
        cols.insert(Field::IsNewSpecies);

        let snap = snapshot(&Dataset::new(detections.clone(), cols.clone())).unwrap();
        assert_eq!(snap.headline, Headline::Verified(2));
        assert_eq!(snap.new_this_season, 1);

        detections[1].is_new_this_season = true;
        detections[2].is_new_this_season = true;
        let snap = snapshot(&Dataset::new(detections, cols)).unwrap();
        assert_eq!(snap.new_this_season, 2);
    }

    #[test]
    fn test_snapshot_of_empty_dataset() {
        assert!(snapshot(&Dataset::empty()).is_none());
    }

    #[test]
    fn test_focus_morning_rate_and_latest() {
        let ds = Dataset::new(sample(), ColumnSet::new());
        let focus = species_focus(&ds, "Blue Jay").unwrap();
        assert_eq!(focus.detections, 3);
        assert_eq!(focus.active_days, 10);
        // 06:00 and 07:00 are morning, 19:00 is not.
        match focus.rate {
            FocusRate::Morning(pct) => assert!((pct - 200.0 / 3.0).abs() < 1e-9),
            other => panic!("expected morning rate, got {:?}", other),
        }
        assert_eq!(focus.confidences, vec![0.70, 0.884, 0.91]);
        assert_eq!(focus.latest[0].date.to_string(), "2024-05-10");
        assert_eq!(focus.hourly[6], 1);
        assert_eq!(focus.daily.len(), 3);
    }

    #[test]
    fn test_focus_verified_rate_and_latest_limit() {
        let mut detections: Vec<Detection> = (0..30)
            .map(|i| det(&format!("2024-05-01 06:{:02}", i), "House Finch", 0.9))
            .collect();
        for d in detections.iter_mut().take(15) {
            d.verified = true;
        }
        let mut cols = ColumnSet::new();
        cols.insert(Field::Verified);

        let focus = species_focus(&Dataset::new(detections, cols), "House Finch").unwrap();
        assert_eq!(focus.rate, FocusRate::Verified(50.0));
        assert_eq!(focus.latest.len(), LATEST_LIMIT);
        assert_eq!(focus.latest[0].timestamp.format("%H:%M").to_string(), "06:29");
    }

    #[test]
    fn test_focus_unknown_species() {
        let ds = Dataset::new(sample(), ColumnSet::new());
        assert!(species_focus(&ds, "Dodo").is_none());
    }
}
