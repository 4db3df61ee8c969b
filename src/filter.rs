//! Detection filters: date range, minimum confidence, species selection.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::config::DEFAULT_MIN_CONFIDENCE;
use crate::model::{Dataset, Detection};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    /// Inclusive on both ends.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub min_confidence: f64,
    /// Empty means every species.
    pub species: BTreeSet<String>,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        DetectionFilter {
            date_range: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            species: BTreeSet::new(),
        }
    }
}

impl DetectionFilter {
    /// Builds a date range from optional bounds, falling back to the data's
    /// own first/last day for whichever end is missing.
    pub fn with_dates(
        mut self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        bounds: Option<(NaiveDate, NaiveDate)>,
    ) -> Self {
        self.date_range = match (start, end, bounds) {
            (None, None, _) => None,
            (Some(s), Some(e), _) => Some((s, e)),
            (Some(s), None, Some((_, max))) => Some((s, max)),
            (None, Some(e), Some((min, _))) => Some((min, e)),
            (Some(s), None, None) => Some((s, NaiveDate::MAX)),
            (None, Some(e), None) => Some((NaiveDate::MIN, e)),
        };
        self
    }

    pub fn matches(&self, d: &Detection) -> bool {
        if let Some((start, end)) = self.date_range {
            if d.date < start || d.date > end {
                return false;
            }
        }
        if d.confidence < self.min_confidence {
            return false;
        }
        self.species.is_empty() || self.species.contains(&d.common_name)
    }

    /// Returns the matching detections as a new dataset.
    pub fn apply(&self, dataset: &Dataset) -> Dataset {
        dataset.subset(|d| self.matches(d))
    }
}
