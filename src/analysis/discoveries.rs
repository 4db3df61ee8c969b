//! New-species discoveries and the seasonal species pivot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::analysis::mean;
use crate::columns::Field;
use crate::model::{Dataset, Detection};

#[derive(Debug, Clone, PartialEq)]
pub struct NewSpeciesRow {
    pub common_name: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    /// Detections of the species flagged new.
    pub total_detections: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discoveries {
    /// Distinct species with at least one detection flagged new.
    pub lifetime_new_species: usize,
    /// Mean over flagged detections; `None` without the column.
    pub avg_days_since_first_seen: Option<f64>,
    /// New-species detections also flagged new this year; `None` without
    /// the column.
    pub new_this_year: Option<usize>,
    /// Sorted by first sighting, then name.
    pub table: Vec<NewSpeciesRow>,
}

/// Summarizes new-species flags.
///
/// Returns `None` when the source has no `is_new_species` column or no row
/// carries the flag.
pub fn discoveries(dataset: &Dataset) -> Option<Discoveries> {
    if !dataset.has(Field::IsNewSpecies) {
        return None;
    }
    let flagged: Vec<&Detection> = dataset.detections.iter().filter(|d| d.is_new_species).collect();
    if flagged.is_empty() {
        return None;
    }

    let names: BTreeSet<&str> = flagged.iter().map(|d| d.common_name.as_str()).collect();

    let avg_days_since_first_seen = if dataset.has(Field::DaysSinceFirstSeen) {
        mean(flagged.iter().filter_map(|d| d.days_since_first_seen))
    } else {
        None
    };

    let new_this_year = dataset
        .has(Field::IsNewThisYear)
        .then(|| flagged.iter().filter(|d| d.is_new_this_year).count());

    let mut table: Vec<NewSpeciesRow> = names
        .iter()
        .filter_map(|name| {
            let all = flagged.iter().filter(|d| d.common_name == *name);
            let first_seen = all.clone().map(|d| d.date).min()?;
            let last_seen = all.clone().map(|d| d.date).max()?;
            Some(NewSpeciesRow {
                common_name: name.to_string(),
                first_seen,
                last_seen,
                total_detections: all.count(),
            })
        })
        .collect();
    table.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.common_name.cmp(&b.common_name)));

    Some(Discoveries {
        lifetime_new_species: names.len(),
        avg_days_since_first_seen,
        new_this_year,
        table,
    })
}

// ---------------------------------------------------------------------------
// Seasonal pivot
// ---------------------------------------------------------------------------

/// Season × species detection counts. `counts[i][j]` is the count for
/// `seasons[i]` and `species[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalPivot {
    pub seasons: Vec<String>,
    pub species: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl SeasonalPivot {
    pub fn count(&self, season: &str, species: &str) -> usize {
        let i = self.seasons.iter().position(|s| s == season);
        let j = self.species.iter().position(|s| s == species);
        match (i, j) {
            (Some(i), Some(j)) => self.counts[i][j],
            _ => 0,
        }
    }
}

/// Builds the pivot from detections that carry a season label.
///
/// `None` when the source has no `current_season` column or no row has a
/// season.
pub fn seasonal_pivot(dataset: &Dataset) -> Option<SeasonalPivot> {
    if !dataset.has(Field::CurrentSeason) {
        return None;
    }

    let mut cells: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for d in &dataset.detections {
        if let Some(season) = d.current_season.as_deref() {
            *cells.entry((season, d.common_name.as_str())).or_insert(0) += 1;
        }
    }
    if cells.is_empty() {
        return None;
    }

    let seasons: Vec<String> = cells
        .keys()
        .map(|(s, _)| *s)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect();
    let species: Vec<String> = cells
        .keys()
        .map(|(_, n)| *n)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect();

    let counts = seasons
        .iter()
        .map(|season| {
            species
                .iter()
                .map(|name| cells.get(&(season.as_str(), name.as_str())).copied().unwrap_or(0))
                .collect()
        })
        .collect();

    Some(SeasonalPivot { seasons, species, counts })
}
