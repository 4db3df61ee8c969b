/// Synthetic detections for demos and fallback
///
/// When the recorder's database or API is unavailable, the tool can still
/// show something: a seeded, reproducible stream of plausible backyard
/// detections. The output is a `RawTable` in the recorder's own column
/// layout, so it goes through the same normalization as real data.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::normalize::{RawTable, RawValue};

/// Common name, scientific name, relative abundance.
const SPECIES: &[(&str, &str, u32)] = &[
    ("American Robin", "Turdus migratorius", 18),
    ("Northern Cardinal", "Cardinalis cardinalis", 15),
    ("House Sparrow", "Passer domesticus", 14),
    ("Blue Jay", "Cyanocitta cristata", 10),
    ("Black-capped Chickadee", "Poecile atricapillus", 9),
    ("Mourning Dove", "Zenaida macroura", 8),
    ("American Goldfinch", "Spinus tristis", 7),
    ("Downy Woodpecker", "Dryobates pubescens", 6),
    ("Carolina Wren", "Thryothorus ludovicianus", 5),
    ("Red-winged Blackbird", "Agelaius phoeniceus", 4),
    ("European Starling", "Sturnus vulgaris", 3),
    ("Great Horned Owl", "Bubo virginianus", 1),
];

/// Relative activity per hour of day; dawn chorus peaks around 6-8.
const HOUR_WEIGHTS: [u32; 24] = [
    1, 1, 1, 1, 2, 8, 16, 18, 14, 10, 7, 6, //
    5, 5, 5, 6, 7, 9, 8, 4, 2, 1, 1, 1,
];

pub const SYNTHETIC_SOURCE: &str = "synthetic";

/// Settings for one generated run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPlan {
    /// Last day generated (inclusive).
    pub end: NaiveDate,
    pub days: u32,
    pub detections_per_day: u32,
    pub seed: u64,
}

pub fn season_of(date: NaiveDate) -> &'static str {
    match date.month() {
        3..=5 => "Spring",
        6..=8 => "Summer",
        9..=11 => "Fall",
        _ => "Winter",
    }
}

/// Generates the table. Same plan, same rows.
pub fn generate(plan: &SyntheticPlan) -> RawTable {
    let columns = [
        "date",
        "time",
        "commonName",
        "scientificName",
        "confidence",
        "source",
        "verified",
        "isNewSpecies",
        "currentSeason",
    ];
    let mut table = RawTable::new(columns.iter().map(|c| c.to_string()).collect());
    if plan.days == 0 || plan.detections_per_day == 0 {
        return table;
    }

    let mut rng = StdRng::seed_from_u64(plan.seed);
    let species_dist = match WeightedIndex::new(SPECIES.iter().map(|s| s.2)) {
        Ok(d) => d,
        Err(_) => return table,
    };
    let hour_dist = match WeightedIndex::new(HOUR_WEIGHTS) {
        Ok(d) => d,
        Err(_) => return table,
    };

    let Some(first_day) = plan.end.checked_sub_signed(Duration::days(i64::from(plan.days) - 1)) else {
        return table;
    };
    let mut seen: HashSet<usize> = HashSet::new();

    for offset in 0..plan.days {
        let date = first_day + Duration::days(i64::from(offset));

        let mut day: Vec<(u32, u32, u32, usize)> = (0..plan.detections_per_day)
            .map(|_| {
                let hour = hour_dist.sample(&mut rng) as u32;
                let minute = rng.gen_range(0..60);
                let second = rng.gen_range(0..60);
                (hour, minute, second, species_dist.sample(&mut rng))
            })
            .collect();
        day.sort_unstable();

        for (hour, minute, second, species) in day {
            let (common, scientific, _) = SPECIES[species];
            let confidence = (rng.gen_range(0.5..1.0_f64) * 100.0).round() / 100.0;
            let verified = rng.gen_bool(0.3);
            let is_new = seen.insert(species);

            table.push_row(vec![
                RawValue::Date(date),
                RawValue::text(format!("{:02}:{:02}:{:02}", hour, minute, second)),
                RawValue::text(common),
                RawValue::text(scientific),
                RawValue::Float(confidence),
                RawValue::text(SYNTHETIC_SOURCE),
                RawValue::Bool(verified),
                RawValue::Bool(is_new),
                RawValue::text(season_of(date)),
            ]);
        }
    }

    table
}
