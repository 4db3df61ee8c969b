/// CSV downloads.
///
/// The detection export carries every canonical column the source provided,
/// in registry order, followed by the derived calendar columns. File names
/// are stamped with a caller-supplied clock so tests stay deterministic.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::analysis::species::SpeciesSummary;
use crate::columns::{COLUMN_REGISTRY, Field};
use crate::logging::{self, DataSource};
use crate::model::{Dataset, Detection};

/// Columns appended to every detection export.
pub const DERIVED_COLUMNS: [&str; 4] = ["datetime", "hour", "day_name", "week"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// `{species}_{YYYYmmdd_HHMMSS}.csv` with the species lowercased and spaces
/// replaced by underscores, or `detections_...` without a species.
pub fn export_file_name_at(species: Option<&str>, now: NaiveDateTime) -> String {
    let stem = match species {
        Some(name) if !name.trim().is_empty() => name.trim().to_lowercase().replace(' ', "_"),
        _ => "detections".to_string(),
    };
    format!("{}_{}.csv", stem, now.format("%Y%m%d_%H%M%S"))
}

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// Header row for a dataset export.
pub fn export_header(dataset: &Dataset) -> Vec<&'static str> {
    COLUMN_REGISTRY
        .iter()
        .filter(|spec| dataset.has(spec.field))
        .map(|spec| spec.canonical)
        .chain(DERIVED_COLUMNS)
        .collect()
}

fn opt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Text form of one canonical field.
pub fn field_value(d: &Detection, field: Field) -> String {
    match field {
        Field::Date => d.date.format("%Y-%m-%d").to_string(),
        Field::Time => d.timestamp.format("%H:%M:%S").to_string(),
        Field::Timestamp => d.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        Field::CommonName => d.common_name.clone(),
        Field::ScientificName => d.scientific_name.clone().unwrap_or_default(),
        Field::Confidence => d.confidence.to_string(),
        Field::Source => d.source.clone().unwrap_or_default(),
        Field::Verified => d.verified.to_string(),
        Field::Locked => d.locked.to_string(),
        Field::IsNewSpecies => d.is_new_species.to_string(),
        Field::IsNewThisYear => d.is_new_this_year.to_string(),
        Field::IsNewThisSeason => d.is_new_this_season.to_string(),
        Field::DaysSinceFirstSeen => opt_number(d.days_since_first_seen),
        Field::DaysThisYear => opt_number(d.days_this_year),
        Field::DaysThisSeason => opt_number(d.days_this_season),
        Field::CurrentSeason => d.current_season.clone().unwrap_or_default(),
        Field::Temperature => opt_number(d.temperature_c),
        Field::Precipitation => opt_number(d.precipitation_mm),
        Field::CloudCover => opt_number(d.cloud_cover_pct),
    }
}

/// Writes the dataset as CSV and returns the number of data rows.
pub fn write_detections<W: Write>(dataset: &Dataset, out: W) -> Result<usize, csv::Error> {
    let fields: Vec<Field> = COLUMN_REGISTRY
        .iter()
        .filter(|spec| dataset.has(spec.field))
        .map(|spec| spec.field)
        .collect();

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(export_header(dataset))?;

    for d in &dataset.detections {
        let mut record: Vec<String> = fields.iter().map(|&f| field_value(d, f)).collect();
        record.push(d.timestamp.format(TIMESTAMP_FORMAT).to_string());
        record.push(d.hour.to_string());
        record.push(d.day_name().to_string());
        record.push(d.iso_week.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(dataset.len())
}

/// Writes `dataset` into `dir` under a stamped file name and returns the path.
pub fn export_to_dir(
    dataset: &Dataset,
    dir: &Path,
    species: Option<&str>,
    now: NaiveDateTime,
) -> Result<PathBuf, csv::Error> {
    let path = dir.join(export_file_name_at(species, now));
    let file = std::fs::File::create(&path)?;
    let rows = write_detections(dataset, file)?;
    logging::info(
        DataSource::Export,
        path.to_str(),
        &format!("wrote {} detections", rows),
    );
    Ok(path)
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

pub const LEADERBOARD_HEADER: [&str; 8] = [
    "common_name",
    "count",
    "avg_confidence",
    "min_confidence",
    "max_confidence",
    "first_seen",
    "last_seen",
    "active_days",
];

pub fn write_leaderboard<W: Write>(rows: &[SpeciesSummary], out: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(LEADERBOARD_HEADER)?;
    for row in rows {
        writer.write_record([
            row.common_name.clone(),
            row.count.to_string(),
            format!("{:.2}", row.avg_confidence),
            format!("{:.2}", row.min_confidence),
            format!("{:.2}", row.max_confidence),
            row.first_seen.to_string(),
            row.last_seen.to_string(),
            row.active_days.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::species::leaderboard;
    use crate::model::ColumnSet;
    use chrono::NaiveDate;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn sample() -> Dataset {
        let mut jay = Detection::new(at("2024-05-01 06:15:00"), "Blue Jay", 0.91);
        jay.verified = true;
        let mut dove = Detection::new(at("2024-05-04 19:02:30"), "Mourning Dove", 0.8);
        dove.scientific_name = Some("Zenaida macroura".to_string());
        let columns: ColumnSet = [
            Field::Date,
            Field::Time,
            Field::CommonName,
            Field::ScientificName,
            Field::Confidence,
            Field::Verified,
        ]
        .into_iter()
        .collect();
        Dataset::new(vec![jay, dove], columns)
    }

    #[test]
    fn test_file_names() {
        let now = at("2024-05-06 14:03:09");
        assert_eq!(
            export_file_name_at(Some("Red-winged Blackbird"), now),
            "red-winged_blackbird_20240506_140309.csv"
        );
        assert_eq!(export_file_name_at(None, now), "detections_20240506_140309.csv");
        assert_eq!(export_file_name_at(Some("  "), now), "detections_20240506_140309.csv");
    }

    #[test]
    fn test_header_lists_present_then_derived_columns() {
        assert_eq!(
            export_header(&sample()),
            vec![
                "date",
                "time",
                "common_name",
                "scientific_name",
                "confidence",
                "verified",
                "datetime",
                "hour",
                "day_name",
                "week"
            ]
        );
    }

    #[test]
    fn test_write_detections() {
        let mut buf = Vec::new();
        let rows = write_detections(&sample(), &mut buf).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2024-05-01,06:15:00,Blue Jay,,0.91,true,2024-05-01 06:15:00,6,Wednesday,18"
        );
        assert_eq!(
            lines[2],
            "2024-05-04,19:02:30,Mourning Dove,Zenaida macroura,0.8,false,2024-05-04 19:02:30,19,Saturday,18"
        );
    }

    #[test]
    fn test_empty_dataset_writes_derived_header_only() {
        let mut buf = Vec::new();
        assert_eq!(write_detections(&Dataset::empty(), &mut buf).unwrap(), 0);
        assert_eq!(String::from_utf8(buf).unwrap(), "datetime,hour,day_name,week\n");
    }

    #[test]
    fn test_write_leaderboard() {
        let rows = leaderboard(&sample().detections, 15);
        let mut buf = Vec::new();
        write_leaderboard(&rows, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("common_name,count,avg_confidence"));
        assert!(text.contains("Blue Jay,1,0.91,0.91,0.91,2024-05-01,2024-05-01,1"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_export_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let path = export_to_dir(&sample(), dir.path(), Some("Blue Jay"), now).unwrap();
        assert!(path.ends_with("blue_jay_20240506_080000.csv"));
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
