/// Column registry for detection sources.
///
/// Defines the canonical set of columns a detection can carry, along with
/// the names each one goes by in the wild. Local database exports, the
/// detection API and older CSV dumps all spell the same column differently
/// (`commonName`, `common_name`, `Com_Name`). This is the single source of
/// truth for that mapping; the normalizer and the exporter both read it.

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Date,
    Time,
    Timestamp,
    CommonName,
    ScientificName,
    Confidence,
    Source,
    Verified,
    Locked,
    IsNewSpecies,
    IsNewThisYear,
    IsNewThisSeason,
    DaysSinceFirstSeen,
    DaysThisYear,
    DaysThisSeason,
    CurrentSeason,
    Temperature,
    Precipitation,
    CloudCover,
}

/// Metadata for a single canonical column.
pub struct ColumnSpec {
    pub field: Field,
    /// Header used for CSV downloads.
    pub canonical: &'static str,
    /// Accepted source names, already in `normalize_key` form.
    pub aliases: &'static [&'static str],
}

/// Every canonical column, in CSV export order.
pub static COLUMN_REGISTRY: &[ColumnSpec] = &[
    ColumnSpec {
        field: Field::Date,
        canonical: "date",
        aliases: &["date"],
    },
    ColumnSpec {
        field: Field::Time,
        canonical: "time",
        aliases: &["time"],
    },
    ColumnSpec {
        field: Field::Timestamp,
        canonical: "timestamp",
        aliases: &["timestamp", "datetime", "begintime", "detectedat", "observedat"],
    },
    ColumnSpec {
        field: Field::CommonName,
        canonical: "common_name",
        aliases: &["commonname", "comname", "species", "speciesname"],
    },
    ColumnSpec {
        field: Field::ScientificName,
        canonical: "scientific_name",
        aliases: &["scientificname", "sciname"],
    },
    ColumnSpec {
        field: Field::Confidence,
        canonical: "confidence",
        aliases: &["confidence", "score", "probability"],
    },
    ColumnSpec {
        field: Field::Source,
        canonical: "source",
        aliases: &["source", "sourcename"],
    },
    ColumnSpec {
        field: Field::Verified,
        canonical: "verified",
        aliases: &["verified", "isverified"],
    },
    ColumnSpec {
        field: Field::Locked,
        canonical: "locked",
        aliases: &["locked", "islocked"],
    },
    ColumnSpec {
        field: Field::IsNewSpecies,
        canonical: "is_new_species",
        aliases: &["isnewspecies", "newspecies"],
    },
    ColumnSpec {
        field: Field::IsNewThisYear,
        canonical: "is_new_this_year",
        aliases: &["isnewthisyear", "newthisyear"],
    },
    ColumnSpec {
        field: Field::IsNewThisSeason,
        canonical: "is_new_this_season",
        aliases: &["isnewthisseason", "newthisseason"],
    },
    ColumnSpec {
        field: Field::DaysSinceFirstSeen,
        canonical: "days_since_first_seen",
        aliases: &["dayssincefirstseen"],
    },
    ColumnSpec {
        field: Field::DaysThisYear,
        canonical: "days_this_year",
        aliases: &["daysthisyear"],
    },
    ColumnSpec {
        field: Field::DaysThisSeason,
        canonical: "days_this_season",
        aliases: &["daysthisseason"],
    },
    ColumnSpec {
        field: Field::CurrentSeason,
        canonical: "current_season",
        aliases: &["currentseason", "season"],
    },
    ColumnSpec {
        field: Field::Temperature,
        canonical: "temperature_c",
        aliases: &["temperature", "temperature2m", "temperaturec", "tempc"],
    },
    ColumnSpec {
        field: Field::Precipitation,
        canonical: "precipitation_mm",
        aliases: &["precipitation", "precipitationmm", "precipmm"],
    },
    ColumnSpec {
        field: Field::CloudCover,
        canonical: "cloud_cover_pct",
        aliases: &["cloudcover", "cloudcoverpct"],
    },
];

/// Fields that describe weather, attached either by the source or by the
/// archive join.
pub const WEATHER_FIELDS: [Field; 3] = [Field::Temperature, Field::Precipitation, Field::CloudCover];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Reduces a source column name to its matching key: lowercase ASCII
/// alphanumerics only.
pub fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Maps a source column name to its canonical field. Returns `None` for
/// columns the registry does not know.
pub fn resolve(name: &str) -> Option<Field> {
    let key = normalize_key(name);
    COLUMN_REGISTRY
        .iter()
        .find(|spec| spec.aliases.contains(&key.as_str()))
        .map(|spec| spec.field)
}

/// Looks up the registry entry for a field.
pub fn find_column(field: Field) -> &'static ColumnSpec {
    // Every variant has exactly one entry; enforced by the tests below.
    COLUMN_REGISTRY
        .iter()
        .find(|spec| spec.field == field)
        .unwrap_or(&COLUMN_REGISTRY[0])
}

pub fn canonical_name(field: Field) -> &'static str {
    find_column(field).canonical
}

/// Returns the canonical names of required columns absent from `present`,
/// sorted. A timestamp satisfies the date/time requirement on its own.
pub fn required_missing(present: &[Field]) -> Vec<String> {
    let has = |f: Field| present.contains(&f);
    let mut missing = Vec::new();

    if !has(Field::CommonName) {
        missing.push(canonical_name(Field::CommonName).to_string());
    }
    if !has(Field::Confidence) {
        missing.push(canonical_name(Field::Confidence).to_string());
    }
    if !has(Field::Timestamp) {
        if !has(Field::Date) {
            missing.push(canonical_name(Field::Date).to_string());
        }
        if !has(Field::Time) {
            missing.push(canonical_name(Field::Time).to_string());
        }
    }

    missing.sort();
    missing
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL_FIELDS: [Field; 19] = [
        Field::Date,
        Field::Time,
        Field::Timestamp,
        Field::CommonName,
        Field::ScientificName,
        Field::Confidence,
        Field::Source,
        Field::Verified,
        Field::Locked,
        Field::IsNewSpecies,
        Field::IsNewThisYear,
        Field::IsNewThisSeason,
        Field::DaysSinceFirstSeen,
        Field::DaysThisYear,
        Field::DaysThisSeason,
        Field::CurrentSeason,
        Field::Temperature,
        Field::Precipitation,
        Field::CloudCover,
    ];

    #[test]
    fn test_every_field_has_exactly_one_registry_entry() {
        for field in ALL_FIELDS {
            let count = COLUMN_REGISTRY.iter().filter(|s| s.field == field).count();
            assert_eq!(count, 1, "field {:?} should appear once in COLUMN_REGISTRY", field);
        }
        assert_eq!(COLUMN_REGISTRY.len(), ALL_FIELDS.len());
    }

    #[test]
    fn test_no_alias_maps_to_two_fields() {
        let mut seen = HashSet::new();
        for spec in COLUMN_REGISTRY {
            for alias in spec.aliases {
                assert!(seen.insert(*alias), "alias '{}' is registered twice", alias);
            }
        }
    }

    #[test]
    fn test_aliases_are_stored_in_normalized_form() {
        // An alias that is not already normalized can never match.
        for spec in COLUMN_REGISTRY {
            assert!(!spec.aliases.is_empty(), "{:?} needs at least one alias", spec.field);
            for alias in spec.aliases {
                assert_eq!(&normalize_key(alias), alias);
            }
        }
    }

    #[test]
    fn test_resolve_handles_common_spellings() {
        assert_eq!(resolve("commonName"), Some(Field::CommonName));
        assert_eq!(resolve("common_name"), Some(Field::CommonName));
        assert_eq!(resolve("Com_Name"), Some(Field::CommonName));
        assert_eq!(resolve("Sci_Name"), Some(Field::ScientificName));
        assert_eq!(resolve("DateTime"), Some(Field::Timestamp));
        assert_eq!(resolve("isNewThisSeason"), Some(Field::IsNewThisSeason));
        assert_eq!(resolve("temperature_2m"), Some(Field::Temperature));
        assert_eq!(resolve("cloud-cover"), Some(Field::CloudCover));
        assert_eq!(resolve("clipName"), None);
    }

    #[test]
    fn test_canonical_names_are_unique_snake_case() {
        let mut seen = HashSet::new();
        for spec in COLUMN_REGISTRY {
            assert!(seen.insert(spec.canonical));
            assert!(spec.canonical.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_required_missing_accepts_timestamp_instead_of_date_time() {
        let with_ts = [Field::CommonName, Field::Confidence, Field::Timestamp];
        assert!(required_missing(&with_ts).is_empty());

        let with_date_time = [Field::CommonName, Field::Confidence, Field::Date, Field::Time];
        assert!(required_missing(&with_date_time).is_empty());

        let only_date = [Field::CommonName, Field::Date];
        assert_eq!(required_missing(&only_date), vec!["confidence", "time"]);
    }
}
