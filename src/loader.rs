//! Source selection and fallback.
//!
//! Loads detections from the configured source, normalizes them and
//! attaches weather when enabled. A failing source is logged and replaced
//! by the configured fallback (synthetic or empty data) so the reports can
//! still render.

use chrono::{Duration, NaiveDate};

use crate::config::{Config, Fallback, SourceKind, MAX_WINDOW_DAYS};
use crate::ingest::{api, postgres, sqlite, synthetic, weather};
use crate::logging::{self, DataSource};
use crate::model::{Dataset, LoadError};
use crate::normalize::{self, RawTable};

/// Date range requested from sources that support one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LoadWindow {
    /// The window ending `today`, reaching back `lookback_days` days, with
    /// explicit bounds taking precedence. The lookback is clamped to
    /// `1..=MAX_WINDOW_DAYS`.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        lookback_days: i64,
        today: NaiveDate,
    ) -> Self {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or_else(|| days_ending(end, lookback_days));
        if start <= end {
            LoadWindow { start, end }
        } else {
            LoadWindow { start: end, end: start }
        }
    }
}

/// First day of the `days`-long span ending on `end`; saturates at the
/// earliest representable date.
fn days_ending(end: NaiveDate, days: i64) -> NaiveDate {
    let back = days.clamp(1, MAX_WINDOW_DAYS) - 1;
    end.checked_sub_signed(Duration::days(back)).unwrap_or(NaiveDate::MIN)
}

/// Where the dataset handed to the reports came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Sqlite,
    Postgres,
    Api,
    Synthetic,
    Empty,
}

impl std::fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataOrigin::Sqlite => write!(f, "database file"),
            DataOrigin::Postgres => write!(f, "PostgreSQL"),
            DataOrigin::Api => write!(f, "detection API"),
            DataOrigin::Synthetic => write!(f, "synthetic data"),
            DataOrigin::Empty => write!(f, "no data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub dataset: Dataset,
    pub origin: DataOrigin,
    /// User-facing explanation when the configured source was not used.
    pub warning: Option<String>,
}

/// Reads the raw table from the configured source.
pub fn read_source(config: &Config, window: LoadWindow) -> Result<(RawTable, DataOrigin), LoadError> {
    let source = &config.source;
    match source.kind {
        SourceKind::Sqlite => {
            let table = sqlite::read_detections(&source.database_file, &source.table, source.query.as_deref())?;
            Ok((table, DataOrigin::Sqlite))
        }
        SourceKind::Postgres => {
            let url = source.postgres_url.as_deref().ok_or_else(|| {
                LoadError::Database("no PostgreSQL URL configured (set DATABASE_URL)".to_string())
            })?;
            let table = postgres::read_detections(url, &source.table, source.query.as_deref())?;
            Ok((table, DataOrigin::Postgres))
        }
        SourceKind::Api => {
            let fetcher = api::HttpPageFetcher::new(&config.api.base_url, &config.api.path, config.api.timeout_secs)?;
            let (table, _) = api::fetch_all(
                &fetcher,
                window.start,
                window.end,
                config.api.page_size,
                config.api.max_pages,
            )?;
            Ok((table, DataOrigin::Api))
        }
        SourceKind::Synthetic => Ok((synthetic_table(config, window.end), DataOrigin::Synthetic)),
    }
}

fn synthetic_table(config: &Config, end: NaiveDate) -> RawTable {
    synthetic::generate(&synthetic::SyntheticPlan {
        end,
        days: config.synthetic.days,
        detections_per_day: config.synthetic.detections_per_day,
        seed: config.synthetic.seed,
    })
}

/// Loads from the configured source, normalized and with weather attached.
pub fn load_configured(config: &Config, window: LoadWindow) -> Result<(Dataset, DataOrigin), LoadError> {
    let (table, origin) = read_source(config, window)?;
    let mut dataset = normalize::normalize_table(table)?.dataset;

    if config.weather.enabled && !dataset.is_empty() {
        enrich_with_weather(config, &mut dataset);
    }
    Ok((dataset, origin))
}

/// Best-effort weather join over the dataset's own date span. Failures only
/// warn; detections are still usable without weather.
pub fn enrich_with_weather(config: &Config, dataset: &mut Dataset) {
    let Some((start, end)) = dataset.date_bounds() else {
        return;
    };
    let samples = weather::build_client(config.weather.timeout_secs).and_then(|client| {
        weather::fetch_hourly(
            &client,
            &config.weather.base_url,
            config.weather.latitude,
            config.weather.longitude,
            start,
            end,
        )
    });

    match samples {
        Ok(samples) => {
            let attached = weather::attach_weather(dataset, &samples);
            logging::info(
                DataSource::Weather,
                None,
                &format!("attached weather to {}/{} detections", attached, dataset.len()),
            );
        }
        Err(e) => logging::log_load_failure(DataSource::Weather, "archive", "weather lookup", &e),
    }
}

/// Loads detections, falling back per configuration when the source fails.
pub fn load(config: &Config, window: LoadWindow) -> LoadOutcome {
    match load_configured(config, window) {
        Ok((dataset, origin)) => LoadOutcome { dataset, origin, warning: None },
        Err(e) => {
            let source = match config.source.kind {
                SourceKind::Api => DataSource::Api,
                SourceKind::Synthetic => DataSource::Synthetic,
                _ => DataSource::Database,
            };
            logging::log_load_failure(source, "detections", "load", &e);
            fallback(config, window, &e)
        }
    }
}

fn fallback(config: &Config, window: LoadWindow, err: &LoadError) -> LoadOutcome {
    match config.source.fallback {
        Fallback::Synthetic => {
            let dataset = normalize::normalize_table(synthetic_table(config, window.end))
                .map(|n| n.dataset)
                .unwrap_or_default();
            LoadOutcome {
                dataset,
                origin: DataOrigin::Synthetic,
                warning: Some(format!("{}. Showing synthetic demo data instead.", err)),
            }
        }
        Fallback::Empty => LoadOutcome {
            dataset: Dataset::empty(),
            origin: DataOrigin::Empty,
            warning: Some(format!("{}. No detections to show.", err)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn missing_db_config(fallback: Fallback) -> Config {
        let mut config = Config::default();
        config.source.database_file = PathBuf::from("/nonexistent/birds.db");
        config.source.fallback = fallback;
        config.synthetic.days = 3;
        config.synthetic.detections_per_day = 10;
        config
    }

    #[test]
    fn test_window_resolution() {
        let w = LoadWindow::resolve(None, None, 30, day(5, 31));
        assert_eq!(w, LoadWindow { start: day(5, 2), end: day(5, 31) });

        let w = LoadWindow::resolve(Some(day(5, 10)), Some(day(5, 1)), 30, day(5, 31));
        assert_eq!(w, LoadWindow { start: day(5, 1), end: day(5, 10) });

        let w = LoadWindow::resolve(None, Some(day(5, 10)), 1, day(5, 31));
        assert_eq!(w, LoadWindow { start: day(5, 10), end: day(5, 10) });
    }

    #[test]
    fn test_window_lookback_is_clamped() {
        let w = LoadWindow::resolve(None, None, i64::MAX, day(5, 31));
        assert_eq!(w.end, day(5, 31));
        assert_eq!(w.start, day(5, 31) - Duration::days(MAX_WINDOW_DAYS - 1));

        let w = LoadWindow::resolve(None, None, i64::MIN, day(5, 31));
        assert_eq!(w.start, day(5, 31));

        let w = LoadWindow::resolve(None, Some(NaiveDate::MIN), 30, day(5, 31));
        assert_eq!(w.start, NaiveDate::MIN);
    }

    #[test]
    fn test_missing_database_falls_back_to_synthetic() {
        let config = missing_db_config(Fallback::Synthetic);
        let outcome = load(&config, LoadWindow::resolve(None, None, 30, day(5, 31)));
        assert_eq!(outcome.origin, DataOrigin::Synthetic);
        assert_eq!(outcome.dataset.len(), 30);
        assert_eq!(outcome.dataset.date_bounds().map(|b| b.1), Some(day(5, 31)));
        assert!(outcome.warning.unwrap().contains("not found"));
    }

    #[test]
    fn test_missing_database_falls_back_to_empty() {
        let config = missing_db_config(Fallback::Empty);
        let outcome = load(&config, LoadWindow::resolve(None, None, 30, day(5, 31)));
        assert_eq!(outcome.origin, DataOrigin::Empty);
        assert!(outcome.dataset.is_empty());
        assert!(outcome.warning.is_some());
    }

    #[test]
    fn test_synthetic_source_needs_no_fallback() {
        let mut config = missing_db_config(Fallback::Empty);
        config.source.kind = SourceKind::Synthetic;
        let outcome = load(&config, LoadWindow::resolve(None, None, 30, day(5, 31)));
        assert_eq!(outcome.origin, DataOrigin::Synthetic);
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.dataset.len(), 30);
    }

    #[test]
    fn test_postgres_without_url_is_a_load_error() {
        let mut config = Config::default();
        config.source.kind = SourceKind::Postgres;
        let err = read_source(&config, LoadWindow::resolve(None, None, 30, day(5, 31))).unwrap_err();
        assert!(matches!(err, LoadError::Database(_)));
    }
}
