/// Terminal rendering of the dashboard views.
///
/// Each view is a `write_*` function over any `fmt::Write` sink; the
/// `render_*` wrappers return the full text so the binary only has to print
/// it, and tests can assert on it directly.

use std::fmt::{self, Write};

use crate::analysis::discoveries::{discoveries, seasonal_pivot};
use crate::analysis::overview::{
    confidence_histogram, daily_counts, hourly_counts, overview_metrics, weekday_counts, CONFIDENCE_BINS,
};
use crate::analysis::species::{leaderboard, snapshot, species_focus, FocusRate, Headline, SpeciesSummary};
use crate::analysis::weather::{hourly_weather_activity, wet_dry_split};
use crate::loader::LoadOutcome;
use crate::model::{weekday_name, Dataset};

pub const EMPTY_WARNING: &str = "No data available for selected filters.";

const BAR_WIDTH: usize = 40;
/// Precipitation counted as a wet hour, in millimetres.
const WET_HOUR_MM: f64 = 0.1;

/// Lets a view writer be formatted with `to_string`.
struct View<F>(F);

impl<F> fmt::Display for View<F>
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.0)(f)
    }
}

fn render<F>(view: F) -> String
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    View(view).to_string()
}

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let len = (count * BAR_WIDTH).div_ceil(max);
    "#".repeat(len)
}

fn heading(out: &mut dyn Write, title: &str) -> fmt::Result {
    writeln!(out, "\n{}\n{}", title, "-".repeat(title.len()))
}

/// One-line description of where the data came from, plus any fallback
/// warning.
pub fn write_source_banner(out: &mut dyn Write, outcome: &LoadOutcome) -> fmt::Result {
    writeln!(out, "Source: {} ({} detections)", outcome.origin, outcome.dataset.len())?;
    if let Some(warning) = &outcome.warning {
        writeln!(out, "Warning: {}", warning)?;
    }
    Ok(())
}

pub fn render_source_banner(outcome: &LoadOutcome) -> String {
    render(|f| write_source_banner(f, outcome))
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

pub fn write_overview(out: &mut dyn Write, dataset: &Dataset) -> fmt::Result {
    if dataset.is_empty() {
        return writeln!(out, "{}", EMPTY_WARNING);
    }
    let detections = &dataset.detections;
    let metrics = overview_metrics(detections);

    heading(out, "Overview")?;
    writeln!(out, "Total detections:  {}", metrics.total_detections)?;
    writeln!(out, "Unique species:    {}", metrics.unique_species)?;
    if let Some(avg) = metrics.avg_confidence {
        writeln!(out, "Avg confidence:    {:.1}%", avg * 100.0)?;
    }
    writeln!(out, "Days recorded:     {}", metrics.days_recorded)?;

    heading(out, "Daily detections")?;
    let daily = daily_counts(detections);
    let max = daily.values().copied().max().unwrap_or(0);
    for (date, count) in &daily {
        writeln!(out, "{}  {:>5}  {}", date, count, bar(*count, max))?;
    }

    heading(out, "Activity by hour")?;
    let hourly = hourly_counts(detections);
    let max = hourly.iter().copied().max().unwrap_or(0);
    for (hour, count) in hourly.iter().enumerate() {
        writeln!(out, "{:02}:00  {:>5}  {}", hour, count, bar(*count, max))?;
    }

    heading(out, "Activity by weekday")?;
    let weekdays = weekday_counts(detections);
    let max = weekdays.iter().map(|(_, c)| *c).max().unwrap_or(0);
    for (day, count) in weekdays {
        writeln!(out, "{:<9}  {:>5}  {}", weekday_name(day), count, bar(count, max))?;
    }

    heading(out, "Confidence distribution")?;
    let histogram = confidence_histogram(detections, CONFIDENCE_BINS);
    let max = histogram.iter().map(|b| b.count).max().unwrap_or(0);
    for bin in &histogram {
        writeln!(out, "{}  {:>5}  {}", bin.label(), bin.count, bar(bin.count, max))?;
    }

    let weather = hourly_weather_activity(detections);
    if !weather.is_empty() {
        heading(out, "Weather")?;
        let (wet, dry) = wet_dry_split(&weather, WET_HOUR_MM);
        writeln!(out, "Hours with weather: {}", weather.len())?;
        writeln!(out, "Detections in wet hours: {}, dry hours: {}", wet, dry)?;
    }
    Ok(())
}

pub fn render_overview(dataset: &Dataset) -> String {
    render(|f| write_overview(f, dataset))
}

// ---------------------------------------------------------------------------
// Species
// ---------------------------------------------------------------------------

/// Leaderboard rows as an aligned table.
pub fn write_leaderboard(out: &mut dyn Write, rows: &[SpeciesSummary]) -> fmt::Result {
    writeln!(
        out,
        "{:<4} {:<32} {:>6} {:>6} {:>6} {:>6}  {:<10}  {:<10} {:>5}",
        "#", "Species", "Count", "Avg", "Min", "Max", "First", "Last", "Days"
    )?;
    for (i, row) in rows.iter().enumerate() {
        writeln!(
            out,
            "{:<4} {:<32} {:>6} {:>6.2} {:>6.2} {:>6.2}  {}  {} {:>5}",
            i + 1,
            row.common_name,
            row.count,
            row.avg_confidence,
            row.min_confidence,
            row.max_confidence,
            row.first_seen,
            row.last_seen,
            row.active_days
        )?;
    }
    Ok(())
}

pub fn render_leaderboard(rows: &[SpeciesSummary]) -> String {
    render(|f| write_leaderboard(f, rows))
}

pub fn write_species(out: &mut dyn Write, dataset: &Dataset, top: usize) -> fmt::Result {
    let Some(snap) = snapshot(dataset) else {
        return writeln!(out, "{}", EMPTY_WARNING);
    };

    heading(out, "Species snapshot")?;
    writeln!(out, "Top visitor:       {} ({} detections)", snap.top_species, snap.top_count)?;
    writeln!(out, "Unique species:    {}", snap.unique_species)?;
    match snap.headline {
        Headline::Verified(n) => writeln!(out, "Verified:          {}", n)?,
        Headline::AvgConfidence(c) => writeln!(out, "Avg confidence:    {:.1}%", c * 100.0)?,
    }
    writeln!(out, "New this season:   {}", snap.new_this_season)?;

    heading(out, &format!("Top {} species", top))?;
    write_leaderboard(out, &leaderboard(&dataset.detections, top))
}

pub fn render_species(dataset: &Dataset, top: usize) -> String {
    render(|f| write_species(f, dataset, top))
}

pub fn write_focus(out: &mut dyn Write, dataset: &Dataset, common_name: &str) -> fmt::Result {
    if dataset.is_empty() {
        return writeln!(out, "{}", EMPTY_WARNING);
    }
    let Some(focus) = species_focus(dataset, common_name) else {
        return writeln!(out, "No detections of {} for selected filters.", common_name);
    };

    heading(out, &focus.common_name)?;
    writeln!(out, "Detections:        {}", focus.detections)?;
    writeln!(out, "Avg confidence:    {:.1}%", focus.avg_confidence * 100.0)?;
    writeln!(
        out,
        "Active days:       {} ({} to {})",
        focus.active_days, focus.first_seen, focus.last_seen
    )?;
    match focus.rate {
        FocusRate::Verified(pct) => writeln!(out, "Verified:          {:.1}%", pct)?,
        FocusRate::Morning(pct) => writeln!(out, "Morning activity:  {:.1}%", pct)?,
    }

    heading(out, "Daily detections")?;
    let max = focus.daily.values().copied().max().unwrap_or(0);
    for (date, count) in &focus.daily {
        writeln!(out, "{}  {:>5}  {}", date, count, bar(*count, max))?;
    }

    heading(out, "Activity by hour")?;
    let max = focus.hourly.iter().copied().max().unwrap_or(0);
    for (hour, count) in focus.hourly.iter().enumerate().filter(|(_, c)| **c > 0) {
        writeln!(out, "{:02}:00  {:>5}  {}", hour, count, bar(*count, max))?;
    }

    if let (Some(low), Some(high)) = (focus.confidences.first(), focus.confidences.last()) {
        let median = focus.confidences[focus.confidences.len() / 2];
        writeln!(out, "\nConfidence: min {:.2}, median {:.2}, max {:.2}", low, median, high)?;
    }

    heading(out, "Latest detections")?;
    for d in &focus.latest {
        writeln!(out, "{}  {:.2}", d.timestamp.format("%Y-%m-%d %H:%M:%S"), d.confidence)?;
    }
    Ok(())
}

pub fn render_focus(dataset: &Dataset, common_name: &str) -> String {
    render(|f| write_focus(f, dataset, common_name))
}

// ---------------------------------------------------------------------------
// Discoveries
// ---------------------------------------------------------------------------

pub fn write_discoveries(out: &mut dyn Write, dataset: &Dataset) -> fmt::Result {
    if dataset.is_empty() {
        return writeln!(out, "{}", EMPTY_WARNING);
    }

    heading(out, "New species")?;
    match discoveries(dataset) {
        Some(found) => {
            writeln!(out, "Lifetime new species: {}", found.lifetime_new_species)?;
            if let Some(days) = found.avg_days_since_first_seen {
                writeln!(out, "Avg days since first seen: {:.1}", days)?;
            }
            if let Some(n) = found.new_this_year {
                writeln!(out, "New this year: {}", n)?;
            }
            writeln!(out)?;
            for row in &found.table {
                writeln!(
                    out,
                    "{:<32} first {}  last {}  {:>5} detections",
                    row.common_name, row.first_seen, row.last_seen, row.total_detections
                )?;
            }
        }
        None => writeln!(out, "No new-species information in this data.")?,
    }

    if let Some(pivot) = seasonal_pivot(dataset) {
        heading(out, "Detections by season")?;
        write!(out, "{:<32}", "Species")?;
        for season in &pivot.seasons {
            write!(out, " {:>8}", season)?;
        }
        writeln!(out)?;
        for (j, name) in pivot.species.iter().enumerate() {
            write!(out, "{:<32}", name)?;
            for row in &pivot.counts {
                write!(out, " {:>8}", row[j])?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

pub fn render_discoveries(dataset: &Dataset) -> String {
    render(|f| write_discoveries(f, dataset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::det;
    use crate::columns::Field;
    use crate::loader::DataOrigin;
    use crate::model::ColumnSet;

    fn sample() -> Dataset {
        let mut v = vec![
            det("2024-05-01 06:00", "Blue Jay", 0.91),
            det("2024-05-02 07:00", "Blue Jay", 0.81),
            det("2024-05-02 19:00", "Wood Duck", 0.75),
        ];
        v[2].is_new_species = true;
        v[2].current_season = Some("Spring".to_string());
        let columns: ColumnSet = [Field::IsNewSpecies, Field::CurrentSeason].into_iter().collect();
        Dataset::new(v, columns)
    }

    #[test]
    fn test_empty_views_show_warning() {
        let empty = Dataset::empty();
        assert_eq!(render_overview(&empty).trim(), EMPTY_WARNING);
        assert_eq!(render_species(&empty, 15).trim(), EMPTY_WARNING);
        assert_eq!(render_focus(&empty, "Blue Jay").trim(), EMPTY_WARNING);
        assert_eq!(render_discoveries(&empty).trim(), EMPTY_WARNING);
    }

    #[test]
    fn test_overview_lists_all_hours_and_weekdays() {
        let text = render_overview(&sample());
        assert!(text.contains("Total detections:  3"));
        assert!(text.contains("Unique species:    2"));
        assert!(text.contains("23:00"));
        assert!(text.contains("Sunday"));
        assert!(!text.contains("Weather"));
    }

    #[test]
    fn test_species_view() {
        let text = render_species(&sample(), 15);
        assert!(text.contains("Top visitor:       Blue Jay (2 detections)"));
        assert!(text.contains("New this season:   1"));
        assert!(text.contains("Wood Duck"));
    }

    #[test]
    fn test_focus_view() {
        let text = render_focus(&sample(), "Blue Jay");
        assert!(text.contains("Morning activity:  100.0%"));
        assert!(text.contains("2024-05-02 07:00:00  0.81"));
        assert!(render_focus(&sample(), "Dodo").contains("No detections of Dodo"));
    }

    #[test]
    fn test_discoveries_view() {
        let text = render_discoveries(&sample());
        assert!(text.contains("Lifetime new species: 1"));
        assert!(text.contains("Detections by season"));
        assert!(text.contains("Spring"));
    }

    #[test]
    fn test_source_banner() {
        let outcome = LoadOutcome {
            dataset: sample(),
            origin: DataOrigin::Synthetic,
            warning: Some("Database file 'birds.db' not found".to_string()),
        };
        let text = render_source_banner(&outcome);
        assert!(text.starts_with("Source: synthetic data (3 detections)"));
        assert!(text.contains("Warning: Database file"));
    }

    /// Sink that rejects every write.
    struct Closed;

    impl Write for Closed {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_write_errors_reach_the_caller() {
        let ds = sample();
        assert!(write_overview(&mut Closed, &ds).is_err());
        assert!(write_species(&mut Closed, &ds, 15).is_err());
        assert!(write_focus(&mut Closed, &ds, "Blue Jay").is_err());
        assert!(write_discoveries(&mut Closed, &ds).is_err());
        assert!(write_discoveries(&mut Closed, &Dataset::empty()).is_err());
    }

    #[test]
    fn test_leaderboard_has_header_and_one_line_per_row() {
        let ds = sample();
        let text = render_leaderboard(&leaderboard(&ds.detections, 15));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#    Species"));
        assert!(lines[1].starts_with("1    Blue Jay"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_bar_scaling() {
        assert_eq!(bar(0, 0), "");
        assert_eq!(bar(10, 10).len(), BAR_WIDTH);
        assert_eq!(bar(1, 10).len(), 4);
    }
}
