/// Aggregations behind the dashboard views.
///
/// Everything here is a pure function of a (filtered) `Dataset`; rendering
/// lives in `report`, downloads in `export`.
///
/// Submodules:
/// - `overview`    — KPIs, daily/hourly/weekday activity, confidence histogram.
/// - `species`     — species summary, leaderboard, snapshot, species focus.
/// - `discoveries` — new-species table and seasonal pivot.
/// - `weather`     — hourly activity alongside weather.

pub mod discoveries;
pub mod overview;
pub mod species;
pub mod weather;

/// Arithmetic mean, `None` for an empty input.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}

/// Rounds to two decimals, as displayed in the species tables.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_round() {
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(mean([1.0, 2.0, 4.5]), Some(2.5));
        assert_eq!(round2(0.876), 0.88);
        assert_eq!(round2(0.5), 0.5);
    }
}
