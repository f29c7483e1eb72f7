use crate::model::{ChunkKey, DownloadPoint};
use chrono::{Datelike, NaiveDate};

/// Split the years from `history_start` through `today` into one chunk per calendar year.
///
/// Every chunk except the first starts on January 1st and every chunk ends on December 31st,
/// including the current year's. Keys therefore never change as days pass, and the open year's
/// chunk is replaced in place until the year is over. A year never exceeds the range size the
/// downloads API accepts.
#[must_use]
pub fn plan_chunks(package: &str, history_start: NaiveDate, today: NaiveDate) -> Vec<ChunkKey> {
    let mut keys = Vec::new();
    let mut from = history_start;

    while from <= today {
        let to = NaiveDate::from_ymd_opt(from.year(), 12, 31).unwrap_or(NaiveDate::MAX);
        keys.push(ChunkKey::new(package, from, to));

        match to.succ_opt() {
            Some(next) => from = next,
            None => break,
        }
    }

    keys
}

/// Average daily downloads over the trailing `window_days` days that have data.
///
/// This is the slope of the cumulative download series, used to animate a live counter.
/// Points must be sorted by day. The value is not clamped.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "download counts stay well within f64 precision")]
pub fn rate_per_day(points: &[DownloadPoint], window_days: u32) -> f64 {
    let window = usize::try_from(window_days).unwrap_or(usize::MAX);
    let tail = &points[points.len().saturating_sub(window)..];
    if tail.is_empty() {
        return 0.0;
    }

    let sum: u64 = tail.iter().map(|p| p.downloads).sum();
    sum as f64 / tail.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn chunks_align_to_years() {
        let keys = plan_chunks("react-query", day("2022-06-15"), day("2024-03-01"));
        let ranges: Vec<_> = keys.iter().map(|k| (k.from.to_string(), k.to.to_string())).collect();
        assert_eq!(
            ranges,
            vec![
                ("2022-06-15".to_string(), "2022-12-31".to_string()),
                ("2023-01-01".to_string(), "2023-12-31".to_string()),
                ("2024-01-01".to_string(), "2024-12-31".to_string()),
            ]
        );
    }

    #[test]
    fn past_chunks_keep_keys_as_days_pass() {
        let monday = plan_chunks("p", day("2023-01-01"), day("2024-03-01"));
        let tuesday = plan_chunks("p", day("2023-01-01"), day("2024-03-02"));
        assert_eq!(monday, tuesday);

        let next_year = plan_chunks("p", day("2023-01-01"), day("2025-01-01"));
        assert_eq!(next_year[..2], monday[..]);
        assert_eq!(next_year.len(), 3);
    }

    #[test]
    fn single_day_and_empty_plans() {
        assert_eq!(plan_chunks("p", day("2024-01-01"), day("2024-01-01")).len(), 1);
        assert!(plan_chunks("p", day("2024-01-02"), day("2024-01-01")).is_empty());
    }

    #[test]
    fn new_year_chunk() {
        let keys = plan_chunks("p", day("2023-12-31"), day("2024-01-01"));
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].to, day("2023-12-31"));
        assert_eq!(keys[1].from, day("2024-01-01"));
        assert_eq!(keys[1].to, day("2024-12-31"));
    }

    fn points(counts: &[u64]) -> Vec<DownloadPoint> {
        let start = day("2024-01-01");
        counts
            .iter()
            .enumerate()
            .map(|(i, &downloads)| DownloadPoint {
                day: start + chrono::Duration::days(i64::try_from(i).unwrap()),
                downloads,
            })
            .collect()
    }

    #[test]
    fn rate_uses_trailing_window() {
        let pts = points(&[1000, 1000, 10, 20, 30, 40, 50, 60, 70]);
        assert!((rate_per_day(&pts, 7) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn rate_with_short_history() {
        let pts = points(&[7, 14]);
        assert!((rate_per_day(&pts, 7) - 10.5).abs() < 1e-9);
        assert!(rate_per_day(&[], 7).abs() < f64::EPSILON);
    }
}
