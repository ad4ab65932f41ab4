//! Daily-count aggregation over a rolling window.
//!
//! Join statistics are stored as a series of [`DailyCount`] per edge. Every
//! write merges one new observation into the series and every read sums the
//! counts that fall inside `[today - 30 days, today]`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::analytics::DailyCount;
use crate::{CatalogError, Result};

/// Length of the rolling window, in days.
pub const WINDOW_DAYS: i64 = 30;

/// Format of every date string in the catalog.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|e| {
        CatalogError::InvalidArgument(format!("Invalid date {} (expected yyyy-MM-dd): {}", date, e))
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// First day of the window ending at `today`.
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(WINDOW_DAYS)
}

/// True if `date` lies in `[today - 30, today]`. Unparseable dates are
/// outside every window.
pub fn in_window(date: &str, today: NaiveDate) -> bool {
    match parse_date(date) {
        Ok(d) => d >= window_start(today) && d <= today,
        Err(_) => false,
    }
}

/// Merge `received` into `current`.
///
/// The received entry replaces whatever existed for its date (no summing).
/// Other dates keep their existing value; if the input holds several entries
/// for one date the first one wins and an integrity warning is logged.
/// Entries outside the window are dropped and the result is sorted by date.
pub fn aggregate_and_filter(
    current: &[DailyCount],
    received: &DailyCount,
    today: NaiveDate,
) -> Vec<DailyCount> {
    let received_date = parse_date(&received.date).ok();
    let mut by_date: BTreeMap<NaiveDate, DailyCount> = BTreeMap::new();

    for entry in current {
        let Ok(date) = parse_date(&entry.date) else {
            tracing::warn!(date = %entry.date, "Dropping daily count with unparseable date");
            continue;
        };
        if Some(date) == received_date {
            continue;
        }
        match by_date.entry(date) {
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
            }
            Entry::Occupied(existing) => {
                tracing::warn!(
                    date = %entry.date,
                    kept = existing.get().count,
                    ignored = entry.count,
                    "Multiple daily counts for one date, keeping the first"
                );
            }
        }
    }

    if let Some(date) = received_date {
        by_date.insert(date, received.clone());
    }

    let start = window_start(today);
    by_date
        .into_iter()
        .filter(|(date, _)| *date >= start && *date <= today)
        .map(|(_, count)| count)
        .collect()
}

/// Sum of the counts inside the window. An empty window sums to zero and
/// the total saturates at `i64::MAX`.
pub fn sum_in_window(counts: &[DailyCount], today: NaiveDate) -> i64 {
    counts
        .iter()
        .filter(|dc| in_window(&dc.date, today))
        .map(|dc| dc.count)
        .fold(0i64, i64::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    fn days_ago(n: i64) -> String {
        format_date(today() - Duration::days(n))
    }

    #[test]
    fn test_last_write_wins_per_date() {
        let d1 = days_ago(5);
        let d2 = days_ago(3);
        let current = vec![DailyCount::new(&d1, 5), DailyCount::new(&d2, 3)];

        let merged = aggregate_and_filter(&current, &DailyCount::new(&d1, 9), today());
        assert_eq!(merged, vec![DailyCount::new(&d1, 9), DailyCount::new(&d2, 3)]);
    }

    #[test]
    fn test_output_sorted_by_date() {
        let current = vec![
            DailyCount::new(days_ago(1), 1),
            DailyCount::new(days_ago(10), 10),
        ];
        let merged = aggregate_and_filter(&current, &DailyCount::new(days_ago(4), 4), today());
        let dates: Vec<_> = merged.iter().map(|d| d.date.clone()).collect();
        assert_eq!(dates, vec![days_ago(10), days_ago(4), days_ago(1)]);
    }

    #[test]
    fn test_sum_saturates() {
        let counts = vec![
            DailyCount::new(days_ago(2), i64::MAX),
            DailyCount::new(days_ago(1), i64::MAX),
        ];
        assert_eq!(sum_in_window(&counts, today()), i64::MAX);
    }

    #[test]
    fn test_window_boundaries() {
        let current = vec![
            DailyCount::new(days_ago(31), 7),
            DailyCount::new(days_ago(30), 3),
        ];
        let merged = aggregate_and_filter(&current, &DailyCount::new(days_ago(0), 1), today());
        assert_eq!(
            merged,
            vec![DailyCount::new(days_ago(30), 3), DailyCount::new(days_ago(0), 1)]
        );

        assert!(in_window(&days_ago(30), today()));
        assert!(!in_window(&days_ago(31), today()));
        assert!(!in_window(&format_date(today() + Duration::days(1)), today()));
    }

    #[test]
    fn test_received_outside_window_is_dropped() {
        let current = vec![DailyCount::new(days_ago(2), 2)];
        let merged = aggregate_and_filter(&current, &DailyCount::new(days_ago(40), 1), today());
        assert_eq!(merged, vec![DailyCount::new(days_ago(2), 2)]);
    }

    #[test]
    fn test_duplicate_dates_keep_first() {
        let current = vec![
            DailyCount::new(days_ago(2), 2),
            DailyCount::new(days_ago(2), 20),
        ];
        let merged = aggregate_and_filter(&current, &DailyCount::new(days_ago(1), 1), today());
        assert_eq!(
            merged,
            vec![DailyCount::new(days_ago(2), 2), DailyCount::new(days_ago(1), 1)]
        );
    }

    #[test]
    fn test_inputs_not_mutated_and_idempotent() {
        let current = vec![DailyCount::new(days_ago(2), 2)];
        let received = DailyCount::new(days_ago(1), 4);
        let once = aggregate_and_filter(&current, &received, today());
        let twice = aggregate_and_filter(&once, &received, today());
        assert_eq!(once, twice);
        assert_eq!(current, vec![DailyCount::new(days_ago(2), 2)]);
    }

    #[test]
    fn test_sum_in_window() {
        let counts = vec![
            DailyCount::new(days_ago(45), 100),
            DailyCount::new(days_ago(30), 3),
            DailyCount::new(days_ago(0), 4),
        ];
        assert_eq!(sum_in_window(&counts, today()), 7);
        assert_eq!(sum_in_window(&[], today()), 0);
    }

    #[test]
    fn test_parse_date_rejects_other_formats() {
        assert!(parse_date("2024-03-31").is_ok());
        assert!(parse_date("03/31/2024").is_err());
    }
}
