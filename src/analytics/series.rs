use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

/// Months covered by the dashboard charts, current month included
pub const TRAILING_MONTHS: usize = 12;

/// Calendar month as `year * 12 + month0`
pub fn month_key(at: DateTime<Utc>) -> i32 {
    at.year() * 12 + at.month0() as i32
}

fn first_of_month(key: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(key.div_euclid(12), key.rem_euclid(12) as u32 + 1, 1)
}

/// One calendar month of a trailing series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBucket {
    #[serde(skip)]
    pub key: i32,
    /// Short month name, e.g. "Mar"
    pub month: String,
    /// Month and year, e.g. "Mar 2024"
    pub label: String,
    pub count: u64,
    pub total: f64,
}

/// A run of consecutive months ending with the current one, oldest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSeries {
    pub buckets: Vec<MonthBucket>,
}

impl MonthSeries {
    /// Empty series covering `months` months up to and including `now`'s month
    pub fn trailing(now: DateTime<Utc>, months: usize) -> Self {
        let current = month_key(now);
        let buckets = (0..months as i32)
            .rev()
            .map(|back| {
                let key = current - back;
                let (month, label) = first_of_month(key)
                    .map(|d| (d.format("%b").to_string(), d.format("%b %Y").to_string()))
                    .unwrap_or_default();
                MonthBucket {
                    key,
                    month,
                    label,
                    count: 0,
                    total: 0.0,
                }
            })
            .collect();

        Self { buckets }
    }

    /// Adds one record at `at` carrying `amount`.
    ///
    /// Returns false when the month falls outside the series.
    pub fn record(&mut self, at: DateTime<Utc>, amount: f64) -> bool {
        let key = month_key(at);
        let Some(first) = self.buckets.first().map(|b| b.key) else {
            return false;
        };

        match usize::try_from(key - first).ok().and_then(|i| self.buckets.get_mut(i)) {
            Some(bucket) => {
                bucket.count += 1;
                bucket.total += amount;
                true
            }
            None => false,
        }
    }

    /// Counts one record per timestamp. `None` timestamps are skipped.
    pub fn count_dates<I>(now: DateTime<Utc>, months: usize, dates: I) -> Self
    where
        I: IntoIterator<Item = Option<DateTime<Utc>>>,
    {
        let mut series = Self::trailing(now, months);
        for at in dates.into_iter().flatten() {
            series.record(at, 0.0);
        }
        series
    }

    pub fn counts(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.count).collect()
    }

    pub fn totals(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.total).collect()
    }

    /// Sum of totals over the newest `months` buckets
    pub fn recent_total(&self, months: usize) -> f64 {
        self.buckets.iter().rev().take(months).map(|b| b.total).sum()
    }

    /// Sum of totals over the `months` buckets before the newest `months`
    pub fn previous_total(&self, months: usize) -> Option<f64> {
        if self.buckets.len() < months * 2 {
            return None;
        }
        Some(
            self.buckets
                .iter()
                .rev()
                .skip(months)
                .take(months)
                .map(|b| b.total)
                .sum(),
        )
    }

    /// Newest `months` buckets as their own series
    pub fn tail(&self, months: usize) -> Self {
        let skip = self.buckets.len().saturating_sub(months);
        Self {
            buckets: self.buckets[skip..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn trailing_series_crosses_year_boundary() {
        let series = MonthSeries::trailing(date(2024, 2, 10), 12);
        assert_eq!(series.buckets.len(), 12);
        assert_eq!(series.buckets[0].label, "Mar 2023");
        assert_eq!(series.buckets[11].label, "Feb 2024");
        assert_eq!(series.buckets[10].month, "Jan");
    }

    #[test]
    fn records_land_in_their_calendar_month() {
        let now = date(2024, 2, 10);
        let series = MonthSeries::count_dates(
            now,
            12,
            vec![
                Some(date(2024, 2, 1)),
                Some(date(2024, 1, 31)),
                Some(date(2023, 3, 1)),
                // Same month number a year earlier is out of range
                Some(date(2023, 2, 20)),
                // Future months are ignored
                Some(date(2024, 3, 1)),
                None,
            ],
        );
        let counts = series.counts();
        assert_eq!(counts[11], 1);
        assert_eq!(counts[10], 1);
        assert_eq!(counts[0], 1);
        assert_eq!(counts.iter().sum::<u64>(), 3);
    }

    #[test]
    fn totals_and_windows() {
        let now = date(2024, 6, 15);
        let mut series = MonthSeries::trailing(now, 24);
        series.record(date(2024, 6, 1), 100.0);
        series.record(date(2024, 5, 1), 50.0);
        series.record(date(2024, 4, 1), 25.0);
        series.record(date(2023, 6, 1), 10.0);

        assert_eq!(series.recent_total(1), 100.0);
        assert_eq!(series.previous_total(1), Some(50.0));
        assert_eq!(series.recent_total(3), 175.0);
        assert_eq!(series.previous_total(12), Some(10.0));
        assert_eq!(series.tail(12).recent_total(12), 175.0);
        assert_eq!(series.tail(12).previous_total(12), None);
    }
}
