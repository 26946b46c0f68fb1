//! Sort-interval buffering: "if a sort interval is set, results are
//! buffered per bucket (minute/hour/day/month/year) and each bucket is
//! sorted internally before being released, instead of requiring the whole
//! result set to be held in memory at once." Since [`super::evaluate`]
//! already materializes its full result vector, bucketing here reduces to
//! a stable sort keyed on `(bucket start, reftime)` — the released order
//! is identical to what true streaming buffering would produce.

use crate::index::Row;
use crate::types::Time;

use super::QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortInterval {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl SortInterval {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "minute" => SortInterval::Minute,
            "hour" => SortInterval::Hour,
            "day" => SortInterval::Day,
            "month" => SortInterval::Month,
            "year" => SortInterval::Year,
            _ => return None,
        })
    }

    /// Truncates `t` down to the start of its containing bucket.
    pub fn bucket(self, t: Time) -> Time {
        match self {
            SortInterval::Minute => Time::new(t.year, t.month, t.day, t.hour, t.minute, 0),
            SortInterval::Hour => Time::new(t.year, t.month, t.day, t.hour, 0, 0),
            SortInterval::Day => Time::new(t.year, t.month, t.day, 0, 0, 0),
            SortInterval::Month => t.start_of_month(),
            SortInterval::Year => Time::new(t.year, 1, 1, 0, 0, 0),
        }
    }
}

/// The reftime instant a row sorts by — its interval's start, or the UNIX
/// epoch for the (spec-disallowed, but defensively handled) case of a
/// record with no reftime at all.
pub fn reftime_key(row: &Row) -> Time {
    row.metadata
        .reftime()
        .map(|r| r.interval().start)
        .unwrap_or(Time::new(1970, 1, 1, 0, 0, 0))
}

pub fn sort_results(results: &mut [QueryResult], interval: SortInterval) {
    results.sort_by(|a, b| {
        let ka = reftime_key(&a.row);
        let kb = reftime_key(&b.row);
        interval
            .bucket(ka)
            .cmp(&interval.bucket(kb))
            .then_with(|| ka.cmp(&kb))
    });
}
