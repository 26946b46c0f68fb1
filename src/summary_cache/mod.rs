//! Month-bucketed summary cache: "a per-dataset directory holds one
//! cached `Summary` per calendar month plus an `all.summary` for the
//! dataset lifetime. Writes are atomic ... Reads are lock-free: a stale
//! cache is at worst a superset and is re-filtered."
//!
//! The atomic write-to-temp-then-rename idiom is the same one
//! [`crate::segment::file_segment`]'s writer uses for segment commits.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::matcher::Matcher;
use crate::metadata::Summary;
use crate::types::{Interval, Time};

pub struct SummaryCache {
    dir: PathBuf,
}

fn month_key(year: i32, month: u8) -> String {
    format!("{year:04}-{month:02}")
}

impl SummaryCache {
    pub fn open(dataset_dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dataset_dir.into().join(".summaries");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn month_path(&self, year: i32, month: u8) -> PathBuf {
        self.dir.join(format!("{}.summary", month_key(year, month)))
    }

    fn all_path(&self) -> PathBuf {
        self.dir.join("all.summary")
    }

    pub fn get_month(&self, year: i32, month: u8) -> Result<Option<Summary>> {
        let path = self.month_path(year, month);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Summary::decode(&fs::read(path)?)?))
    }

    pub fn put_month(&self, year: i32, month: u8, summary: &Summary) -> Result<()> {
        atomic_write(&self.month_path(year, month), &summary.encode())
    }

    pub fn get_all(&self) -> Result<Option<Summary>> {
        let path = self.all_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Summary::decode(&fs::read(path)?)?))
    }

    pub fn put_all(&self, summary: &Summary) -> Result<()> {
        atomic_write(&self.all_path(), &summary.encode())
    }

    /// Cache invalidation is by touch: delete every monthly file
    /// whose span intersects `touched`, plus `all.summary`. The reader
    /// reconstructs missing months on next access by re-scanning the
    /// affected segments' indices.
    pub fn invalidate(&self, touched: Interval) -> Result<()> {
        let mut cursor = touched.start.start_of_month();
        while cursor < touched.end {
            let _ = fs::remove_file(self.month_path(cursor.year, cursor.month));
            cursor = cursor.start_of_next_month();
        }
        let _ = fs::remove_file(self.all_path());
        Ok(())
    }

    /// Every calendar month overlapping `span`, in chronological order.
    pub fn months_in(span: Interval) -> Vec<(i32, u8)> {
        let mut out = Vec::new();
        let mut cursor = span.start.start_of_month();
        while cursor < span.end {
            out.push((cursor.year, cursor.month));
            cursor = cursor.start_of_next_month();
        }
        if out.is_empty() {
            out.push((span.start.year, span.start.month));
        }
        out
    }

    /// Answers a summary query (`query_summary`): use the whole-
    /// dataset cache when the matcher carries no reftime restriction,
    /// otherwise union the matcher's covered months, rebuilding any that
    /// are missing via `rebuild_month` (a per-month re-scan of the
    /// segments it covers); either way, `filter` the result through the
    /// matcher's non-reftime clauses before returning it, so e.g. an
    /// `origin:...` restriction isn't silently dropped.
    pub fn query_summary(
        &self,
        matcher: &Matcher,
        rebuild_month: impl Fn(i32, u8) -> Result<Summary>,
    ) -> Result<Summary> {
        let accept = |key: &crate::metadata::summary::Key| matcher.accepts_dims(|code| key.get(&code).cloned());

        let months = match matcher.reftime_interval() {
            Some(interval) => Self::months_in(interval),
            None => {
                return Ok(match self.get_all()? {
                    Some(all) => all.filter(accept),
                    None => Summary::new(),
                });
            }
        };

        let mut union = Summary::new();
        for (year, month) in months {
            let summary = match self.get_month(year, month)? {
                Some(s) => s,
                None => {
                    let s = rebuild_month(year, month)?;
                    self.put_month(year, month, &s)?;
                    s
                }
            };
            union.add_summary(&summary);
        }
        Ok(union.filter(accept))
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;
    use crate::types::{Reftime, Value};
    use crate::metadata::Metadata;

    fn md_at(t: Time) -> Metadata {
        let mut md = Metadata::with_source(Source::Inline(vec![0u8; 5]));
        md.set(Value::Reftime(Reftime::Position(t)));
        md
    }

    fn md_at_with_origin(t: Time, origin: crate::types::origin::Origin) -> Metadata {
        let mut md = md_at(t);
        md.set(Value::Origin(origin));
        md
    }

    #[test]
    fn months_in_spans_calendar_boundaries() {
        let span = Interval::new(Time::new(2024, 1, 20, 0, 0, 0), Time::new(2024, 3, 5, 0, 0, 0));
        let months = SummaryCache::months_in(span);
        assert_eq!(months, vec![(2024, 1), (2024, 2), (2024, 3)]);
    }

    #[test]
    fn invalidate_removes_only_touched_months() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::open(dir.path()).unwrap();
        let mut jan = Summary::new();
        jan.add(&md_at(Time::new(2024, 1, 10, 0, 0, 0)));
        let mut feb = Summary::new();
        feb.add(&md_at(Time::new(2024, 2, 10, 0, 0, 0)));
        cache.put_month(2024, 1, &jan).unwrap();
        cache.put_month(2024, 2, &feb).unwrap();
        cache.put_all(&Summary::merge(&jan, &feb)).unwrap();

        cache
            .invalidate(Interval::new(Time::new(2024, 1, 1, 0, 0, 0), Time::new(2024, 2, 1, 0, 0, 0)))
            .unwrap();

        assert!(cache.get_month(2024, 1).unwrap().is_none());
        assert!(cache.get_month(2024, 2).unwrap().is_some());
        assert!(cache.get_all().unwrap().is_none());
    }

    #[test]
    fn query_summary_rebuilds_missing_months_and_caches_them() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::open(dir.path()).unwrap();
        let matcher = Matcher::parse("reftime:>=2024-01-01,<2024-02-01").unwrap();
        let mut calls = 0;
        let result = cache
            .query_summary(&matcher, |y, m| {
                calls += 1;
                let mut s = Summary::new();
                s.add(&md_at(Time::new(y, m, 15, 0, 0, 0)));
                Ok(s)
            })
            .unwrap();
        assert_eq!(result.total().count, 1);
        assert_eq!(calls, 1);
        // Second call hits the now-populated cache file.
        let result2 = cache.query_summary(&matcher, |_, _| panic!("should not rebuild")).unwrap();
        assert_eq!(result2.total().count, 1);
    }

    #[test]
    fn query_summary_applies_non_reftime_clauses_to_the_unioned_months() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::open(dir.path()).unwrap();
        let wanted = crate::types::origin::Origin::Grib1 { centre: 200, subcentre: 0, process: 1 };
        let other = crate::types::origin::Origin::Grib1 { centre: 201, subcentre: 0, process: 1 };
        let matcher = Matcher::parse("reftime:>=2024-01-01,<2024-03-01;origin:GRIB1,200,0,1").unwrap();

        let result = cache
            .query_summary(&matcher, |y, m| {
                let mut s = Summary::new();
                s.add(&md_at_with_origin(Time::new(y, m, 10, 0, 0, 0), wanted.clone()));
                s.add(&md_at_with_origin(Time::new(y, m, 20, 0, 0, 0), other.clone()));
                Ok(s)
            })
            .unwrap();

        // Two months each contributed one matching-origin record and one
        // mismatched one; only the matching ones should survive the filter.
        assert_eq!(result.total().count, 2);
        let expected = Value::Origin(wanted);
        for (key, _) in result.visit() {
            assert_eq!(key.get(&crate::types::Code::Origin), Some(&expected));
        }
    }

    #[test]
    fn query_summary_with_no_reftime_restriction_still_filters_other_clauses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::open(dir.path()).unwrap();
        let wanted = crate::types::origin::Origin::Grib1 { centre: 200, subcentre: 0, process: 1 };
        let other = crate::types::origin::Origin::Grib1 { centre: 201, subcentre: 0, process: 1 };

        let mut all = Summary::new();
        all.add(&md_at_with_origin(Time::new(2024, 1, 10, 0, 0, 0), wanted));
        all.add(&md_at_with_origin(Time::new(2024, 2, 10, 0, 0, 0), other));
        cache.put_all(&all).unwrap();

        let matcher = Matcher::parse("origin:GRIB1,200,0,1").unwrap();
        let result = cache.query_summary(&matcher, |_, _| panic!("should use the whole-dataset cache")).unwrap();
        assert_eq!(result.total().count, 1);
    }
}
