//! End-to-end worked scenarios over a [`Pool`], generalizing a
//! single-engine restart test to the dataset engine's own lifecycle:
//! acquire, duplicate/replace policy, query, repack, and checker state
//! detection across a `daily`-stepped `iseg` dataset plus its
//! `error`/`duplicates` glue members.

use arki_core::dispatch::RouteOutcome;
use arki_core::matcher::Matcher;
use arki_core::metadata::{Metadata, Source};
use arki_core::pool::Pool;
use arki_core::segment::State;
use arki_core::types::{Code, Reftime, Time, Value};
use arki_core::Summary;

fn sections(daily_dir: &std::path::Path, replace: &str) -> String {
    format!(
        "[daily]\ntype = iseg\nformat = grib\nstep = daily\nunique = reftime\nreplace = {replace}\npath = {}\n\n\
         [error]\ntype = discard\n\n[duplicates]\ntype = discard\n",
        daily_dir.display()
    )
}

fn record_with_usn(day: u8, usn: Option<i64>) -> Metadata {
    let mut md = Metadata::with_source(Source::Inline(format!("payload-{day}").into_bytes()));
    md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, day, 0, 0, 0))));
    if let Some(usn) = usn {
        md.add_note(format!("usn={usn}"));
    }
    md
}

#[test]
fn daily_dataset_create_acquire_and_query_roundtrips() {
    let root = tempfile::tempdir().unwrap();
    let daily_dir = root.path().join("daily");
    let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir, "never")).unwrap();

    let outcome = pool.acquire(record_with_usn(15, None)).unwrap();
    assert_eq!(outcome.outcome, RouteOutcome::Accepted("daily".into()));

    let results = pool.query_metadata("daily", &Matcher::empty(), None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].row.metadata.get(Code::Reftime), Some(&Value::Reftime(Reftime::Position(Time::new(2024, 1, 15, 0, 0, 0)))));
}

#[test]
fn duplicate_under_never_is_rejected_and_original_survives() {
    let root = tempfile::tempdir().unwrap();
    let daily_dir = root.path().join("daily");
    let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir, "never")).unwrap();

    pool.acquire(record_with_usn(15, None)).unwrap();
    let second = pool.acquire(record_with_usn(15, None)).unwrap();
    assert_eq!(second.outcome, RouteOutcome::Duplicate("daily".into()));

    let results = pool.query_metadata("daily", &Matcher::empty(), None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].row.metadata.source, Source::Inline(b"payload-15".to_vec()));
}

#[test]
fn replace_higher_usn_keeps_the_newer_record_only() {
    let root = tempfile::tempdir().unwrap();
    let daily_dir = root.path().join("daily");
    let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir, "higher_usn")).unwrap();

    pool.acquire(record_with_usn(15, Some(1))).unwrap();
    let newer = pool.acquire(record_with_usn(15, Some(2))).unwrap();
    assert_eq!(newer.outcome, RouteOutcome::Accepted("daily".into()));
    let older = pool.acquire(record_with_usn(15, Some(1))).unwrap();
    assert_eq!(older.outcome, RouteOutcome::Duplicate("daily".into()));

    let results = pool.query_metadata("daily", &Matcher::empty(), None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].row.metadata.source, Source::Inline(b"payload-15".to_vec()));
}

#[test]
fn repack_after_a_replace_reclaims_the_superseded_row() {
    let root = tempfile::tempdir().unwrap();
    let daily_dir = root.path().join("daily");
    let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir, "always")).unwrap();

    pool.acquire(record_with_usn(15, None)).unwrap();
    pool.acquire(record_with_usn(15, None)).unwrap();

    let relpath = std::path::PathBuf::from("2024/01-15");
    let states = pool.checker_scan("daily", Time::new(2024, 1, 16, 0, 0, 0)).unwrap();
    assert_eq!(states[&relpath], State::Dirty);

    pool.checker_repack("daily", &relpath).unwrap();
    let states_after = pool.checker_scan("daily", Time::new(2024, 1, 16, 0, 0, 0)).unwrap();
    assert_eq!(states_after[&relpath], State::Ok);

    let results = pool.query_metadata("daily", &Matcher::empty(), None).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn summary_stays_coherent_across_two_segments() {
    let root = tempfile::tempdir().unwrap();
    let daily_dir = root.path().join("daily");
    let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir, "never")).unwrap();

    pool.acquire(record_with_usn(15, None)).unwrap();
    pool.acquire(record_with_usn(16, None)).unwrap();

    let summary = pool.query_summary("daily", &Matcher::empty()).unwrap();
    let mut expected = Summary::new();
    expected.add(&record_with_usn(15, None));
    expected.add(&record_with_usn(16, None));
    assert_eq!(summary.total(), expected.total());
}

#[test]
fn checker_detects_a_segment_present_only_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let daily_dir = root.path().join("daily");
    let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir, "never")).unwrap();
    pool.acquire(record_with_usn(15, None)).unwrap();

    // Write a data file directly for a day the dataset never indexed,
    // simulating a scan that wrote bytes but crashed before indexing them.
    std::fs::create_dir_all(daily_dir.join("2024")).unwrap();
    std::fs::write(daily_dir.join("2024/01-17.grib"), b"orphaned-bytes").unwrap();

    let states = pool.checker_scan("daily", Time::new(2024, 1, 18, 0, 0, 0)).unwrap();
    assert_eq!(states[&std::path::PathBuf::from("2024/01-17")], State::New);
}

#[test]
fn truncating_a_segment_is_detected_as_unaligned_and_fix_repairs_it() {
    // Spec §8 scenario 6: a segment truncated after it was indexed is
    // detected as Unaligned, and `check(fix=True)` repairs it by
    // truncating the index down to the rows its surviving bytes still
    // back, bringing the segment back to Ok.
    let root = tempfile::tempdir().unwrap();
    let monthly_dir = root.path().join("monthly");
    let cfg = format!(
        "[monthly]\ntype = iseg\nformat = grib\nstep = monthly\nunique = reftime\nreplace = never\npath = {}\n\n\
         [error]\ntype = discard\n\n[duplicates]\ntype = discard\n",
        monthly_dir.display()
    );
    let mut pool = Pool::open_from_sections(root.path(), &cfg).unwrap();

    // Two records land in the same monthly segment, one after another.
    pool.acquire(record_with_usn(15, None)).unwrap();
    pool.acquire(record_with_usn(16, None)).unwrap();

    let relpath = std::path::PathBuf::from("2024/01");
    let data_path = monthly_dir.join("2024/01.grib");
    let original = std::fs::read(&data_path).unwrap();

    // Both messages frame to the same length, so their boundary sits
    // exactly halfway through the file; truncating there drops the
    // second message cleanly, leaving the first fully parseable.
    let boundary = original.len() / 2;
    std::fs::write(&data_path, &original[..boundary]).unwrap();

    let now = Time::new(2024, 2, 1, 0, 0, 0);
    let states = pool.checker_scan("monthly", now).unwrap();
    assert_eq!(states[&relpath], State::Unaligned);

    let results_before = pool.query_metadata("monthly", &Matcher::empty(), None).unwrap();
    assert_eq!(results_before.len(), 2, "scanning alone must not mutate the index");

    let fixed = pool.check("monthly", now, true).unwrap();
    assert_eq!(fixed[&relpath], State::Ok);

    let results_after = pool.query_metadata("monthly", &Matcher::empty(), None).unwrap();
    assert_eq!(results_after.len(), 1);
    assert_eq!(results_after[0].row.metadata.source, Source::Inline(b"payload-15".to_vec()));
}
