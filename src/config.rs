//! Dataset configuration: the ini-like section file parsed into a
//! validated struct per dataset `type` ("builders for
//! configuration replace free-form key/value soup").
//!
//! Grounded on a tuned-struct-behind-a-builder idiom; the ini grammar
//! itself has no crate backing it (`rust-ini`/`configparser` appear
//! nowhere), so it is hand-rolled the same way the rest of this crate
//! hand-rolls its own binary formats.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ArkError, Result};
use crate::types::Code;

/// `type` config key: which dataset engine variant backs this section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetType {
    Simple,
    Iseg,
    Ondisk2,
    Outbound,
    Discard,
    Empty,
    Http,
}

impl DatasetType {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "simple" => DatasetType::Simple,
            "iseg" => DatasetType::Iseg,
            "ondisk2" => DatasetType::Ondisk2,
            "outbound" => DatasetType::Outbound,
            "discard" => DatasetType::Discard,
            "empty" => DatasetType::Empty,
            "remote" | "http" => DatasetType::Http,
            other => return Err(ArkError::Config(format!("unknown dataset type '{other}'"))),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            DatasetType::Simple => "simple",
            DatasetType::Iseg => "iseg",
            DatasetType::Ondisk2 => "ondisk2",
            DatasetType::Outbound => "outbound",
            DatasetType::Discard => "discard",
            DatasetType::Empty => "empty",
            DatasetType::Http => "remote",
        }
    }

    /// Whether this variant owns local segments at all; the
    /// glue variants (`outbound`, `discard`, `empty`, `http`) don't.
    pub fn is_segmented(self) -> bool {
        matches!(self, DatasetType::Simple | DatasetType::Iseg | DatasetType::Ondisk2)
    }
}

/// `step` config key: the temporal bucket mapping a reftime to a segment
/// relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Yearly,
    Monthly,
    Biweekly,
    Weekly,
    Daily,
    Singlefile,
}

impl Step {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "yearly" => Step::Yearly,
            "monthly" => Step::Monthly,
            "biweekly" => Step::Biweekly,
            "weekly" => Step::Weekly,
            "daily" => Step::Daily,
            "singlefile" => Step::Singlefile,
            other => return Err(ArkError::Config(format!("unknown step scheme '{other}'"))),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Yearly => "yearly",
            Step::Monthly => "monthly",
            Step::Biweekly => "biweekly",
            Step::Weekly => "weekly",
            Step::Daily => "daily",
            Step::Singlefile => "singlefile",
        }
    }

    /// The segment relative path (without format extension) a given
    /// reftime instant buckets into, e.g. `daily` -> `2024/01-15`.
    pub fn relpath(self, t: crate::types::Time) -> PathBuf {
        match self {
            Step::Yearly => PathBuf::from(format!("{:04}", t.year)),
            Step::Monthly => PathBuf::from(format!("{:04}/{:02}", t.year, t.month)),
            Step::Weekly | Step::Biweekly => {
                let week = ((t.day as u32 - 1) / if self == Step::Weekly { 7 } else { 14 }) + 1;
                PathBuf::from(format!("{:04}/{:02}-w{:02}", t.year, t.month, week))
            }
            Step::Daily => PathBuf::from(format!("{:04}/{:02}-{:02}", t.year, t.month, t.day)),
            Step::Singlefile => PathBuf::from("all"),
        }
    }

    /// The segment's allowed reftime span, given any instant inside it —
    /// used both to name the segment (`relpath`) and to bound it for the
    /// checker's `SegmentState::allowed`.
    pub fn interval(self, t: crate::types::Time) -> crate::types::Interval {
        use crate::types::{Interval, Time};
        match self {
            Step::Yearly => Interval::new(Time::new(t.year, 1, 1, 0, 0, 0), Time::new(t.year + 1, 1, 1, 0, 0, 0)),
            Step::Monthly => Interval::new(t.start_of_month(), t.start_of_month().start_of_next_month()),
            Step::Weekly | Step::Biweekly => {
                let span_days = if self == Step::Weekly { 7 } else { 14 };
                let start_day = ((t.day as u32 - 1) / span_days) * span_days + 1;
                let start = Time::new(t.year, t.month, start_day as u8, 0, 0, 0);
                let end = start.start_of_next_month().min(Time::new(
                    t.year,
                    t.month,
                    (start_day + span_days).min(28) as u8,
                    0,
                    0,
                    0,
                ));
                Interval::new(start, end)
            }
            Step::Daily => {
                let start = Time::new(t.year, t.month, t.day, 0, 0, 0);
                let end = Time::new(t.year, t.month, t.day, 23, 59, 59);
                Interval::new(start, end)
            }
            Step::Singlefile => Interval::new(Time::new(1, 1, 1, 0, 0, 0), Time::new(9999, 12, 31, 23, 59, 59)),
        }
    }

    /// Recovers a representative instant inside the segment named
    /// `relpath`, the inverse of [`Step::relpath`] — used by the checker
    /// to bound a segment that has bytes on disk but no index entry
    /// yet, where there is no stored reftime to consult. Week buckets
    /// recover only the month, since the relpath's `wNN` suffix marks a
    /// week-of-month counter rather than a calendar day — close enough for
    /// age-threshold comparisons, which is the only thing this feeds.
    pub fn parse_relpath(self, relpath: &std::path::Path) -> Option<crate::types::Time> {
        use crate::types::Time;
        let s = relpath.to_string_lossy();
        match self {
            Step::Singlefile => Some(Time::new(1, 1, 1, 0, 0, 0)),
            Step::Yearly => s.parse::<i32>().ok().map(|y| Time::new(y, 1, 1, 0, 0, 0)),
            Step::Monthly => {
                let (y, m) = s.split_once('/')?;
                Some(Time::new(y.parse().ok()?, m.parse().ok()?, 1, 0, 0, 0))
            }
            Step::Weekly | Step::Biweekly => {
                let (y, rest) = s.split_once('/')?;
                let m = rest.split('-').next()?;
                Some(Time::new(y.parse().ok()?, m.parse().ok()?, 1, 0, 0, 0))
            }
            Step::Daily => {
                let (y, rest) = s.split_once('/')?;
                let (m, d) = rest.split_once('-')?;
                Some(Time::new(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?, 0, 0, 0))
            }
        }
    }

    /// Every candidate segment relpath that could hold a message inside
    /// `span` — used by the query evaluator to prune which segments to
    /// visit (step 2) without opening any of them.
    pub fn candidates(self, span: crate::types::Interval) -> Vec<PathBuf> {
        if self == Step::Singlefile {
            return vec![self.relpath(span.start)];
        }
        let mut out = Vec::new();
        let mut cursor = span.start;
        // Half-open interval: stop once the cursor reaches the end instant.
        while cursor < span.end {
            let relpath = self.relpath(cursor);
            if out.last() != Some(&relpath) {
                out.push(relpath.clone());
            }
            cursor = self.interval(cursor).end;
            if out.len() > 100_000 {
                break; // pathological span guard; real datasets never hit this
            }
        }
        if out.is_empty() {
            out.push(self.relpath(span.start));
        }
        out
    }
}

/// `replace` config key: collision policy on unique-key insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceStrategy {
    #[default]
    Never,
    Always,
    HigherUsn,
}

impl ReplaceStrategy {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "never" => ReplaceStrategy::Never,
            "always" => ReplaceStrategy::Always,
            "higher_usn" => ReplaceStrategy::HigherUsn,
            other => return Err(ArkError::Config(format!("unknown replace policy '{other}'"))),
        })
    }
}

/// One dataset's validated configuration ("Dataset configuration").
/// Unknown keys are kept verbatim in `extra` and surface as a warning at
/// load time rather than a hard failure.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
    pub dataset_type: DatasetType,
    pub format: String,
    pub step: Step,
    pub filter: Option<String>,
    pub unique: Vec<Code>,
    pub index: Vec<Code>,
    pub replace: ReplaceStrategy,
    pub archive_age_days: Option<u32>,
    pub delete_age_days: Option<u32>,
    pub postprocess: Vec<String>,
    pub smallfiles: bool,
    pub gz_group_size: usize,
    pub offline: bool,
    pub eatmydata: bool,
    /// Set by the checker's `test_*` operations' guard: those
    /// operations refuse to run unless a dataset opts in to being a test
    /// fixture.
    pub allow_test_ops: bool,
    pub extra: BTreeMap<String, String>,
}

pub struct DatasetConfigBuilder {
    name: String,
    path: PathBuf,
    dataset_type: DatasetType,
    format: String,
    step: Step,
    filter: Option<String>,
    unique: Vec<Code>,
    index: Vec<Code>,
    replace: ReplaceStrategy,
    archive_age_days: Option<u32>,
    delete_age_days: Option<u32>,
    postprocess: Vec<String>,
    smallfiles: bool,
    gz_group_size: usize,
    offline: bool,
    eatmydata: bool,
    allow_test_ops: bool,
    extra: BTreeMap<String, String>,
}

impl DatasetConfigBuilder {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, dataset_type: DatasetType) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            dataset_type,
            format: "grib".into(),
            step: Step::Daily,
            filter: None,
            unique: vec![Code::Reftime, Code::Origin, Code::Product],
            index: vec![Code::Origin, Code::Product, Code::Level],
            replace: ReplaceStrategy::default(),
            archive_age_days: None,
            delete_age_days: None,
            postprocess: Vec::new(),
            smallfiles: false,
            gz_group_size: 1,
            offline: false,
            eatmydata: false,
            allow_test_ops: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn format(mut self, f: impl Into<String>) -> Self {
        self.format = f.into();
        self
    }

    pub fn step(mut self, s: Step) -> Self {
        self.step = s;
        self
    }

    pub fn filter(mut self, f: impl Into<String>) -> Self {
        self.filter = Some(f.into());
        self
    }

    pub fn unique(mut self, codes: Vec<Code>) -> Self {
        self.unique = codes;
        self
    }

    pub fn index(mut self, codes: Vec<Code>) -> Self {
        self.index = codes;
        self
    }

    pub fn replace(mut self, r: ReplaceStrategy) -> Self {
        self.replace = r;
        self
    }

    pub fn archive_age_days(mut self, d: u32) -> Self {
        self.archive_age_days = Some(d);
        self
    }

    pub fn delete_age_days(mut self, d: u32) -> Self {
        self.delete_age_days = Some(d);
        self
    }

    pub fn allow_test_ops(mut self, allow: bool) -> Self {
        self.allow_test_ops = allow;
        self
    }

    pub fn build(self) -> DatasetConfig {
        DatasetConfig {
            name: self.name,
            path: self.path,
            dataset_type: self.dataset_type,
            format: self.format,
            step: self.step,
            filter: self.filter,
            unique: self.unique,
            index: self.index,
            replace: self.replace,
            archive_age_days: self.archive_age_days,
            delete_age_days: self.delete_age_days,
            postprocess: self.postprocess,
            smallfiles: self.smallfiles,
            gz_group_size: self.gz_group_size,
            offline: self.offline,
            eatmydata: self.eatmydata,
            allow_test_ops: self.allow_test_ops,
            extra: self.extra,
        }
    }
}

/// One `[name]` section of an ini-like config file: case-sensitive
/// section names, `key = value` pairs, `#`/`;` line comments, optional
/// quotes around values.
pub fn parse_sections(text: &str) -> Result<Vec<(String, BTreeMap<String, String>)>> {
    let mut sections = Vec::new();
    let mut current: Option<(String, BTreeMap<String, String>)> = None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some((name.to_string(), BTreeMap::new()));
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            ArkError::Config(format!("line {}: expected 'key = value', got '{line}'", lineno + 1))
        })?;
        let key = key.trim().to_string();
        let value = strip_quotes(value.trim());
        match &mut current {
            Some((_, kv)) => {
                kv.insert(key, value);
            }
            None => {
                return Err(ArkError::Config(format!(
                    "line {}: key outside any [section]",
                    lineno + 1
                )))
            }
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }
    Ok(sections)
}

fn strip_comment(line: &str) -> &str {
    let mut end = line.len();
    for (i, c) in line.char_indices() {
        if c == '#' || c == ';' {
            end = i;
            break;
        }
    }
    &line[..end]
}

fn strip_quotes(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Build a [`DatasetConfig`] from one parsed section, given the dataset
/// root directory it lives under.
pub fn config_from_section(name: &str, kv: &BTreeMap<String, String>, path: PathBuf) -> Result<DatasetConfig> {
    let dataset_type = DatasetType::parse(
        kv.get("type")
            .ok_or_else(|| ArkError::Config(format!("dataset '{name}': missing required key 'type'")))?,
    )?;
    let mut builder = DatasetConfigBuilder::new(name, path, dataset_type);
    if let Some(format) = kv.get("format") {
        builder = builder.format(format.clone());
    }
    if let Some(step) = kv.get("step") {
        builder = builder.step(Step::parse(step)?);
    }
    if let Some(filter) = kv.get("filter") {
        builder = builder.filter(filter.clone());
    }
    if let Some(unique) = kv.get("unique") {
        builder = builder.unique(parse_code_list(unique)?);
    }
    if let Some(index) = kv.get("index") {
        builder = builder.index(parse_code_list(index)?);
    }
    if let Some(replace) = kv.get("replace") {
        builder = builder.replace(ReplaceStrategy::parse(replace)?);
    }
    if let Some(age) = kv.get("archive age").and_then(|v| v.parse().ok()) {
        builder = builder.archive_age_days(age);
    }
    if let Some(age) = kv.get("delete age").and_then(|v| v.parse().ok()) {
        builder = builder.delete_age_days(age);
    }
    if let Some(v) = kv.get("allow test ops") {
        builder = builder.allow_test_ops(v == "true" || v == "yes" || v == "1");
    }
    let mut cfg = builder.build();
    for (k, v) in kv {
        if !RECOGNIZED_KEYS.contains(&k.as_str()) {
            tracing::warn!(dataset = name, key = %k, "unrecognized config key; keeping verbatim");
            cfg.extra.insert(k.clone(), v.clone());
        }
    }
    if let Some(v) = kv.get("postprocess") {
        cfg.postprocess = v.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(v) = kv.get("smallfiles") {
        cfg.smallfiles = v == "true" || v == "yes" || v == "1";
    }
    if let Some(v) = kv.get("gz group size").and_then(|v| v.parse().ok()) {
        cfg.gz_group_size = v;
    }
    if let Some(v) = kv.get("offline") {
        cfg.offline = v == "true" || v == "yes" || v == "1";
    }
    if let Some(v) = kv.get("eatmydata") {
        cfg.eatmydata = v == "true" || v == "yes" || v == "1";
    }
    Ok(cfg)
}

const RECOGNIZED_KEYS: &[&str] = &[
    "type",
    "format",
    "step",
    "filter",
    "unique",
    "index",
    "replace",
    "archive age",
    "delete age",
    "postprocess",
    "smallfiles",
    "gz group size",
    "offline",
    "eatmydata",
    "allow test ops",
    "path",
];

fn parse_code_list(s: &str) -> Result<Vec<Code>> {
    s.split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| Code::from_name(c).ok_or_else(|| ArkError::Config(format!("unknown dimension '{c}'"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_section() {
        let text = "\
[daily_grib]
type = iseg
format = grib
step = daily
unique = reftime, origin, product
replace = never
# a comment
; another comment
archive age = 90
";
        let sections = parse_sections(text).unwrap();
        assert_eq!(sections.len(), 1);
        let (name, kv) = &sections[0];
        assert_eq!(name, "daily_grib");
        let cfg = config_from_section(name, kv, PathBuf::from("/data/daily_grib")).unwrap();
        assert_eq!(cfg.dataset_type, DatasetType::Iseg);
        assert_eq!(cfg.step, Step::Daily);
        assert_eq!(cfg.unique, vec![Code::Reftime, Code::Origin, Code::Product]);
        assert_eq!(cfg.archive_age_days, Some(90));
        assert_eq!(cfg.replace, ReplaceStrategy::Never);
    }

    #[test]
    fn quotes_are_stripped() {
        let text = "[x]\ntype = empty\nformat = \"grib\"\n";
        let sections = parse_sections(text).unwrap();
        let cfg = config_from_section("x", &sections[0].1, PathBuf::from("/x")).unwrap();
        assert_eq!(cfg.format, "grib");
    }

    #[test]
    fn unrecognized_key_is_kept_not_rejected() {
        let text = "[x]\ntype = discard\nfrobnicate = yes\n";
        let sections = parse_sections(text).unwrap();
        let cfg = config_from_section("x", &sections[0].1, PathBuf::from("/x")).unwrap();
        assert_eq!(cfg.extra.get("frobnicate"), Some(&"yes".to_string()));
    }

    #[test]
    fn missing_type_is_a_config_error() {
        let text = "[x]\nstep = daily\n";
        let sections = parse_sections(text).unwrap();
        assert!(config_from_section("x", &sections[0].1, PathBuf::from("/x")).is_err());
    }

    #[test]
    fn daily_step_relpath_roundtrips_through_parse_relpath() {
        let t = crate::types::Time::new(2024, 1, 15, 0, 0, 0);
        let relpath = Step::Daily.relpath(t);
        assert_eq!(Step::Daily.parse_relpath(&relpath), Some(t));
    }

    #[test]
    fn daily_step_candidates_span_multiple_days() {
        use crate::types::{Interval, Time};
        let span = Interval::new(Time::new(2024, 1, 15, 0, 0, 0), Time::new(2024, 1, 17, 0, 0, 0));
        let candidates = Step::Daily.candidates(span);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], PathBuf::from("2024/01-15"));
        assert_eq!(candidates[1], PathBuf::from("2024/01-16"));
    }
}
