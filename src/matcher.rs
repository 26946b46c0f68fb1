//! The compiled query predicate behind the matcher expression grammar.
//!
//! The full per-style sub-grammars (`origin:GRIB1,200`, `area:bbox
//! intersects POLYGON(...)`, the alias database) belong to the external
//! matcher/alias collaborator. What lives here is
//! the compiled predicate shape the rest of the engine is built against
//! (`Matcher::accepts`, reftime-interval extraction for segment pruning,
//! per-dimension decomposition for index lookup) plus a minimal
//! convenience parser covering the literal clause forms used in the
//! worked scenarios (`reftime:>=...,<=...`, `origin:GRIB1,200,0,1`, plain
//! equality for scalar dimensions).

use std::cmp::Ordering;

use crate::error::{ArkError, Result};
use crate::metadata::Metadata;
use crate::types::{Code, Interval, Time, Value};

/// One dimension's predicate within a matcher.
#[derive(Debug, Clone)]
pub enum DimMatch {
    /// Exact value equality (style and payload both compared).
    Exact(Value),
    /// `reftime` comparison operators, ANDed together; `None` bound means
    /// unbounded on that side.
    Reftime { ge: Option<Time>, lt: Option<Time> },
}

impl DimMatch {
    fn accepts(&self, value: Option<&Value>) -> bool {
        match self {
            DimMatch::Exact(want) => value.map(|v| v.compare(want) == Ordering::Equal).unwrap_or(false),
            DimMatch::Reftime { ge, lt } => {
                let interval = match value {
                    Some(Value::Reftime(r)) => r.interval(),
                    _ => return false,
                };
                ge.map(|bound| interval.start >= bound).unwrap_or(true)
                    && lt.map(|bound| interval.start < bound).unwrap_or(true)
            }
        }
    }
}

/// A compiled, ANDed set of per-dimension clauses ("a semicolon-
/// separated list of `dimension:expr` clauses; clauses are ANDed. ...
/// Empty matcher matches all.").
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    clauses: Vec<(Code, DimMatch)>,
}

impl Matcher {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(clauses: Vec<(Code, DimMatch)>) -> Self {
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(Code, DimMatch)] {
        &self.clauses
    }

    /// Whether `md` satisfies every clause ("matcher idempotence" relies
    /// on this being a pure, side-effect-free predicate).
    pub fn accepts(&self, md: &Metadata) -> bool {
        self.clauses.iter().all(|(code, m)| m.accepts(md.get(*code)))
    }

    /// The reftime span this matcher restricts results to, if any — used
    /// by the query evaluator to prune candidate segments (step 1-2)
    /// before touching the index.
    pub fn reftime_interval(&self) -> Option<Interval> {
        self.clauses.iter().find_map(|(code, m)| {
            if *code != Code::Reftime {
                return None;
            }
            match m {
                DimMatch::Reftime { ge, lt } => Some(Interval::new(
                    ge.unwrap_or(Time::new(1, 1, 1, 0, 0, 0)),
                    lt.unwrap_or(Time::new(9999, 12, 31, 23, 59, 59)),
                )),
                DimMatch::Exact(Value::Reftime(r)) => Some(r.interval()),
                DimMatch::Exact(_) => None,
            }
        })
    }

    /// The clauses that apply to one indexed dimension other than reftime,
    /// for the index lookup half of query compilation ("the matcher
    /// is split into per-dimension predicates").
    pub fn clause_for(&self, code: Code) -> Option<&DimMatch> {
        self.clauses.iter().find(|(c, _)| *c == code).map(|(_, m)| m)
    }

    /// Whether a dimension tuple satisfies this matcher's non-reftime
    /// clauses, `get` being a lookup into whatever keyed shape holds the
    /// dimensions (e.g. a summary trie's `Key`). Reftime is excluded here
    /// because a [`crate::metadata::Summary`] key carries no reftime
    /// dimension — callers apply the reftime restriction separately, by
    /// choosing which months' cached summaries to union in the first
    /// place.
    pub fn accepts_dims(&self, get: impl Fn(Code) -> Option<Value>) -> bool {
        self.clauses
            .iter()
            .filter(|(code, _)| *code != Code::Reftime)
            .all(|(code, m)| m.accepts(get(*code).as_ref()))
    }

    /// Parses the literal clause grammar demonstrated in the worked
    /// scenarios: `dimension:expr;dimension:expr`. `reftime` accepts
    /// a comma-separated list of `>=`/`<=`/`=`/`>`/`<` bounds against an
    /// ISO-8601 instant; every other dimension is parsed with
    /// [`Value::parse`] for plain equality. The full style-specific
    /// sub-grammars remain the external collaborator's job.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        for clause in expr.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let (dim, rhs) = clause
                .split_once(':')
                .ok_or_else(|| ArkError::Matcher(format!("clause missing ':': '{clause}'")))?;
            let code = Code::from_name(dim.trim())
                .ok_or_else(|| ArkError::Matcher(format!("unknown dimension '{dim}'")))?;
            if code == Code::Reftime {
                clauses.push((code, parse_reftime_expr(rhs.trim())?));
            } else {
                let value = Value::parse(code, rhs.trim())
                    .map_err(|e| ArkError::Matcher(format!("dimension '{dim}': {e}")))?;
                clauses.push((code, DimMatch::Exact(value)));
            }
        }
        Ok(Self { clauses })
    }
}

fn parse_reftime_expr(expr: &str) -> Result<DimMatch> {
    let mut ge = None;
    let mut lt = None;
    for term in expr.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (op, rest) = if let Some(r) = term.strip_prefix(">=") {
            (">=", r)
        } else if let Some(r) = term.strip_prefix("<=") {
            ("<=", r)
        } else if let Some(r) = term.strip_prefix('>') {
            (">", r)
        } else if let Some(r) = term.strip_prefix('<') {
            ("<", r)
        } else if let Some(r) = term.strip_prefix('=') {
            ("=", r)
        } else {
            ("=", term)
        };
        let t = Time::parse_iso8601(rest.trim())?;
        match op {
            ">=" => ge = Some(ge.map_or(t, |cur: Time| cur.max(t))),
            ">" => ge = Some(ge.map_or(t.next_second(), |cur: Time| cur.max(t.next_second()))),
            "<=" => lt = Some(lt.map_or(t.next_second(), |cur: Time| cur.min(t.next_second()))),
            "<" => lt = Some(lt.map_or(t, |cur: Time| cur.min(t))),
            "=" => {
                ge = Some(t);
                lt = Some(t.next_second());
            }
            _ => unreachable!(),
        }
    }
    Ok(DimMatch::Reftime { ge, lt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;
    use crate::types::Reftime;

    fn md_at(y: i32, m: u8, d: u8) -> Metadata {
        let mut md = Metadata::with_source(Source::Inline(vec![0; 4]));
        md.set(Value::Reftime(Reftime::Position(Time::new(y, m, d, 0, 0, 0))));
        md
    }

    #[test]
    fn empty_matcher_accepts_everything() {
        assert!(Matcher::empty().accepts(&md_at(2024, 1, 15)));
    }

    #[test]
    fn reftime_exact_day_matches_only_that_day() {
        let m = Matcher::parse("reftime:=2024-01-15").unwrap();
        assert!(m.accepts(&md_at(2024, 1, 15)));
        assert!(!m.accepts(&md_at(2024, 1, 16)));
    }

    #[test]
    fn reftime_range_matches_inclusive_bounds() {
        let m = Matcher::parse("reftime:>=2024-01-10,<=2024-01-12").unwrap();
        assert!(m.accepts(&md_at(2024, 1, 10)));
        assert!(m.accepts(&md_at(2024, 1, 12)));
        assert!(!m.accepts(&md_at(2024, 1, 13)));
    }

    #[test]
    fn matcher_idempotence() {
        let m = Matcher::parse("reftime:>=2024-01-10,<=2024-01-12").unwrap();
        let mds = vec![md_at(2024, 1, 10), md_at(2024, 1, 13)];
        let once: Vec<_> = mds.iter().filter(|md| m.accepts(md)).collect();
        let twice: Vec<_> = once.iter().copied().filter(|md| m.accepts(md)).collect();
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn ands_multiple_clauses() {
        let m = Matcher::parse("reftime:=2024-01-15;run:=90").unwrap();
        let mut md = md_at(2024, 1, 15);
        assert!(!m.accepts(&md));
        md.set(Value::Run(crate::types::scalar_dims::Run(90)));
        assert!(m.accepts(&md));
    }
}
