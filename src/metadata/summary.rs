//! The aggregated-statistics trie: "a trie keyed by the tuple of
//! non-reftime dimensions... mergeable: `merge(a, b)` is associative and
//! commutative."

use std::collections::BTreeMap;

use crate::error::Result;
use crate::metadata::record::Metadata;
use crate::types::codec::{read_varint, write_varint};
use crate::types::structured::Structured;
use crate::types::{Code, Interval, Time, Value};

/// `(count, total_bytes, reftime-interval)` attached to every trie leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub count: u64,
    pub total_bytes: u64,
    pub interval: Option<Interval>,
}

impl Stats {
    pub fn single(bytes: u64, when: Time) -> Self {
        Self {
            count: 1,
            total_bytes: bytes,
            interval: Some(Interval::new(when, when)),
        }
    }

    pub fn merge(&self, other: &Stats) -> Stats {
        Stats {
            count: self.count + other.count,
            total_bytes: self.total_bytes + other.total_bytes,
            interval: match (self.interval, other.interval) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            },
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.count).unwrap();
        write_varint(out, self.total_bytes).unwrap();
        match self.interval {
            Some(i) => {
                out.push(1);
                i.start.encode(out);
                i.end.encode(out);
            }
            None => out.push(0),
        }
    }

    fn decode(cursor: &mut std::io::Cursor<&[u8]>) -> Result<Self> {
        use std::io::Read;
        let count = read_varint(cursor, cursor.position())?;
        let total_bytes = read_varint(cursor, cursor.position())?;
        let mut tag = [0u8; 1];
        cursor.read_exact(&mut tag)?;
        let interval = if tag[0] == 1 {
            let mut buf = [0u8; Time::ENCODED_LEN];
            cursor.read_exact(&mut buf)?;
            let start = Time::decode(&buf)?;
            cursor.read_exact(&mut buf)?;
            let end = Time::decode(&buf)?;
            Some(Interval::new(start, end))
        } else {
            None
        };
        Ok(Stats {
            count,
            total_bytes,
            interval,
        })
    }

    fn to_structured(self) -> Structured {
        let b = Structured::map()
            .field("count", Structured::Int(self.count as i64))
            .field("total_bytes", Structured::Int(self.total_bytes as i64));
        match self.interval {
            Some(i) => b
                .field("from", Structured::Str(i.start.to_iso8601()))
                .field("to", Structured::Str(i.end.to_iso8601()))
                .build(),
            None => b.build(),
        }
    }
}

/// Non-reftime dimension tuple used as the trie key, sorted the way every
/// other canonically-encoded structure in this crate is sorted.
pub type Key = BTreeMap<Code, Value>;

fn key_for(md: &Metadata) -> Key {
    md.iter()
        .filter(|(code, _)| *code != Code::Reftime)
        .map(|(code, value)| (code, value.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    nodes: BTreeMap<Vec<u8>, (Key, Stats)>,
}

fn key_fingerprint(key: &Key) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, key.len() as u64).unwrap();
    for (code, value) in key {
        out.push(*code as u8);
        let encoded = value.encode();
        write_varint(&mut out, encoded.len() as u64).unwrap();
        out.extend_from_slice(&encoded);
    }
    out
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, md: &Metadata) {
        let key = key_for(md);
        let when = md.reftime().map(|r| r.interval().start).unwrap_or(Time::new(1970, 1, 1, 0, 0, 0));
        let bytes = md.source.size().unwrap_or(0);
        let stats = Stats::single(bytes, when);
        self.add_stats(key, stats);
    }

    pub fn add_summary(&mut self, other: &Summary) {
        for (fp, (key, stats)) in &other.nodes {
            match self.nodes.get_mut(fp) {
                Some((_, existing)) => *existing = existing.merge(stats),
                None => {
                    self.nodes.insert(fp.clone(), (key.clone(), *stats));
                }
            }
        }
    }

    fn add_stats(&mut self, key: Key, stats: Stats) {
        let fp = key_fingerprint(&key);
        match self.nodes.get_mut(&fp) {
            Some((_, existing)) => *existing = existing.merge(&stats),
            None => {
                self.nodes.insert(fp, (key, stats));
            }
        }
    }

    /// Associative, commutative union — the monoid operation query
    /// evaluation relies on.
    pub fn merge(a: &Summary, b: &Summary) -> Summary {
        let mut out = a.clone();
        out.add_summary(b);
        out
    }

    pub fn visit(&self) -> impl Iterator<Item = (&Key, &Stats)> {
        self.nodes.values().map(|(k, s)| (k, s))
    }

    pub fn total(&self) -> Stats {
        self.nodes
            .values()
            .fold(Stats { count: 0, total_bytes: 0, interval: None }, |acc, (_, s)| acc.merge(s))
    }

    /// Keep only nodes whose dimensions satisfy `accept`; reftime nodes are
    /// expected to have already been intersected with the matcher's
    /// interval by the caller, consistent with `filter` contract.
    pub fn filter(&self, accept: impl Fn(&Key) -> bool) -> Summary {
        Summary {
            nodes: self
                .nodes
                .iter()
                .filter(|(_, (key, _))| accept(key))
                .map(|(fp, v)| (fp.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.nodes.len() as u64).unwrap();
        for (key, stats) in self.nodes.values() {
            write_varint(&mut out, key.len() as u64).unwrap();
            for (code, value) in key {
                out.push(*code as u8);
                let encoded = value.encode();
                write_varint(&mut out, encoded.len() as u64).unwrap();
                out.extend_from_slice(&encoded);
            }
            stats.encode(&mut out);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let count = read_varint(&mut cursor, 0)?;
        let mut nodes = BTreeMap::new();
        for _ in 0..count {
            let field_count = read_varint(&mut cursor, cursor.position())?;
            let mut key = Key::new();
            for _ in 0..field_count {
                let mut code_byte = [0u8; 1];
                cursor.read_exact(&mut code_byte)?;
                let code = Code::from_u8(code_byte[0])
                    .ok_or_else(|| crate::error::ArkError::format("unknown summary key code", cursor.position()))?;
                let len = read_varint(&mut cursor, cursor.position())? as usize;
                let mut payload = vec![0u8; len];
                cursor.read_exact(&mut payload)?;
                key.insert(code, Value::decode(code, &payload)?);
            }
            let stats = Stats::decode(&mut cursor)?;
            let fp = key_fingerprint(&key);
            nodes.insert(fp, (key, stats));
        }
        Ok(Summary { nodes })
    }

    pub fn to_structured(&self) -> Structured {
        Structured::List(
            self.nodes
                .values()
                .map(|(key, stats)| {
                    let mut b = Structured::map();
                    for (code, value) in key {
                        b = b.field(code.name(), value.to_structured());
                    }
                    b.field("stats", stats.to_structured()).build()
                })
                .collect(),
        )
    }

    /// A degenerate projection for fast display: per-dimension set of
    /// distinct values, plus a grand total.
    pub fn short_summary(&self) -> ShortSummary {
        let mut by_dimension: BTreeMap<Code, std::collections::BTreeSet<String>> = BTreeMap::new();
        for (key, _) in self.nodes.values() {
            for (code, value) in key {
                by_dimension
                    .entry(*code)
                    .or_default()
                    .insert(value.to_string_repr());
            }
        }
        ShortSummary {
            by_dimension,
            total: self.total(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShortSummary {
    pub by_dimension: BTreeMap<Code, std::collections::BTreeSet<String>>,
    pub total: Stats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::source::Source;
    use crate::types::scalar_dims::Run;
    use crate::types::Reftime;

    fn md_with(run: u32, when: Time) -> Metadata {
        let mut m = Metadata::with_source(Source::Inline(vec![0u8; 10]));
        m.set(Value::Reftime(Reftime::Position(when)));
        m.set(Value::Run(Run(run)));
        m
    }

    #[test]
    fn add_accumulates_stats_for_same_key() {
        let mut s = Summary::new();
        s.add(&md_with(0, Time::new(2024, 1, 1, 0, 0, 0)));
        s.add(&md_with(0, Time::new(2024, 1, 2, 0, 0, 0)));
        assert_eq!(s.total().count, 2);
        assert_eq!(s.total().total_bytes, 20);
        let leaves: Vec<_> = s.visit().collect();
        assert_eq!(leaves.len(), 1);
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let mut a = Summary::new();
        a.add(&md_with(0, Time::new(2024, 1, 1, 0, 0, 0)));
        let mut b = Summary::new();
        b.add(&md_with(60, Time::new(2024, 2, 1, 0, 0, 0)));
        let mut c = Summary::new();
        c.add(&md_with(120, Time::new(2024, 3, 1, 0, 0, 0)));

        let ab_c = Summary::merge(&Summary::merge(&a, &b), &c);
        let a_bc = Summary::merge(&a, &Summary::merge(&b, &c));
        assert_eq!(ab_c.total(), a_bc.total());

        let ba = Summary::merge(&b, &a);
        let ab = Summary::merge(&a, &b);
        assert_eq!(ba.total(), ab.total());
    }

    #[test]
    fn binary_roundtrip() {
        let mut s = Summary::new();
        s.add(&md_with(0, Time::new(2024, 1, 1, 0, 0, 0)));
        s.add(&md_with(90, Time::new(2024, 1, 2, 0, 0, 0)));
        let bytes = s.encode();
        let back = Summary::decode(&bytes).unwrap();
        assert_eq!(back.total(), s.total());
        assert_eq!(back.visit().count(), s.visit().count());
    }
}
