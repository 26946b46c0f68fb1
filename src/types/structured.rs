//! Minimal structured (key/value tree) representation used by the
//! "structured" encoding named in  — the same shape YAML/JSON
//! pretty-printers consume, without depending on a YAML crate (pretty-
//! printing itself is out of scope, ; this is just the tree the
//! out-of-scope printer would walk).

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Structured {
    Str(String),
    Int(i64),
    List(Vec<Structured>),
    Map(BTreeMap<String, Structured>),
}

impl Structured {
    pub fn map() -> StructuredMapBuilder {
        StructuredMapBuilder(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Structured::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Structured::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Structured>> {
        match self {
            Structured::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Structured> {
        self.as_map().and_then(|m| m.get(key))
    }
}

/// Small fluent builder so constructing a `Structured::Map` at call sites
/// doesn't require a `BTreeMap::new()` + repeated `.insert()` dance.
pub struct StructuredMapBuilder(BTreeMap<String, Structured>);

impl StructuredMapBuilder {
    pub fn field(mut self, key: &str, value: Structured) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Structured {
        Structured::Map(self.0)
    }
}
