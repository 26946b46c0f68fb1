//! `proddef` — ensemble/experiment specifier, a bag of named scalars.

use std::cmp::Ordering;

use crate::error::Result;
use crate::types::bag::Bag;
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proddef(pub Bag);

impl Proddef {
    pub fn style(&self) -> &'static str {
        "GRIB"
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Proddef(Bag::decode(bytes)?))
    }

    pub fn to_string_repr(&self) -> String {
        self.0.to_string_repr()
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(Proddef(Bag::parse(s)?))
    }

    pub fn to_structured(&self) -> Structured {
        self.0.to_structured()
    }

    pub fn compare(&self, other: &Proddef) -> Ordering {
        self.0.compare(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bag::Scalar;

    #[test]
    fn proddef_roundtrip() {
        let p = Proddef(Bag::new().with("ensemble", Scalar::Int(3)));
        let mut buf = Vec::new();
        p.encode(&mut buf);
        assert_eq!(Proddef::decode(&buf).unwrap(), p);
    }
}
