//! `area` — geographic coverage, a bag of named scalars.

use std::cmp::Ordering;

use crate::error::Result;
use crate::types::bag::Bag;
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Area(pub Bag);

impl Area {
    pub fn style(&self) -> &'static str {
        "GRIB"
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Area(Bag::decode(bytes)?))
    }

    pub fn to_string_repr(&self) -> String {
        self.0.to_string_repr()
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(Area(Bag::parse(s)?))
    }

    pub fn to_structured(&self) -> Structured {
        self.0.to_structured()
    }

    pub fn compare(&self, other: &Area) -> Ordering {
        self.0.compare(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bag::Scalar;

    #[test]
    fn area_roundtrip() {
        let a = Area(Bag::new().with("lon", Scalar::Int(1)).with("lat", Scalar::Int(2)));
        let mut buf = Vec::new();
        a.encode(&mut buf);
        assert_eq!(Area::decode(&buf).unwrap(), a);
    }
}
