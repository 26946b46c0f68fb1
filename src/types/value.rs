//! `Value` — the typed payload for one metadata dimension, and the shared
//! `Codec` contract every concrete type (`Reftime`, `Origin`, ...)
//! implements.

use std::cmp::Ordering;

use crate::error::Result;
use crate::types::area::Area;
use crate::types::code::Code;
use crate::types::level::Level;
use crate::types::origin::Origin;
use crate::types::product::Product;
use crate::types::proddef::Proddef;
use crate::types::reftime::Reftime;
use crate::types::scalar_dims::{Quantity, RawValue, Run, Task};
use crate::types::structured::Structured;
use crate::types::timerange::Timerange;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Reftime(Reftime),
    Origin(Origin),
    Product(Product),
    Level(Level),
    Timerange(Timerange),
    Area(Area),
    Proddef(Proddef),
    Run(Run),
    Task(Task),
    Quantity(Quantity),
    Value(RawValue),
}

impl Value {
    pub fn code(&self) -> Code {
        match self {
            Value::Reftime(_) => Code::Reftime,
            Value::Origin(_) => Code::Origin,
            Value::Product(_) => Code::Product,
            Value::Level(_) => Code::Level,
            Value::Timerange(_) => Code::Timerange,
            Value::Area(_) => Code::Area,
            Value::Proddef(_) => Code::Proddef,
            Value::Run(_) => Code::Run,
            Value::Task(_) => Code::Task,
            Value::Quantity(_) => Code::Quantity,
            Value::Value(_) => Code::Value,
        }
    }

    pub fn style(&self) -> &'static str {
        match self {
            Value::Reftime(v) => v.style(),
            Value::Origin(v) => v.style(),
            Value::Product(v) => v.style(),
            Value::Level(v) => v.style(),
            Value::Timerange(v) => v.style(),
            Value::Area(v) => v.style(),
            Value::Proddef(v) => v.style(),
            Value::Run(v) => v.style(),
            Value::Task(v) => v.style(),
            Value::Quantity(v) => v.style(),
            Value::Value(v) => v.style(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Value::Reftime(v) => v.encode(&mut out),
            Value::Origin(v) => v.encode(&mut out),
            Value::Product(v) => v.encode(&mut out),
            Value::Level(v) => v.encode(&mut out),
            Value::Timerange(v) => v.encode(&mut out),
            Value::Area(v) => v.encode(&mut out),
            Value::Proddef(v) => v.encode(&mut out),
            Value::Run(v) => v.encode(&mut out),
            Value::Task(v) => v.encode(&mut out),
            Value::Quantity(v) => v.encode(&mut out),
            Value::Value(v) => v.encode(&mut out),
        }
        out
    }

    pub fn decode(code: Code, bytes: &[u8]) -> Result<Self> {
        Ok(match code {
            Code::Reftime => Value::Reftime(Reftime::decode(bytes)?),
            Code::Origin => Value::Origin(Origin::decode(bytes)?),
            Code::Product => Value::Product(Product::decode(bytes)?),
            Code::Level => Value::Level(Level::decode(bytes)?),
            Code::Timerange => Value::Timerange(Timerange::decode(bytes)?),
            Code::Area => Value::Area(Area::decode(bytes)?),
            Code::Proddef => Value::Proddef(Proddef::decode(bytes)?),
            Code::Run => Value::Run(Run::decode(bytes)?),
            Code::Task => Value::Task(Task::decode(bytes)?),
            Code::Quantity => Value::Quantity(Quantity::decode(bytes)?),
            Code::Value => Value::Value(RawValue::decode(bytes)?),
        })
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            Value::Reftime(v) => v.to_string_repr(),
            Value::Origin(v) => v.to_string_repr(),
            Value::Product(v) => v.to_string_repr(),
            Value::Level(v) => v.to_string_repr(),
            Value::Timerange(v) => v.to_string_repr(),
            Value::Area(v) => v.to_string_repr(),
            Value::Proddef(v) => v.to_string_repr(),
            Value::Run(v) => v.to_string_repr(),
            Value::Task(v) => v.to_string_repr(),
            Value::Quantity(v) => v.to_string_repr(),
            Value::Value(v) => v.to_string_repr(),
        }
    }

    pub fn parse(code: Code, s: &str) -> Result<Self> {
        Ok(match code {
            Code::Reftime => Value::Reftime(Reftime::parse(s)?),
            Code::Origin => Value::Origin(Origin::parse(s)?),
            Code::Product => Value::Product(Product::parse(s)?),
            Code::Level => Value::Level(Level::parse(s)?),
            Code::Timerange => Value::Timerange(Timerange::parse(s)?),
            Code::Area => Value::Area(Area::parse(s)?),
            Code::Proddef => Value::Proddef(Proddef::parse(s)?),
            Code::Run => Value::Run(Run::parse(s)?),
            Code::Task => Value::Task(Task::parse(s)?),
            Code::Quantity => Value::Quantity(Quantity::parse(s)?),
            Code::Value => Value::Value(RawValue::parse(s)?),
        })
    }

    pub fn to_structured(&self) -> Structured {
        match self {
            Value::Reftime(v) => Structured::Str(v.to_string_repr()),
            Value::Origin(v) => v.to_structured(),
            Value::Product(v) => v.to_structured(),
            Value::Level(v) => v.to_structured(),
            Value::Timerange(v) => v.to_structured(),
            Value::Area(v) => v.to_structured(),
            Value::Proddef(v) => v.to_structured(),
            Value::Run(v) => v.to_structured(),
            Value::Task(v) => v.to_structured(),
            Value::Quantity(v) => v.to_structured(),
            Value::Value(v) => v.to_structured(),
        }
    }

    /// Total ordering across same-dimension values. Mismatched dimensions
    /// compare by code, which is never meaningful on its own but keeps the
    /// ordering total for callers that sort heterogeneous value lists.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Reftime(a), Value::Reftime(b)) => a.compare(b),
            (Value::Origin(a), Value::Origin(b)) => a.compare(b),
            (Value::Product(a), Value::Product(b)) => a.compare(b),
            (Value::Level(a), Value::Level(b)) => a.compare(b),
            (Value::Timerange(a), Value::Timerange(b)) => a.compare(b),
            (Value::Area(a), Value::Area(b)) => a.compare(b),
            (Value::Proddef(a), Value::Proddef(b)) => a.compare(b),
            (Value::Run(a), Value::Run(b)) => a.compare(b),
            (Value::Task(a), Value::Task(b)) => a.compare(b),
            (Value::Quantity(a), Value::Quantity(b)) => a.compare(b),
            (Value::Value(a), Value::Value(b)) => a.compare(b),
            _ => self.code().cmp(&other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time::Time;

    #[test]
    fn value_binary_roundtrip_for_every_code() {
        let samples = vec![
            Value::Reftime(Reftime::Position(Time::new(2024, 1, 15, 0, 0, 0))),
            Value::Origin(Origin::Grib1 {
                centre: 200,
                subcentre: 0,
                process: 1,
            }),
            Value::Run(Run(360)),
            Value::Task(Task("generic".into())),
        ];
        for v in samples {
            let bytes = v.encode();
            let back = Value::decode(v.code(), &bytes).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn value_text_roundtrip() {
        let v = Value::Run(Run(90));
        let s = v.to_string_repr();
        let back = Value::parse(v.code(), &s).unwrap();
        assert_eq!(back, v);
    }
}
