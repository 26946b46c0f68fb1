//! Dimension codes and the one-byte type tag each carries in the
//! binary envelope.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Code {
    Reftime = 1,
    Origin = 2,
    Product = 3,
    Level = 4,
    Timerange = 5,
    Area = 6,
    Proddef = 7,
    Run = 8,
    Task = 9,
    Quantity = 10,
    Value = 11,
}

impl Code {
    pub const ALL: [Code; 11] = [
        Code::Reftime,
        Code::Origin,
        Code::Product,
        Code::Level,
        Code::Timerange,
        Code::Area,
        Code::Proddef,
        Code::Run,
        Code::Task,
        Code::Quantity,
        Code::Value,
    ];

    /// Lower-case dimension name, as used by the matcher grammar and
    /// by the `index` / `unique` dataset config keys.
    pub fn name(self) -> &'static str {
        match self {
            Code::Reftime => "reftime",
            Code::Origin => "origin",
            Code::Product => "product",
            Code::Level => "level",
            Code::Timerange => "timerange",
            Code::Area => "area",
            Code::Proddef => "proddef",
            Code::Run => "run",
            Code::Task => "task",
            Code::Quantity => "quantity",
            Code::Value => "value",
        }
    }

    pub fn from_name(name: &str) -> Option<Code> {
        Code::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn from_u8(v: u8) -> Option<Code> {
        Code::ALL.into_iter().find(|c| *c as u8 == v)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip() {
        for c in Code::ALL {
            assert_eq!(Code::from_name(c.name()), Some(c));
            assert_eq!(Code::from_u8(c as u8), Some(c));
        }
    }
}
