//! Typed metadata values and their shared binary/text/structured codec
//!.

pub mod area;
pub mod bag;
pub mod code;
pub mod codec;
pub mod level;
pub mod origin;
pub mod product;
pub mod proddef;
pub mod reftime;
pub mod scalar_dims;
pub mod structured;
pub mod time;
pub mod timerange;
pub mod value;

pub use code::Code;
pub use codec::RawEnvelope;
pub use reftime::Reftime;
pub use structured::Structured;
pub use time::{Interval, Time};
pub use value::Value;
