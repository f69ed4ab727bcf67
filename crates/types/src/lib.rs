//! Typed field values, their fixed-length binary encoding, and the
//! comparator/aggregator used uniformly by index ordering, condition
//! evaluation, sort, and group boundaries.

mod aggregate;
mod codec;
mod value;

#[cfg(test)]
mod tests;

pub use aggregate::{AggregateFn, aggregate};
pub use codec::{
    LiteralOutcome, compare, decode, encode, literal_parse, literal_render, max_value, min_value,
};
pub use value::{SqlType, Value};

use thiserror::Error;

/// Errors raised while encoding/decoding fixed-length field values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer of {actual} bytes is too small to hold a {needed}-byte field value")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("string value of {actual} bytes does not fit in a field of length {max}")]
    StringTooLong { actual: usize, max: usize },
    #[error("unknown field type tag {0}")]
    UnknownTypeTag(u64),
    #[error("attempted to encode a null value into a non-nullable field")]
    NullNotAllowed,
}

pub type CodecResult<T> = Result<T, CodecError>;
