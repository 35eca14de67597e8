pub mod buffer;
pub mod builder;
pub mod escape;

pub use buffer::{INITIAL_CAPACITY, RecordBuffer, SizeHint};
pub use builder::{EncodeError, LineBuilder, MAX_APPEND_LENGTH, now_nanos};

use bytes::Bytes;

/// Typed field value for [`RecordOp::Field`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    /// Float rendered with the given decimal precision.
    Float { value: f64, precision: usize },
    Integer(i64),
    Boolean(bool),
}

/// One append operation against a record buffer.
///
/// The closed set of operations a caller may issue; `encode_ops` drives
/// them through [`LineBuilder`], which enforces the legal call order at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordOp<'a> {
    Measurement(&'a str),
    Tag { key: &'a str, value: &'a str },
    Field { key: &'a str, value: FieldValue<'a> },
    Timestamp(i64),
    TimestampNow,
}

/// Encodes a sequence of operations into one finalized payload of
/// newline-separated records. The size hint seeds the initial allocation
/// and learns the capacity this payload ended up needing.
pub fn encode_ops(hint: &mut SizeHint, ops: &[RecordOp<'_>]) -> Result<Bytes, EncodeError> {
    let mut builder = LineBuilder::with_capacity(hint.largest());
    for op in ops {
        match *op {
            RecordOp::Measurement(name) => builder.measurement(name)?,
            RecordOp::Tag { key, value } => builder.tag(key, value)?,
            RecordOp::Field { key, value: FieldValue::Str(v) } => builder.field_str(key, v)?,
            RecordOp::Field {
                key,
                value: FieldValue::Float { value, precision },
            } => builder.field_float(key, value, precision)?,
            RecordOp::Field { key, value: FieldValue::Integer(v) } => builder.field_int(key, v)?,
            RecordOp::Field { key, value: FieldValue::Boolean(v) } => builder.field_bool(key, v)?,
            RecordOp::Timestamp(ns) => builder.timestamp(ns)?,
            RecordOp::TimestampNow => builder.timestamp_now()?,
        };
    }
    let capacity = builder.capacity();
    let payload = builder.finish()?;
    hint.observe(capacity);
    Ok(payload)
}
