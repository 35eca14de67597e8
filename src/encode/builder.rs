//! Line protocol record builder.
//!
//! `LineBuilder` assembles one or more newline-separated records into a
//! single buffer while enforcing the legal call order: a measurement opens
//! a record, tags may only follow the measurement or another tag, fields
//! may follow the measurement, a tag or another field, and the timestamp
//! may only follow a field. Any out-of-order call discards the buffer;
//! partial output is never delivered.

use super::buffer::{INITIAL_CAPACITY, RecordBuffer};
use super::escape::{MEASUREMENT_ESCAPES, STRING_ESCAPES, TAG_ESCAPES, escaped_append};
use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::warn;

/// Upper bound on one rendered append. Bounds pathological inputs such as
/// absurd float precision requests before they reach the record buffer.
pub const MAX_APPEND_LENGTH: usize = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{op} not allowed after {prev}")]
    OutOfOrder { op: &'static str, prev: &'static str },
    #[error("rendered value exceeds {MAX_APPEND_LENGTH} bytes")]
    OversizedAppend,
    #[error("record has no field; nothing to deliver")]
    IncompleteRecord,
    #[error("buffer discarded after an earlier encode error")]
    Discarded,
}

/// Last append type, the single piece of cursor state per buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    None,
    Measurement,
    Tag,
    Field,
    Timestamp,
}

impl Cursor {
    fn name(self) -> &'static str {
        match self {
            Cursor::None => "start of buffer",
            Cursor::Measurement => "measurement",
            Cursor::Tag => "tag",
            Cursor::Field => "field",
            Cursor::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug)]
pub struct LineBuilder {
    buf: RecordBuffer,
    cursor: Cursor,
    poisoned: bool,
}

impl Default for LineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuilder {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: RecordBuffer::with_capacity(capacity),
            cursor: Cursor::None,
            poisoned: false,
        }
    }

    /// Starts a new record. Legal at the start of the buffer or after the
    /// previous record is closed by a field or timestamp; a second record
    /// in the same buffer is separated by a newline.
    pub fn measurement(&mut self, name: &str) -> Result<&mut Self, EncodeError> {
        self.check()?;
        match self.cursor {
            Cursor::None => {}
            Cursor::Field | Cursor::Timestamp => self.buf.append(b"\n"),
            Cursor::Measurement | Cursor::Tag => return Err(self.fail("measurement")),
        }
        escaped_append(&mut self.buf, name, MEASUREMENT_ESCAPES);
        self.cursor = Cursor::Measurement;
        Ok(self)
    }

    /// Appends one tag. Tags must sit between the measurement and the first
    /// field.
    pub fn tag(&mut self, key: &str, value: &str) -> Result<&mut Self, EncodeError> {
        self.check()?;
        match self.cursor {
            Cursor::Measurement | Cursor::Tag => {}
            _ => return Err(self.fail("tag")),
        }
        self.buf.append(b",");
        escaped_append(&mut self.buf, key, TAG_ESCAPES);
        self.buf.append(b"=");
        escaped_append(&mut self.buf, value, TAG_ESCAPES);
        self.cursor = Cursor::Tag;
        Ok(self)
    }

    pub fn field_str(&mut self, key: &str, value: &str) -> Result<&mut Self, EncodeError> {
        self.field_prologue(key)?;
        self.buf.append(b"\"");
        escaped_append(&mut self.buf, value, STRING_ESCAPES);
        self.buf.append(b"\"");
        self.cursor = Cursor::Field;
        Ok(self)
    }

    /// Float field with caller-supplied decimal precision.
    pub fn field_float(
        &mut self,
        key: &str,
        value: f64,
        precision: usize,
    ) -> Result<&mut Self, EncodeError> {
        self.field_prologue(key)?;
        let rendered = format!("{value:.precision$}");
        self.append_bounded(rendered.as_bytes())?;
        self.cursor = Cursor::Field;
        Ok(self)
    }

    /// Integer field; the trailing `i` distinguishes it from a float on
    /// the wire.
    pub fn field_int(&mut self, key: &str, value: i64) -> Result<&mut Self, EncodeError> {
        self.field_prologue(key)?;
        let rendered = format!("{value}i");
        self.append_bounded(rendered.as_bytes())?;
        self.cursor = Cursor::Field;
        Ok(self)
    }

    pub fn field_bool(&mut self, key: &str, value: bool) -> Result<&mut Self, EncodeError> {
        self.field_prologue(key)?;
        self.buf.append(if value { b"t" } else { b"f" });
        self.cursor = Cursor::Field;
        Ok(self)
    }

    /// Closes the record with a nanosecond timestamp. At least one field
    /// must already exist.
    pub fn timestamp(&mut self, nanoseconds: i64) -> Result<&mut Self, EncodeError> {
        self.check()?;
        if self.cursor != Cursor::Field {
            return Err(self.fail("timestamp"));
        }
        let rendered = format!(" {nanoseconds}");
        self.append_bounded(rendered.as_bytes())?;
        self.cursor = Cursor::Timestamp;
        Ok(self)
    }

    /// Closes the record with the system real-time clock, in nanoseconds.
    pub fn timestamp_now(&mut self) -> Result<&mut Self, EncodeError> {
        self.timestamp(now_nanos())
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finalizes the buffer. An untouched builder yields an empty payload
    /// (the keep-alive case); a record still waiting for its first field
    /// is incomplete and is discarded instead of delivered.
    pub fn finish(self) -> Result<Bytes, EncodeError> {
        if self.poisoned {
            return Err(EncodeError::Discarded);
        }
        match self.cursor {
            Cursor::Measurement | Cursor::Tag => Err(EncodeError::IncompleteRecord),
            _ => Ok(self.buf.into_bytes()),
        }
    }

    /// Separator plus escaped key plus `=`, shared by all field kinds.
    /// The first field after the measurement/tags is space-separated;
    /// later fields are comma-separated.
    fn field_prologue(&mut self, key: &str) -> Result<(), EncodeError> {
        self.check()?;
        let separator: &[u8] = match self.cursor {
            Cursor::Measurement | Cursor::Tag => b" ",
            Cursor::Field => b",",
            _ => return Err(self.fail("field")),
        };
        self.buf.append(separator);
        escaped_append(&mut self.buf, key, TAG_ESCAPES);
        self.buf.append(b"=");
        Ok(())
    }

    fn append_bounded(&mut self, rendered: &[u8]) -> Result<(), EncodeError> {
        if rendered.len() > MAX_APPEND_LENGTH {
            self.poisoned = true;
            self.buf.clear();
            return Err(EncodeError::OversizedAppend);
        }
        self.buf.append(rendered);
        Ok(())
    }

    fn check(&self) -> Result<(), EncodeError> {
        if self.poisoned {
            Err(EncodeError::Discarded)
        } else {
            Ok(())
        }
    }

    fn fail(&mut self, op: &'static str) -> EncodeError {
        let prev = self.cursor.name();
        self.poisoned = true;
        self.buf.clear();
        EncodeError::OutOfOrder { op, prev }
    }
}

/// Nanoseconds since the epoch from the system real-time clock.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_else(|| {
        warn!("system clock outside the nanosecond-representable range");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(builder: LineBuilder) -> String {
        String::from_utf8(builder.finish().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn full_record_matches_wire_format() {
        let mut b = LineBuilder::new();
        b.measurement("Meter1").unwrap();
        b.tag("Sensor", "A").unwrap();
        b.field_float("Power", 120.50, 2).unwrap();
        b.field_int("Status", 1).unwrap();
        b.timestamp(1_700_000_000_000_000_000).unwrap();
        assert_eq!(
            text(b),
            "Meter1,Sensor=A Power=120.50,Status=1i 1700000000000000000"
        );
    }

    #[test]
    fn field_directly_after_measurement() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        b.field_bool("ok", true).unwrap();
        assert_eq!(text(b), "m ok=t");
    }

    #[test]
    fn string_field_is_quoted_and_escaped() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        b.field_str("note", r#"say "hi""#).unwrap();
        assert_eq!(text(b), r#"m note="say \"hi\"""#);
    }

    #[test]
    fn second_record_separated_by_newline() {
        let mut b = LineBuilder::new();
        b.measurement("a").unwrap();
        b.field_int("x", 1).unwrap();
        b.measurement("b").unwrap();
        b.field_int("y", 2).unwrap();
        assert_eq!(text(b), "a x=1i\nb y=2i");
    }

    #[test]
    fn tag_before_measurement_is_rejected() {
        let mut b = LineBuilder::new();
        let err = b.tag("k", "v").unwrap_err();
        assert_eq!(
            err,
            EncodeError::OutOfOrder {
                op: "tag",
                prev: "start of buffer"
            }
        );
    }

    #[test]
    fn measurement_mid_tag_set_is_rejected() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        b.tag("k", "v").unwrap();
        assert!(matches!(
            b.measurement("n"),
            Err(EncodeError::OutOfOrder { op: "measurement", .. })
        ));
    }

    #[test]
    fn tag_after_field_is_rejected() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        b.field_int("x", 1).unwrap();
        assert!(matches!(
            b.tag("k", "v"),
            Err(EncodeError::OutOfOrder { op: "tag", .. })
        ));
    }

    #[test]
    fn timestamp_requires_a_field() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        assert!(matches!(
            b.timestamp(1),
            Err(EncodeError::OutOfOrder { op: "timestamp", .. })
        ));
    }

    #[test]
    fn double_timestamp_is_rejected() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        b.field_int("x", 1).unwrap();
        b.timestamp(1).unwrap();
        assert!(b.timestamp(2).is_err());
    }

    #[test]
    fn error_discards_partial_output() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        b.tag("k", "v").unwrap();
        let _ = b.measurement("n");
        assert!(b.is_empty());
        assert_eq!(b.field_int("x", 1).unwrap_err(), EncodeError::Discarded);
        assert_eq!(b.finish().unwrap_err(), EncodeError::Discarded);
    }

    #[test]
    fn oversized_float_precision_is_rejected() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        let err = b.field_float("x", 1.0, 400).unwrap_err();
        assert_eq!(err, EncodeError::OversizedAppend);
    }

    #[test]
    fn measurement_without_field_is_incomplete() {
        let mut b = LineBuilder::new();
        b.measurement("m").unwrap();
        assert_eq!(b.finish().unwrap_err(), EncodeError::IncompleteRecord);
    }

    #[test]
    fn untouched_builder_finishes_empty() {
        let b = LineBuilder::new();
        assert!(b.finish().unwrap().is_empty());
    }

    #[test]
    fn escaped_measurement_and_tags() {
        let mut b = LineBuilder::new();
        b.measurement("my meter").unwrap();
        b.tag("room a", "1,2").unwrap();
        b.field_int("v", 0).unwrap();
        assert_eq!(text(b), r"my\ meter,room\ a=1\,2 v=0i");
    }
}
