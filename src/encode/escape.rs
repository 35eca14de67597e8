//! Byte-oriented escaping for line protocol positions.
//!
//! Each position in a record has its own escape set: measurements escape
//! `,` and space, tag/field keys and tag values escape `,`, `=` and space,
//! and quoted string field values escape `"`. The input is treated as raw
//! bytes and is never assumed to be pre-escaped.

use super::buffer::RecordBuffer;

/// Escape set for measurement names.
pub const MEASUREMENT_ESCAPES: &[u8] = b", ";
/// Escape set for tag keys, tag values and field keys.
pub const TAG_ESCAPES: &[u8] = b",= ";
/// Escape set for quoted string field values.
pub const STRING_ESCAPES: &[u8] = b"\"";

/// Appends `src` to `dest`, prefixing every byte found in `escapes` with a
/// backslash. Unescaped runs are copied in one append each.
pub fn escaped_append(dest: &mut RecordBuffer, src: &str, escapes: &[u8]) {
    let mut rest = src.as_bytes();
    loop {
        let run = rest
            .iter()
            .position(|b| escapes.contains(b))
            .unwrap_or(rest.len());
        if run > 0 {
            dest.append(&rest[..run]);
            rest = &rest[run..];
        }
        match rest.first() {
            Some(&b) => {
                dest.append(&[b'\\', b]);
                rest = &rest[1..];
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(src: &str, escapes: &[u8]) -> String {
        let mut buf = RecordBuffer::with_capacity(16);
        escaped_append(&mut buf, src, escapes);
        String::from_utf8(buf.into_bytes().to_vec()).unwrap()
    }

    /// The documented unescape: drop a backslash, keep the byte after it.
    fn unescape(src: &str) -> String {
        let mut out = String::new();
        let mut chars = src.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn plain_text_is_copied_verbatim() {
        assert_eq!(escape("Meter1", MEASUREMENT_ESCAPES), "Meter1");
    }

    #[test]
    fn tag_escapes_comma_equals_space() {
        assert_eq!(escape("a,b=c d", TAG_ESCAPES), r"a\,b\=c\ d");
    }

    #[test]
    fn string_value_escapes_quotes_only() {
        assert_eq!(escape(r#"say "hi", ok"#, STRING_ESCAPES), r#"say \"hi\", ok"#);
    }

    #[test]
    fn consecutive_escapable_bytes() {
        assert_eq!(escape(",,  ==", TAG_ESCAPES), r"\,\,\ \ \=\=");
    }

    #[test]
    fn round_trip_recovers_original() {
        for input in [
            "plain",
            "with space",
            "a,b",
            "k=v",
            ", = ,",
            "trailing ",
            " leading",
        ] {
            assert_eq!(unescape(&escape(input, TAG_ESCAPES)), input);
        }
    }
}
