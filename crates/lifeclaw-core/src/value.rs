//! Length-prefixed value decoding and attribute word classification.
//!
//! Directory feeds deliver attribute values as small binary blobs: one tag
//! byte, a short or long length form, then the payload. The engine only
//! ever sees the payload as NUL-clean ASCII text.

use crate::error::{LifeClawError, Result};

/// Classification of the word behind the cursor of an attribute-program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextKind {
    /// `event@timestamp` — fires on a timer.
    Timer,
    /// `lcname?event` — waits for another process's past event.
    Await,
    /// `var=value` — value annotation, blocks like a wait that never ends.
    Assign,
    /// Nothing left, or a word with no classifier. Never fires.
    Done,
}

/// Length of the identifier prefix of `s`: ASCII alphanumerics, `-`, `_`.
pub fn ident_len(s: &str) -> usize {
    s.bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
        .count()
}

/// Classify a word by the byte right behind its identifier prefix.
pub fn next_kind(word: &str) -> NextKind {
    match word.as_bytes().get(ident_len(word)) {
        Some(b'@') => NextKind::Timer,
        Some(b'?') => NextKind::Await,
        Some(b'=') => NextKind::Assign,
        _ => NextKind::Done,
    }
}

/// Decode a length-prefixed value into its payload bytes.
///
/// Layout: one tag byte (skipped), then either `0xxxxxxx` (length in the
/// low 7 bits) or `1nnnnnnn` with `nnnnnnn` ∈ {1, 2} length bytes,
/// big-endian, followed by the payload. Anything else is malformed, as is
/// a payload shorter than the declared length.
pub fn parse_value(raw: &[u8]) -> Result<&[u8]> {
    let &lead = raw.get(1).ok_or_else(|| malformed("value header truncated"))?;
    let (ofs, len) = if lead & 0x80 == 0 {
        (2usize, lead as usize)
    } else {
        let lenlen = (lead & 0x7f) as usize;
        if !(1..=2).contains(&lenlen) {
            return Err(malformed(&format!("unsupported length-of-length {lenlen}")));
        }
        let mut len = 0usize;
        for i in 0..lenlen {
            let &b = raw
                .get(2 + i)
                .ok_or_else(|| malformed("value length truncated"))?;
            len = (len << 8) | b as usize;
        }
        (2 + lenlen, len)
    };
    raw.get(ofs..ofs + len)
        .ok_or_else(|| malformed("value payload truncated"))
}

/// Decode a length-prefixed value into text: UTF-8, no embedded NUL.
pub fn parse_text(raw: &[u8]) -> Result<&str> {
    let payload = parse_value(raw)?;
    let text = std::str::from_utf8(payload)
        .map_err(|_| malformed("value is not valid UTF-8"))?;
    if text.contains('\0') {
        return Err(malformed("embedded NUL in value"));
    }
    Ok(text)
}

fn malformed(reason: &str) -> LifeClawError {
    tracing::warn!("rejecting value: {reason}");
    LifeClawError::MalformedValue(reason.to_string())
}

/// Wrap a payload into the length-prefixed wire form (tag `0x04`).
///
/// The inverse of [`parse_value`]; used by tests and the daemon feed to
/// build the blobs a directory connector would deliver.
pub fn encode_value(payload: &[u8]) -> Result<Vec<u8>> {
    let len = payload.len();
    let mut out = Vec::with_capacity(len + 4);
    out.push(0x04);
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(0x81);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        return Err(malformed(&format!(
            "payload of {len} bytes does not fit a value header"
        )));
    }
    out.extend_from_slice(payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_len() {
        assert_eq!(ident_len("aap@12345"), 3);
        assert_eq!(ident_len("under_score-x rest"), 13);
        assert_eq!(ident_len("@now"), 0);
        assert_eq!(ident_len(""), 0);
    }

    #[test]
    fn test_next_kind() {
        assert_eq!(next_kind("go@"), NextKind::Timer);
        assert_eq!(next_kind("pkix?cert"), NextKind::Await);
        assert_eq!(next_kind("v=1"), NextKind::Assign);
        assert_eq!(next_kind("plain rest"), NextKind::Done);
        assert_eq!(next_kind(""), NextKind::Done);
    }

    #[test]
    fn test_parse_short_form() {
        let raw = b"\x04\x1cuid=bakker,dc=orvelte,dc=nep";
        assert_eq!(parse_value(raw).unwrap(), b"uid=bakker,dc=orvelte,dc=nep");
    }

    #[test]
    fn test_parse_long_forms() {
        let mut raw = vec![0x04, 0x81, 200];
        raw.extend(std::iter::repeat_n(b'a', 200));
        assert_eq!(parse_value(&raw).unwrap().len(), 200);

        let mut raw = vec![0x04, 0x82, 0x01, 0x00];
        raw.extend(std::iter::repeat_n(b'b', 256));
        assert_eq!(parse_value(&raw).unwrap().len(), 256);
    }

    #[test]
    fn test_parse_rejects() {
        assert!(parse_value(b"\x04").is_err());
        assert!(parse_value(b"\x04\x83\x00\x00\x01").is_err());
        assert!(parse_value(b"\x04\x05abc").is_err());
        assert!(parse_text(b"\x04\x03a\x00b").is_err());
        assert!(parse_text(b"\x04\x02\xff\xfe").is_err());
    }

    #[test]
    fn test_encode_round_trip() {
        for len in [0usize, 1, 127, 128, 255, 256, 65535] {
            let payload = vec![b'x'; len];
            let wire = encode_value(&payload).unwrap();
            assert_eq!(parse_value(&wire).unwrap(), &payload[..]);
        }
        assert!(encode_value(&vec![0u8; 70_000]).is_err());
    }
}
