//! Byte encodings for stored comics.
//!
//! Records are stored as JSON. Keys are zig-zag signed varints: small comic
//! numbers take one or two bytes, and any `i64` fits in at most ten. Key
//! order does not follow numeric order, so nothing may rely on range scans.

use thiserror::Error;

use crate::ComicRecord;

/// Longest possible encoding of an `i64`.
pub const MAX_KEY_LEN: usize = 10;

/// Errors decoding a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key is empty or truncated")]
    Truncated,

    #[error("key overflows a 64-bit integer")]
    Overflow,

    #[error("key has {0} trailing bytes")]
    Trailing(usize),
}

/// Encode a comic record for storage.
pub fn encode_record(comic: &ComicRecord) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(comic)
}

/// Decode a stored comic record.
pub fn decode_record(bytes: &[u8]) -> Result<ComicRecord, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Encode a comic number as a compact key.
pub fn encode_key(number: i64) -> Vec<u8> {
    let mut zigzag = ((number << 1) ^ (number >> 63)) as u64;
    let mut out = Vec::with_capacity(MAX_KEY_LEN);

    while zigzag >= 0x80 {
        out.push((zigzag as u8) | 0x80);
        zigzag >>= 7;
    }
    out.push(zigzag as u8);

    out
}

/// Decode a key produced by [`encode_key`].
pub fn decode_key(bytes: &[u8]) -> Result<i64, KeyError> {
    let mut value: u64 = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if i == MAX_KEY_LEN - 1 && byte > 1 {
            // The tenth byte may only carry the single remaining bit.
            return Err(KeyError::Overflow);
        }

        value |= u64::from(byte & 0x7f) << (7 * i);

        if byte < 0x80 {
            let used = i + 1;
            if used != bytes.len() {
                return Err(KeyError::Trailing(bytes.len() - used));
            }
            let number = ((value >> 1) as i64) ^ -((value & 1) as i64);
            return Ok(number);
        }
    }

    Err(KeyError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_roundtrip_edges() {
        for n in [
            0,
            1,
            -1,
            63,
            -64,
            64,
            -65,
            404,
            2_916,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
            i64::MAX,
            i64::MIN,
        ] {
            assert_eq!(decode_key(&encode_key(n)), Ok(n), "roundtrip of {}", n);
        }
    }

    #[test]
    fn test_small_numbers_are_compact() {
        assert_eq!(encode_key(0), vec![0x00]);
        assert_eq!(encode_key(-1), vec![0x01]);
        assert_eq!(encode_key(1), vec![0x02]);
        assert_eq!(encode_key(63).len(), 1);
        assert_eq!(encode_key(64).len(), 2);
        assert_eq!(encode_key(3000).len(), 2);
        assert_eq!(encode_key(i64::MIN).len(), MAX_KEY_LEN);
        assert_eq!(encode_key(i64::MAX).len(), MAX_KEY_LEN);
    }

    #[test]
    fn test_decode_rejects_malformed_keys() {
        assert_eq!(decode_key(&[]), Err(KeyError::Truncated));
        assert_eq!(decode_key(&[0x80, 0x80]), Err(KeyError::Truncated));
        assert_eq!(decode_key(&[0x02, 0x00]), Err(KeyError::Trailing(1)));
        assert_eq!(decode_key(&[0xff; 10]), Err(KeyError::Overflow));
        assert_eq!(decode_key(&[0xff; 11]), Err(KeyError::Overflow));
    }

    #[test]
    fn test_record_roundtrip() {
        let comic = ComicRecord {
            number: 1337,
            title: "Hack".to_string(),
            safe_title: "Hack".to_string(),
            image_url: "https://imgs.example.com/hack.png".to_string(),
            alt: "Sudo make me a sandwich.".to_string(),
            link: Some("https://example.com".to_string()),
            news: None,
            transcript: "[[Two people at a terminal]]".to_string(),
            year: "2014".to_string(),
            month: "4".to_string(),
            day: "14".to_string(),
        };

        let bytes = encode_record(&comic).unwrap();
        assert_eq!(decode_record(&bytes).unwrap(), comic);
    }

    #[test]
    fn test_decode_record_garbage() {
        assert!(decode_record(b"\x00\x01not json").is_err());
        assert!(decode_record(b"").is_err());
    }
}
