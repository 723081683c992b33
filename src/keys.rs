//! Order-preserving binary encoding of index key tuples.
//!
//! Each part is a type tag followed by its payload; comparing encoded keys
//! bytewise compares the tuples part by part. Text payloads escape `0x00` as
//! `0x00 0xFF` and end with `0x00 0x01`, so the encoding of a tuple is a
//! prefix of every longer tuple that starts with it and of nothing else.

use crate::error::{Error, Result};

const TAG_NULL: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_TRUE: u8 = 0x03;
const TAG_NUMBER: u8 = 0x04;
const TAG_TEXT: u8 = 0x05;
const TAG_SEGMENT: u8 = 0x06;

const ESCAPE: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// One component of an index key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// A property name along a path. Kept apart from text leaves so that a
    /// path can never be confused with a value.
    Segment(String),
}

impl KeyPart {
    pub fn is_segment(&self) -> bool {
        matches!(self, Self::Segment(_))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => out.push(TAG_NULL),
            Self::Bool(false) => out.push(TAG_FALSE),
            Self::Bool(true) => out.push(TAG_TRUE),
            Self::Number(n) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&sortable_f64(*n));
            }
            Self::Text(s) => {
                out.push(TAG_TEXT);
                escape_into(s.as_bytes(), out);
            }
            Self::Segment(s) => {
                out.push(TAG_SEGMENT);
                escape_into(s.as_bytes(), out);
            }
        }
    }
}

/// Encode a sequence of parts.
pub fn encode<'a>(parts: impl IntoIterator<Item = &'a KeyPart>) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        part.encode_into(&mut out);
    }
    out
}

/// Decode a full key back into its parts.
pub fn decode(mut bytes: &[u8]) -> Result<Vec<KeyPart>> {
    let mut parts = Vec::new();
    while let Some((&tag, rest)) = bytes.split_first() {
        bytes = rest;
        let part = match tag {
            TAG_NULL => KeyPart::Null,
            TAG_FALSE => KeyPart::Bool(false),
            TAG_TRUE => KeyPart::Bool(true),
            TAG_NUMBER => {
                let (raw, rest) = bytes.split_at_checked(8).ok_or(Error::CorruptKey)?;
                bytes = rest;
                let raw: [u8; 8] = raw.try_into().map_err(|_| Error::CorruptKey)?;
                KeyPart::Number(from_sortable_f64(raw))
            }
            TAG_TEXT | TAG_SEGMENT => {
                let (text, rest) = unescape(bytes)?;
                bytes = rest;
                if tag == TAG_TEXT {
                    KeyPart::Text(text)
                } else {
                    KeyPart::Segment(text)
                }
            }
            _ => return Err(Error::CorruptKey),
        };
        parts.push(part);
    }
    Ok(parts)
}

/// The smallest key greater than every key starting with `prefix`, or `None`
/// when no such key exists.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Exclusive upper bound covering every key whose first part has the same
/// type as `part` (all numbers, all texts, ...).
pub fn type_end(part: &KeyPart) -> Vec<u8> {
    let tag = match part {
        KeyPart::Null => TAG_NULL,
        KeyPart::Bool(_) => TAG_TRUE,
        KeyPart::Number(_) => TAG_NUMBER,
        KeyPart::Text(_) => TAG_TEXT,
        KeyPart::Segment(_) => TAG_SEGMENT,
    };
    vec![tag + 1]
}

/// Inclusive lower bound of the type range of `part`.
pub fn type_start(part: &KeyPart) -> Vec<u8> {
    let tag = match part {
        KeyPart::Null => TAG_NULL,
        KeyPart::Bool(_) => TAG_FALSE,
        KeyPart::Number(_) => TAG_NUMBER,
        KeyPart::Text(_) => TAG_TEXT,
        KeyPart::Segment(_) => TAG_SEGMENT,
    };
    vec![tag]
}

fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0 {
            out.push(ESCAPE);
        }
    }
    out.extend_from_slice(&[0, TERMINATOR]);
}

fn unescape(bytes: &[u8]) -> Result<(String, &[u8])> {
    let mut raw = Vec::new();
    let mut i = 0;
    loop {
        match bytes.get(i) {
            Some(0) => match bytes.get(i + 1) {
                Some(&ESCAPE) => {
                    raw.push(0);
                    i += 2;
                }
                Some(&TERMINATOR) => {
                    let text =
                        String::from_utf8(raw).map_err(|_| Error::CorruptKey)?;
                    return Ok((text, &bytes[i + 2..]));
                }
                _ => return Err(Error::CorruptKey),
            },
            Some(&b) => {
                raw.push(b);
                i += 1;
            }
            None => return Err(Error::CorruptKey),
        }
    }
}

fn sortable_f64(n: f64) -> [u8; 8] {
    // -0.0 and 0.0 share one key.
    let n = if n == 0.0 { 0.0 } else { n };
    let bits = n.to_bits();
    let flipped = if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1 << 63)
    };
    flipped.to_be_bytes()
}

fn from_sortable_f64(raw: [u8; 8]) -> f64 {
    let flipped = u64::from_be_bytes(raw);
    let bits = if flipped >> 63 == 1 {
        flipped ^ (1 << 63)
    } else {
        !flipped
    };
    f64::from_bits(bits)
}
