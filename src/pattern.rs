//! # Format Descriptors and Tuple Encoding
//!
//! Tuples are described by a compact format string with one type code
//! per field:
//!
//! | Code | Field type | Encoded body                          |
//! |------|------------|---------------------------------------|
//! | `u`  | `u32`      | 4 bytes little-endian                 |
//! | `i`  | `i64`      | 8 bytes little-endian                 |
//! | `s`  | UTF-8 text | `u32` length + bytes                  |
//! | `b`  | byte blob  | `u32` length + bytes                  |
//!
//! Each encoded field is prefixed by a one-byte type tag, so payloads
//! are self-describing and can be decoded without the original format.
//!
//! On the retrieval side a `?` before a code turns that field into a
//! capture: it matches any value of that type and the value is returned
//! to the caller. Fields without `?` are literals and must compare
//! equal. `"u?u"` therefore matches two-field tuples written with
//! `"uu"` whose first field equals the supplied literal, and captures
//! the second field.
//!
//! Matching is strict: the field count must be identical and every
//! field is either a literal or a capture, never both.

use crate::config::MAX_TUPLE_FIELDS;
use crate::error::{Result, SpaceError};

/// A single typed tuple field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    U32(u32),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::U32(_) => FieldType::U32,
            Field::I64(_) => FieldType::I64,
            Field::Str(_) => FieldType::Str,
            Field::Bytes(_) => FieldType::Bytes,
        }
    }
}

impl From<u32> for Field {
    fn from(v: u32) -> Self {
        Field::U32(v)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::I64(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Str(v.to_string())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Str(v)
    }
}

impl From<Vec<u8>> for Field {
    fn from(v: Vec<u8>) -> Self {
        Field::Bytes(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U32,
    I64,
    Str,
    Bytes,
}

const TAG_U32: u8 = 1;
const TAG_I64: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_BYTES: u8 = 4;

impl FieldType {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'u' => Some(FieldType::U32),
            'i' => Some(FieldType::I64),
            's' => Some(FieldType::Str),
            'b' => Some(FieldType::Bytes),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            FieldType::U32 => 'u',
            FieldType::I64 => 'i',
            FieldType::Str => 's',
            FieldType::Bytes => 'b',
        }
    }

    fn tag(&self) -> u8 {
        match self {
            FieldType::U32 => TAG_U32,
            FieldType::I64 => TAG_I64,
            FieldType::Str => TAG_STR,
            FieldType::Bytes => TAG_BYTES,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_U32 => Some(FieldType::U32),
            TAG_I64 => Some(FieldType::I64),
            TAG_STR => Some(FieldType::Str),
            TAG_BYTES => Some(FieldType::Bytes),
            _ => None,
        }
    }
}

/// One parsed format position: the field type plus whether `?` marked
/// it as a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormatSpec {
    field_type: FieldType,
    capture: bool,
}

fn parse_format(format: &str) -> Result<Vec<FormatSpec>> {
    let mut specs = Vec::new();
    let mut capture = false;

    for c in format.chars() {
        if c == '?' {
            if capture {
                return Err(SpaceError::encoding(format, "'?' may not repeat"));
            }
            capture = true;
            continue;
        }
        let field_type = FieldType::from_code(c)
            .ok_or_else(|| SpaceError::encoding(format, format!("unknown type code '{c}'")))?;
        specs.push(FormatSpec {
            field_type,
            capture,
        });
        capture = false;
    }

    if capture {
        return Err(SpaceError::encoding(format, "trailing '?' without a type code"));
    }
    if specs.is_empty() {
        return Err(SpaceError::encoding(format, "format has no fields"));
    }
    if specs.len() > MAX_TUPLE_FIELDS {
        return Err(SpaceError::encoding(
            format,
            format!("too many fields ({}, limit {MAX_TUPLE_FIELDS})", specs.len()),
        ));
    }

    Ok(specs)
}

/// A tuple encoded for the store: payload bytes plus the field count
/// that goes into the slot header.
#[derive(Debug)]
pub(crate) struct EncodedTuple {
    pub payload: Vec<u8>,
    pub field_count: u8,
}

/// Checks `values` against a write-side format and encodes them into a
/// payload. Captures are meaningless on the write side and rejected.
pub(crate) fn encode_tuple(format: &str, values: &[Field]) -> Result<EncodedTuple> {
    let specs = parse_format(format)?;

    if specs.iter().any(|s| s.capture) {
        return Err(SpaceError::encoding(format, "'?' capture in a write format"));
    }
    if specs.len() != values.len() {
        return Err(SpaceError::encoding(
            format,
            format!("format has {} fields but {} values given", specs.len(), values.len()),
        ));
    }

    let mut payload = Vec::new();
    for (spec, value) in specs.iter().zip(values) {
        if value.field_type() != spec.field_type {
            return Err(SpaceError::encoding(
                format,
                format!(
                    "value of type '{}' where format expects '{}'",
                    value.field_type().code(),
                    spec.field_type.code()
                ),
            ));
        }
        encode_field(&mut payload, value, format)?;
    }

    Ok(EncodedTuple {
        payload,
        field_count: specs.len() as u8,
    })
}

fn encode_field(payload: &mut Vec<u8>, value: &Field, format: &str) -> Result<()> {
    payload.push(value.field_type().tag());
    match value {
        Field::U32(v) => payload.extend_from_slice(&v.to_le_bytes()),
        Field::I64(v) => payload.extend_from_slice(&v.to_le_bytes()),
        Field::Str(v) => encode_len_prefixed(payload, v.as_bytes(), format)?,
        Field::Bytes(v) => encode_len_prefixed(payload, v, format)?,
    }
    Ok(())
}

fn encode_len_prefixed(payload: &mut Vec<u8>, bytes: &[u8], format: &str) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| SpaceError::encoding(format, "field longer than u32::MAX bytes"))?;
    payload.extend_from_slice(&len.to_le_bytes());
    payload.extend_from_slice(bytes);
    Ok(())
}

/// One matching position of a retrieval pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternField {
    Literal(Field),
    Capture(FieldType),
}

/// A retrieval pattern built from a format string and its literal
/// values.
#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    fields: Vec<PatternField>,
}

impl Pattern {
    /// Pairs a read-side format with its literal values, in format
    /// order. The literal slice must supply exactly one value per
    /// non-capture position.
    pub(crate) fn parse(format: &str, literals: &[Field]) -> Result<Self> {
        let specs = parse_format(format)?;
        let literal_slots = specs.iter().filter(|s| !s.capture).count();
        if literal_slots != literals.len() {
            return Err(SpaceError::encoding(
                format,
                format!("format has {literal_slots} literal fields but {} values given", literals.len()),
            ));
        }

        let mut fields = Vec::with_capacity(specs.len());
        let mut next_literal = 0;
        for spec in &specs {
            if spec.capture {
                fields.push(PatternField::Capture(spec.field_type));
            } else {
                // In bounds: the literal count was checked above.
                let literal = literals[next_literal].clone();
                next_literal += 1;
                if literal.field_type() != spec.field_type {
                    return Err(SpaceError::encoding(
                        format,
                        format!(
                            "literal of type '{}' where format expects '{}'",
                            literal.field_type().code(),
                            spec.field_type.code()
                        ),
                    ));
                }
                fields.push(PatternField::Literal(literal));
            }
        }

        Ok(Self { fields })
    }

    pub(crate) fn field_count(&self) -> u8 {
        self.fields.len() as u8
    }

    /// Matches decoded tuple fields against this pattern and, on
    /// success, returns the captured values in format order.
    pub(crate) fn match_captures(&self, fields: &[Field]) -> Option<Vec<Field>> {
        if fields.len() != self.fields.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (spec, field) in self.fields.iter().zip(fields) {
            match spec {
                PatternField::Literal(literal) => {
                    if literal != field {
                        return None;
                    }
                }
                PatternField::Capture(field_type) => {
                    if field.field_type() != *field_type {
                        return None;
                    }
                    captures.push(field.clone());
                }
            }
        }
        Some(captures)
    }
}

/// Decodes a slot payload back into fields. Failures here mean the
/// store bytes do not follow the encoding, which a well-behaved peer
/// never produces.
pub(crate) fn decode_fields(payload: &[u8], field_count: u8) -> Result<Vec<Field>> {
    let mut fields = Vec::with_capacity(field_count as usize);
    let mut rest = payload;

    for _ in 0..field_count {
        let (&tag, after_tag) = rest
            .split_first()
            .ok_or_else(|| decode_error("payload truncated before field tag"))?;
        let field_type = FieldType::from_tag(tag)
            .ok_or_else(|| decode_error(format!("unknown field tag {tag}")))?;
        let (field, after_field) = decode_field(field_type, after_tag)?;
        fields.push(field);
        rest = after_field;
    }

    if !rest.is_empty() {
        return Err(decode_error("payload has trailing bytes"));
    }
    Ok(fields)
}

fn decode_field(field_type: FieldType, bytes: &[u8]) -> Result<(Field, &[u8])> {
    match field_type {
        FieldType::U32 => {
            let (body, rest) = split_exact(bytes, 4)?;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(body);
            Ok((Field::U32(u32::from_le_bytes(buf)), rest))
        }
        FieldType::I64 => {
            let (body, rest) = split_exact(bytes, 8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(body);
            Ok((Field::I64(i64::from_le_bytes(buf)), rest))
        }
        FieldType::Str => {
            let (body, rest) = split_len_prefixed(bytes)?;
            let text = std::str::from_utf8(body)
                .map_err(|_| decode_error("string field is not UTF-8"))?;
            Ok((Field::Str(text.to_string()), rest))
        }
        FieldType::Bytes => {
            let (body, rest) = split_len_prefixed(bytes)?;
            Ok((Field::Bytes(body.to_vec()), rest))
        }
    }
}

fn split_exact(bytes: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if bytes.len() < len {
        return Err(decode_error("payload truncated inside a field"));
    }
    Ok(bytes.split_at(len))
}

fn split_len_prefixed(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len_bytes, rest) = split_exact(bytes, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(len_bytes);
    split_exact(rest, u32::from_le_bytes(buf) as usize)
}

fn decode_error(reason: impl Into<String>) -> SpaceError {
    SpaceError::encoding("<slot payload>", reason)
}
