use std::cmp::Ordering;

use crate::value::{SqlType, Value};
use crate::{CodecError, CodecResult};

const NULL_FLAG: u8 = 0x00;
const NON_NULL_FLAG: u8 = 0xff;

/// Encode `value` into `buf` as a field of the given `ty`/`length` (flag byte
/// + payload, as laid out by every record slot). `length` is the field
/// descriptor's declared length; for `Char`/`UChar` it bounds the payload,
/// for fixed-width scalars it must equal `ty.default_field_length()`.
pub fn encode(value: &Value, ty: SqlType, length: usize, buf: &mut [u8]) -> CodecResult<()> {
    if buf.len() < length {
        return Err(CodecError::BufferTooSmall {
            needed: length,
            actual: buf.len(),
        });
    }
    if let Value::Null = value {
        buf[0] = NULL_FLAG;
        buf[1..length].fill(0);
        return Ok(());
    }
    buf[0] = NON_NULL_FLAG;
    let payload = &mut buf[1..length];
    match (ty, value) {
        (SqlType::I8, Value::I8(v)) => payload[0] = *v as u8,
        (SqlType::U8, Value::U8(v)) => payload[0] = *v,
        (SqlType::Bool, Value::Bool(v)) => payload[0] = *v as u8,
        (SqlType::I16, Value::I16(v)) => payload[..2].copy_from_slice(&v.to_be_bytes()),
        (SqlType::U16, Value::U16(v)) => payload[..2].copy_from_slice(&v.to_be_bytes()),
        (SqlType::I32, Value::I32(v)) => payload[..4].copy_from_slice(&v.to_be_bytes()),
        (SqlType::U32, Value::U32(v)) => payload[..4].copy_from_slice(&v.to_be_bytes()),
        (SqlType::Float, Value::Float(v)) => payload[..4].copy_from_slice(&v.to_be_bytes()),
        (SqlType::I64, Value::I64(v)) => payload[..8].copy_from_slice(&v.to_be_bytes()),
        (SqlType::U64, Value::U64(v)) => payload[..8].copy_from_slice(&v.to_be_bytes()),
        (SqlType::Double, Value::Double(v)) => payload[..8].copy_from_slice(&v.to_be_bytes()),
        (SqlType::Char, Value::Char(s)) | (SqlType::UChar, Value::UChar(s)) => {
            let bytes = s.as_bytes();
            if bytes.len() > payload.len() {
                return Err(CodecError::StringTooLong {
                    actual: bytes.len(),
                    max: payload.len(),
                });
            }
            payload[..bytes.len()].copy_from_slice(bytes);
            payload[bytes.len()..].fill(0);
        }
        _ => {
            return Err(CodecError::BufferTooSmall {
                needed: length,
                actual: buf.len(),
            });
        }
    }
    Ok(())
}

/// Decode a field value from its raw `length`-byte slot, given its declared
/// type. Trailing `0x00` bytes are trimmed off string payloads.
pub fn decode(buf: &[u8], ty: SqlType) -> CodecResult<Value> {
    if buf.is_empty() {
        return Err(CodecError::BufferTooSmall {
            needed: 1,
            actual: 0,
        });
    }
    if buf[0] == NULL_FLAG {
        return Ok(Value::Null);
    }
    let payload = &buf[1..];
    Ok(match ty {
        SqlType::I8 => Value::I8(payload[0] as i8),
        SqlType::U8 => Value::U8(payload[0]),
        SqlType::Bool => Value::Bool(payload[0] != 0),
        SqlType::I16 => Value::I16(i16::from_be_bytes(payload[..2].try_into().unwrap())),
        SqlType::U16 => Value::U16(u16::from_be_bytes(payload[..2].try_into().unwrap())),
        SqlType::I32 => Value::I32(i32::from_be_bytes(payload[..4].try_into().unwrap())),
        SqlType::U32 => Value::U32(u32::from_be_bytes(payload[..4].try_into().unwrap())),
        SqlType::Float => Value::Float(f32::from_be_bytes(payload[..4].try_into().unwrap())),
        SqlType::I64 => Value::I64(i64::from_be_bytes(payload[..8].try_into().unwrap())),
        SqlType::U64 => Value::U64(u64::from_be_bytes(payload[..8].try_into().unwrap())),
        SqlType::Double => Value::Double(f64::from_be_bytes(payload[..8].try_into().unwrap())),
        SqlType::Char | SqlType::UChar => {
            let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
            let text = String::from_utf8_lossy(&payload[..end]).into_owned();
            if ty == SqlType::Char {
                Value::Char(text)
            } else {
                Value::UChar(text)
            }
        }
    })
}

/// Result of parsing a SQL literal against a declared field type.
pub enum LiteralOutcome {
    Value(Value),
    /// The literal text does not parse as the target type (`InsertRecordFailed::LiteralParseFailed`).
    ParseFailed,
    /// The literal parses but does not fit the type's range or the field's declared length
    /// (`InsertRecordFailed::LiteralOutOfRange`).
    OutOfRange,
}

/// Parse a literal's source text (already stripped of surrounding quotes for
/// string literals by the caller's tokenizer) against `ty`/`length`.
pub fn literal_parse(text: &str, ty: SqlType, length: usize) -> LiteralOutcome {
    if text.eq_ignore_ascii_case("null") {
        return LiteralOutcome::Value(Value::Null);
    }
    match ty {
        SqlType::Bool => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => LiteralOutcome::Value(Value::Bool(true)),
            "false" | "0" => LiteralOutcome::Value(Value::Bool(false)),
            _ => LiteralOutcome::ParseFailed,
        },
        SqlType::I8 => parse_signed(text, i8::MIN as i64, i8::MAX as i64, |v| Value::I8(v as i8)),
        SqlType::I16 => parse_signed(text, i16::MIN as i64, i16::MAX as i64, |v| Value::I16(v as i16)),
        SqlType::I32 => parse_signed(text, i32::MIN as i64, i32::MAX as i64, |v| Value::I32(v as i32)),
        SqlType::I64 => parse_signed(text, i64::MIN, i64::MAX, Value::I64),
        SqlType::U8 => parse_unsigned(text, u8::MAX as u64, |v| Value::U8(v as u8)),
        SqlType::U16 => parse_unsigned(text, u16::MAX as u64, |v| Value::U16(v as u16)),
        SqlType::U32 => parse_unsigned(text, u32::MAX as u64, |v| Value::U32(v as u32)),
        SqlType::U64 => parse_unsigned(text, u64::MAX, Value::U64),
        SqlType::Float => match text.parse::<f32>() {
            Ok(v) if v.is_finite() => LiteralOutcome::Value(Value::Float(v)),
            Ok(_) => LiteralOutcome::OutOfRange,
            Err(_) => LiteralOutcome::ParseFailed,
        },
        SqlType::Double => match text.parse::<f64>() {
            Ok(v) if v.is_finite() => LiteralOutcome::Value(Value::Double(v)),
            Ok(_) => LiteralOutcome::OutOfRange,
            Err(_) => LiteralOutcome::ParseFailed,
        },
        SqlType::Char | SqlType::UChar => {
            let unescaped = match unescape(text) {
                Some(s) => s,
                None => return LiteralOutcome::ParseFailed,
            };
            let max_payload = length.saturating_sub(1);
            if unescaped.as_bytes().len() > max_payload {
                return LiteralOutcome::OutOfRange;
            }
            LiteralOutcome::Value(if ty == SqlType::Char {
                Value::Char(unescaped)
            } else {
                Value::UChar(unescaped)
            })
        }
    }
}

fn parse_signed(text: &str, min: i64, max: i64, wrap: impl Fn(i64) -> Value) -> LiteralOutcome {
    match text.parse::<i64>() {
        Ok(v) if v >= min && v <= max => LiteralOutcome::Value(wrap(v)),
        Ok(_) => LiteralOutcome::OutOfRange,
        Err(_) => LiteralOutcome::ParseFailed,
    }
}

fn parse_unsigned(text: &str, max: u64, wrap: impl Fn(u64) -> Value) -> LiteralOutcome {
    match text.parse::<u64>() {
        Ok(v) if v <= max => LiteralOutcome::Value(wrap(v)),
        Ok(_) => LiteralOutcome::OutOfRange,
        Err(_) => LiteralOutcome::ParseFailed,
    }
}

/// Expand the backslash escapes this engine recognizes in string literals:
/// `\b \n \r \t \\ \'`. Returns `None` on a trailing or unrecognized escape.
fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'b' => out.push('\u{8}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            _ => return None,
        }
    }
    Some(out)
}

/// Render a decoded field's raw bytes as the text `DESC`/`SELECT` output
/// shows the user. `NULL` for the null flag, otherwise the type's natural
/// text form.
pub fn literal_render(buf: &[u8], ty: SqlType) -> String {
    match decode(buf, ty) {
        Ok(Value::Null) | Err(_) => "NULL".to_string(),
        Ok(Value::I8(v)) => v.to_string(),
        Ok(Value::U8(v)) => v.to_string(),
        Ok(Value::I16(v)) => v.to_string(),
        Ok(Value::U16(v)) => v.to_string(),
        Ok(Value::I32(v)) => v.to_string(),
        Ok(Value::U32(v)) => v.to_string(),
        Ok(Value::I64(v)) => v.to_string(),
        Ok(Value::U64(v)) => v.to_string(),
        Ok(Value::Bool(v)) => v.to_string(),
        Ok(Value::Float(v)) => v.to_string(),
        Ok(Value::Double(v)) => v.to_string(),
        Ok(Value::Char(s)) | Ok(Value::UChar(s)) => s,
    }
}

/// Byte-wise comparison of two encoded field slots of the same `ty`, used by
/// the B+-tree comparator and by `ORDER BY`/condition evaluation. SQL NULLs
/// sort before every non-null value, and equal to each other.
pub fn compare(a: &[u8], b: &[u8], ty: SqlType) -> Ordering {
    match (a[0] == NULL_FLAG, b[0] == NULL_FLAG) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    if ty.is_string() {
        return a[1..].cmp(&b[1..]);
    }
    let (va, vb) = (decode(a, ty), decode(b, ty));
    match (va, vb) {
        (Ok(va), Ok(vb)) => {
            if ty.is_float() {
                va.as_f64()
                    .partial_cmp(&vb.as_f64())
                    .unwrap_or(Ordering::Equal)
            } else if ty.is_unsigned_int() || ty == SqlType::Bool {
                let (ua, ub) = match (va, vb) {
                    (Value::U8(x), Value::U8(y)) => (x as u64, y as u64),
                    (Value::U16(x), Value::U16(y)) => (x as u64, y as u64),
                    (Value::U32(x), Value::U32(y)) => (x as u64, y as u64),
                    (Value::U64(x), Value::U64(y)) => (x, y),
                    (Value::Bool(x), Value::Bool(y)) => (x as u64, y as u64),
                    _ => (0, 0),
                };
                ua.cmp(&ub)
            } else {
                va.as_i64().cmp(&vb.as_i64())
            }
        }
        _ => Ordering::Equal,
    }
}

/// The smallest possible encoded value for `ty` at the given field `length`,
/// used as the lower bound of a half-open range scan that must exclude SQL
/// NULLs (`>` / `>=` on a nullable column): flag byte `0xff` (non-null) with
/// an all-zero / type-minimum payload sorts below every real value of `ty`.
pub fn min_value(ty: SqlType, length: usize) -> Vec<u8> {
    let mut buf = vec![0u8; length];
    buf[0] = NON_NULL_FLAG;
    if ty.is_signed_int() {
        let payload_len = length - 1;
        buf[1] = 0x80;
        for b in &mut buf[2..1 + payload_len] {
            *b = 0x00;
        }
    } else if ty == SqlType::Float || ty == SqlType::Double {
        // Most negative finite value: sign bit set, all exponent/mantissa bits set
        // except the exponent's all-ones (which would be -inf/NaN territory); using
        // MIN rather than NEG_INFINITY keeps it a valid, comparable finite bound.
        let min_bytes: Vec<u8> = if ty == SqlType::Float {
            f32::MIN.to_be_bytes().to_vec()
        } else {
            f64::MIN.to_be_bytes().to_vec()
        };
        buf[1..].copy_from_slice(&min_bytes);
    }
    buf
}

/// The largest possible encoded value for `ty` at the given field `length`,
/// used as the open upper bound of a half-open range scan standing in for
/// "no upper bound" (spec §4.6.a's `null_sentinel`). Unsigned/char/bool
/// fields are naturally bounded by an all-`0xff` payload; signed and
/// floating-point fields need their type-specific maximum.
pub fn max_value(ty: SqlType, length: usize) -> Vec<u8> {
    let mut buf = vec![0xffu8; length];
    buf[0] = NON_NULL_FLAG;
    if ty.is_signed_int() {
        let payload_len = length - 1;
        buf[1] = 0x7f;
        for b in &mut buf[2..1 + payload_len] {
            *b = 0xff;
        }
    } else if ty == SqlType::Float || ty == SqlType::Double {
        let max_bytes: Vec<u8> = if ty == SqlType::Float {
            f32::MAX.to_be_bytes().to_vec()
        } else {
            f64::MAX.to_be_bytes().to_vec()
        };
        buf[1..].copy_from_slice(&max_bytes);
    }
    buf
}
