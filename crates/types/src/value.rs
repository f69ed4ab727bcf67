use crate::CodecError;
use serde::{Deserialize, Serialize};

/// A field's declared SQL type.
///
/// Tag numbering matches the on-disk field descriptor (`type:u64`) and
/// mirrors the reference engine's `DBFields::TYPE_*` constants so that an
/// existing table file's type byte decodes the same way across a rewrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Bool,
    /// Fixed-capacity byte string, declared length is payload capacity.
    Char,
    /// Same representation as `Char`; kept distinct so `DESC TABLE` can
    /// round-trip the column type the user declared.
    UChar,
    Float,
    Double,
}

impl SqlType {
    pub const ALL: [SqlType; 13] = [
        SqlType::I8,
        SqlType::U8,
        SqlType::I16,
        SqlType::U16,
        SqlType::I32,
        SqlType::U32,
        SqlType::I64,
        SqlType::U64,
        SqlType::Bool,
        SqlType::Char,
        SqlType::UChar,
        SqlType::Float,
        SqlType::Double,
    ];

    pub fn type_tag(self) -> u64 {
        match self {
            SqlType::I8 => 0,
            SqlType::U8 => 1,
            SqlType::I16 => 2,
            SqlType::U16 => 3,
            SqlType::I32 => 4,
            SqlType::U32 => 5,
            SqlType::I64 => 6,
            SqlType::U64 => 7,
            SqlType::Bool => 8,
            SqlType::Char => 9,
            SqlType::UChar => 10,
            SqlType::Float => 11,
            SqlType::Double => 12,
        }
    }

    pub fn from_tag(tag: u64) -> Result<Self, CodecError> {
        Ok(match tag {
            0 => SqlType::I8,
            1 => SqlType::U8,
            2 => SqlType::I16,
            3 => SqlType::U16,
            4 => SqlType::I32,
            5 => SqlType::U32,
            6 => SqlType::I64,
            7 => SqlType::U64,
            8 => SqlType::Bool,
            9 => SqlType::Char,
            10 => SqlType::UChar,
            11 => SqlType::Float,
            12 => SqlType::Double,
            other => return Err(CodecError::UnknownTypeTag(other)),
        })
    }

    /// Payload size in bytes for fixed-width scalar types, or `None` for the
    /// variable-capacity string types (`Char`/`UChar`), whose payload size is
    /// the column's declared length minus the one-byte null flag.
    pub fn fixed_payload_len(self) -> Option<usize> {
        match self {
            SqlType::I8 | SqlType::U8 | SqlType::Bool => Some(1),
            SqlType::I16 | SqlType::U16 => Some(2),
            SqlType::I32 | SqlType::U32 | SqlType::Float => Some(4),
            SqlType::I64 | SqlType::U64 | SqlType::Double => Some(8),
            SqlType::Char | SqlType::UChar => None,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, SqlType::Char | SqlType::UChar)
    }

    pub fn is_signed_int(self) -> bool {
        matches!(
            self,
            SqlType::I8 | SqlType::I16 | SqlType::I32 | SqlType::I64
        )
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            SqlType::U8 | SqlType::U16 | SqlType::U32 | SqlType::U64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, SqlType::Float | SqlType::Double)
    }

    /// Total on-disk field length (flag byte + payload) for a fixed-width
    /// type. Variable-length string types pass their declared length
    /// through `Table`/`CREATE TABLE` instead.
    pub fn default_field_length(self) -> Option<u64> {
        self.fixed_payload_len().map(|n| n as u64 + 1)
    }

    pub fn name(self) -> &'static str {
        match self {
            SqlType::I8 => "INT8",
            SqlType::U8 => "UINT8",
            SqlType::I16 => "INT16",
            SqlType::U16 => "UINT16",
            SqlType::I32 => "INT",
            SqlType::U32 => "UINT",
            SqlType::I64 => "BIGINT",
            SqlType::U64 => "UBIGINT",
            SqlType::Bool => "BOOL",
            SqlType::Char => "VARCHAR",
            SqlType::UChar => "UVARCHAR",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
        }
    }
}

/// A decoded field value. `Null` stands for SQL NULL in any column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Bool(bool),
    Char(String),
    UChar(String),
    Float(f32),
    Double(f64),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        Some(match self {
            Value::I8(_) => SqlType::I8,
            Value::U8(_) => SqlType::U8,
            Value::I16(_) => SqlType::I16,
            Value::U16(_) => SqlType::U16,
            Value::I32(_) => SqlType::I32,
            Value::U32(_) => SqlType::U32,
            Value::I64(_) => SqlType::I64,
            Value::U64(_) => SqlType::U64,
            Value::Bool(_) => SqlType::Bool,
            Value::Char(_) => SqlType::Char,
            Value::UChar(_) => SqlType::UChar,
            Value::Float(_) => SqlType::Float,
            Value::Double(_) => SqlType::Double,
            Value::Null => return None,
        })
    }

    /// Widen any integer/float variant to `i64`/`f64` respectively. Used by
    /// `SUM`/`AVG`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U8(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::U64(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }
}
