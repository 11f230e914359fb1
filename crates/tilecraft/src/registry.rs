//! Type registry: the codecs a field can be decoded and encoded with.
//!
//! Every field resolves to one [`FieldType`] when its schema is compiled:
//! a built-in [`PrimitiveKind`], a nested [`Schema`], or a named
//! [`CustomCodec`] looked up in a [`TypeRegistry`].
//!
//! ## Round trip
//!
//! For every primitive, `decode(encode(v)) == v` holds for representable `v`.
//! `str` stores one character per byte, so characters above U+00FF are not
//! representable (they are written as a `\uXXXX` escape).

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
    sync::Arc,
};

use crate::{
    bytes::{Endian, latin1_to_string, read_uint, sign_extend, string_to_latin1, write_uint},
    errors::{EncodeError, SchemaError},
    schema::Schema,
    value::{Record, Value},
};

/// Built-in primitive codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// Unsigned integer of 1, 2, 4 or 8 bytes.
    UInt { bytes: usize, endian: Endian },
    /// Two's complement integer of 1, 2, 4 or 8 bytes.
    Int { bytes: usize, endian: Endian },
    /// Latin-1 text, one character per byte.
    Str,
    /// Bytes passed through untouched.
    Raw,
}

impl PrimitiveKind {
    pub const U8: Self = Self::UInt { bytes: 1, endian: Endian::Little };
    pub const U16: Self = Self::UInt { bytes: 2, endian: Endian::Little };
    pub const U32: Self = Self::UInt { bytes: 4, endian: Endian::Little };
    pub const U64: Self = Self::UInt { bytes: 8, endian: Endian::Little };
    pub const U16_BE: Self = Self::UInt { bytes: 2, endian: Endian::Big };
    pub const U32_BE: Self = Self::UInt { bytes: 4, endian: Endian::Big };
    pub const U64_BE: Self = Self::UInt { bytes: 8, endian: Endian::Big };
    pub const I8: Self = Self::Int { bytes: 1, endian: Endian::Little };
    pub const I16: Self = Self::Int { bytes: 2, endian: Endian::Little };
    pub const I32: Self = Self::Int { bytes: 4, endian: Endian::Little };
    pub const I64: Self = Self::Int { bytes: 8, endian: Endian::Little };
    pub const I16_BE: Self = Self::Int { bytes: 2, endian: Endian::Big };
    pub const I32_BE: Self = Self::Int { bytes: 4, endian: Endian::Big };
    pub const I64_BE: Self = Self::Int { bytes: 8, endian: Endian::Big };

    /// Byte width for integers; text and raw bytes take their length from the field.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::UInt { bytes, .. } | Self::Int { bytes, .. } => Some(*bytes),
            Self::Str | Self::Raw => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.fixed_width().is_some()
    }

    /// Decodes exactly `bytes`. Integer slices must be `fixed_width` long.
    pub fn decode(&self, bytes: &[u8]) -> Value {
        match *self {
            Self::UInt { endian, .. } => Value::UInt(read_uint(bytes, endian)),
            Self::Int { bytes: width, endian } => {
                Value::Int(sign_extend(read_uint(bytes, endian), width * 8))
            }
            Self::Str => Value::Str(latin1_to_string(bytes)),
            Self::Raw => Value::Bytes(bytes.to_vec()),
        }
    }

    /// Encodes one value. `field` names the field in errors.
    pub fn encode(&self, value: &Value, field: &str) -> Result<Vec<u8>, EncodeError> {
        match (*self, value) {
            (Self::UInt { bytes, endian }, Value::Array(words)) if bytes == 8 => {
                let v = join_words(words, field)?;
                Ok(write_uint(v, bytes, endian))
            }
            (Self::UInt { bytes, endian }, _) => {
                let v = integer_of(value, field)?;
                if v < 0 || (bytes < 8 && v >= 1i128 << (bytes * 8)) || v > u64::MAX as i128 {
                    return Err(out_of_range(field, v, bytes));
                }
                Ok(write_uint(v as u64, bytes, endian))
            }
            (Self::Int { bytes, endian }, _) => {
                let v = integer_of(value, field)?;
                let bound = 1i128 << (bytes * 8 - 1);
                if v < -bound || v >= bound {
                    return Err(out_of_range(field, v, bytes));
                }
                Ok(write_uint(v as i64 as u64, bytes, endian))
            }
            (Self::Str, Value::Str(s)) => Ok(string_to_latin1(s)),
            (Self::Raw, Value::Bytes(b)) => Ok(b.clone()),
            _ => Err(EncodeError::InvalidValue(field.to_string())),
        }
    }
}

fn integer_of(value: &Value, field: &str) -> Result<i128, EncodeError> {
    match value {
        Value::UInt(v) => Ok(*v as i128),
        Value::Int(v) => Ok(*v as i128),
        _ => Err(EncodeError::InvalidValue(field.to_string())),
    }
}

/// Accepts the `[low, high]` two-word form of a 64-bit value.
fn join_words(words: &[Value], field: &str) -> Result<u64, EncodeError> {
    let [lo, hi] = words else {
        return Err(EncodeError::Arity {
            field: field.to_string(),
            expected: 2,
            actual: words.len(),
        });
    };

    let word = |v: &Value| {
        v.as_u64()
            .and_then(|w| u32::try_from(w).ok())
            .ok_or_else(|| EncodeError::InvalidValue(field.to_string()))
    };

    Ok(word(lo)? as u64 | (word(hi)? as u64) << 32)
}

fn out_of_range(field: &str, value: i128, bytes: usize) -> EncodeError {
    EncodeError::OutOfRange {
        field: field.to_string(),
        value,
        bytes,
    }
}

impl FromStr for PrimitiveKind {
    type Err = SchemaError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(match tag {
            "u8" | "uint8" => Self::U8,
            "u16" | "uint16" => Self::U16,
            "u32" | "uint32" => Self::U32,
            "u64" | "uint64" => Self::U64,
            "u16be" | "uint16_big" => Self::U16_BE,
            "u32be" | "uint32_big" => Self::U32_BE,
            "u64be" | "uint64_big" => Self::U64_BE,
            "i8" | "int8" => Self::I8,
            "i16" | "int16" => Self::I16,
            "i32" | "int32" => Self::I32,
            "i64" | "int64" => Self::I64,
            "i16be" | "int16_big" => Self::I16_BE,
            "i32be" | "int32_big" => Self::I32_BE,
            "i64be" | "int64_big" => Self::I64_BE,
            "str" | "string" => Self::Str,
            "raw" | "bytes" => Self::Raw,
            _ => return Err(SchemaError::UnknownType(tag.to_string())),
        })
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt { bytes, endian } => write!(f, "u{}{}", bytes * 8, suffix(*endian, *bytes)),
            Self::Int { bytes, endian } => write!(f, "i{}{}", bytes * 8, suffix(*endian, *bytes)),
            Self::Str => f.write_str("str"),
            Self::Raw => f.write_str("raw"),
        }
    }
}

fn suffix(endian: Endian, bytes: usize) -> &'static str {
    match endian {
        Endian::Big if bytes > 1 => "be",
        _ => "",
    }
}

/// Decodes a field slice with access to the record decoded so far.
pub type CustomDecode = fn(&[u8], &Record) -> Result<Value, String>;
/// Encodes a value; receives the field's resolved length when it has one.
pub type CustomEncode = fn(&Value, Option<usize>) -> Result<Vec<u8>, String>;

/// A user-supplied codec pair.
#[derive(Debug, Clone)]
pub struct CustomCodec {
    pub name: String,
    pub decode: CustomDecode,
    pub encode: CustomEncode,
    /// Length used when the field does not declare one.
    pub width: Option<usize>,
}

/// How a field's bytes are interpreted.
#[derive(Debug, Clone)]
pub enum FieldType {
    Primitive(PrimitiveKind),
    /// Sub-schema decoded over the field's slice.
    Nested(Arc<Schema>),
    Custom(CustomCodec),
}

impl FieldType {
    /// Length implied by the type alone.
    pub fn implied_length(&self) -> Option<usize> {
        match self {
            FieldType::Primitive(kind) => kind.fixed_width(),
            FieldType::Nested(schema) => schema.fixed_size(),
            FieldType::Custom(codec) => codec.width,
        }
    }
}

impl From<PrimitiveKind> for FieldType {
    fn from(kind: PrimitiveKind) -> Self {
        FieldType::Primitive(kind)
    }
}

impl From<Arc<Schema>> for FieldType {
    fn from(schema: Arc<Schema>) -> Self {
        FieldType::Nested(schema)
    }
}

impl From<Schema> for FieldType {
    fn from(schema: Schema) -> Self {
        FieldType::Nested(Arc::new(schema))
    }
}

/// Resolves type tags to [`FieldType`]s. Built-in primitive tags always
/// resolve; other names must be registered as custom codecs.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    custom: HashMap<String, CustomCodec>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            custom: HashMap::new(),
        };
        registry.register(CustomCodec {
            name: "cstr".to_string(),
            decode: decode_cstr,
            encode: encode_cstr,
            width: None,
        });

        registry
    }
}

impl TypeRegistry {
    /// Registry with no custom codecs at all.
    pub fn empty() -> Self {
        Self {
            custom: HashMap::new(),
        }
    }

    pub fn register(&mut self, codec: CustomCodec) -> &mut Self {
        self.custom.insert(codec.name.clone(), codec);
        self
    }

    pub fn resolve(&self, tag: &str) -> Result<FieldType, SchemaError> {
        if let Some(codec) = self.custom.get(tag) {
            return Ok(FieldType::Custom(codec.clone()));
        }

        tag.parse::<PrimitiveKind>().map(FieldType::Primitive)
    }
}

/// Zero-terminated text in a fixed-size slot.
fn decode_cstr(bytes: &[u8], _: &Record) -> Result<Value, String> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    Ok(Value::Str(latin1_to_string(&bytes[..end])))
}

fn encode_cstr(value: &Value, length: Option<usize>) -> Result<Vec<u8>, String> {
    let Value::Str(s) = value else {
        return Err("expected a string".to_string());
    };

    let mut out = string_to_latin1(s);
    if out.contains(&0) {
        return Err("string contains a NUL byte".to_string());
    }

    match length {
        Some(len) if out.len() < len => out.resize(len, 0),
        None => out.push(0),
        _ => {}
    }

    Ok(out)
}

/// Replaces a mapped integer with its label; anything else passes through.
pub fn apply_enum(value: Value, map: &BTreeMap<u64, String>) -> Value {
    match value.as_u64().and_then(|raw| map.get(&raw)) {
        Some(label) => Value::Label(label.clone()),
        None => value,
    }
}

/// Inverse of [`apply_enum`].
pub fn unapply_enum(
    value: &Value,
    map: &BTreeMap<u64, String>,
    field: &str,
) -> Result<Value, EncodeError> {
    match value {
        Value::Label(label) => map
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(raw, _)| Value::UInt(*raw))
            .ok_or_else(|| EncodeError::UnknownLabel {
                field: field.to_string(),
                label: label.clone(),
            }),
        other => Ok(other.clone()),
    }
}
