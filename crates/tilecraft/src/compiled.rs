use std::collections::BTreeMap;

use crate::{
    bytes::slice_at,
    errors::{BoundsError, DecodeError, EncodeError, ExprError, SchemaError},
    expr::{Expr, Scope},
    field::{Count, Field},
    registry::{FieldType, PrimitiveKind, apply_enum, unapply_enum},
    value::{Record, Value},
};

/// Resolved element length of a compiled field.
#[derive(Debug, Clone)]
pub enum Length {
    Expr(Expr),
    /// Everything from the cursor to the end of the buffer. For nested
    /// schemas, the cursor advances by what the sub-schema consumed.
    Rest,
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub ty: FieldType,
    pub length: Length,
    pub offset: Option<Expr>,
    pub count: Count,
    pub enum_map: Option<BTreeMap<u64, String>>,
}

impl TryFrom<&Field> for CompiledField {
    type Error = SchemaError;

    fn try_from(value: &Field) -> Result<Self, Self::Error> {
        if value.name.trim().is_empty() {
            return Err(SchemaError::InvalidFieldName(value.name.clone()));
        }

        let integer_width = match &value.ty {
            FieldType::Primitive(kind) => kind.fixed_width(),
            _ => None,
        };

        if value.enum_map.is_some() && integer_width.is_none() {
            return Err(SchemaError::EnumOnNonInteger(value.name.clone()));
        }

        if let Some(width) = integer_width {
            if !matches!(width, 1 | 2 | 4 | 8) {
                return Err(SchemaError::InvalidFieldSize(value.name.clone()));
            }
        }

        let length = match (&value.length, value.ty.implied_length()) {
            (Some(expr), _) => {
                if let Some(width) = integer_width {
                    if expr.as_const() != Some(width) {
                        return Err(SchemaError::InvalidFieldSize(value.name.clone()));
                    }
                }
                Length::Expr(expr.clone())
            }
            (None, Some(implied)) => Length::Expr(Expr::Const(implied)),
            (None, None) => Length::Rest,
        };

        let plain_rest = matches!(length, Length::Rest) && !matches!(value.ty, FieldType::Nested(_));
        if plain_rest && matches!(value.count, Count::Repeat(_)) {
            return Err(SchemaError::InvalidFieldSize(value.name.clone()));
        }

        Ok(CompiledField {
            name: value.name.clone(),
            ty: value.ty.clone(),
            length,
            offset: value.offset.clone(),
            count: value.count.clone(),
            enum_map: value.enum_map.clone(),
        })
    }
}

impl CompiledField {
    /// Literal bytes this field occupies, if it is sequential and fixed.
    pub fn fixed_size(&self) -> Option<usize> {
        if self.offset.is_some() {
            return None;
        }

        let len = match &self.length {
            Length::Expr(expr) => expr.as_const()?,
            Length::Rest => return None,
        };

        match &self.count {
            Count::Scalar => Some(len),
            Count::Repeat(expr) => len.checked_mul(expr.as_const()?),
        }
    }

    /// Whether this field swallows the rest of the buffer on its own.
    pub fn is_rest(&self) -> bool {
        matches!(self.length, Length::Rest) && !matches!(self.ty, FieldType::Nested(_))
    }

    fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Result<usize, DecodeError> {
        expr.eval(scope).map_err(|source| DecodeError::Expr {
            field: self.name.clone(),
            source,
        })
    }

    /// Decodes this field at `*cursor`, which is left just past the last element.
    pub fn decode(
        &self,
        data: &[u8],
        cursor: &mut usize,
        record: &Record,
    ) -> Result<Value, DecodeError> {
        let scope = |cursor| Scope {
            record,
            buffer: data,
            cursor,
        };

        if let Some(offset) = &self.offset {
            *cursor = self.eval(offset, &scope(*cursor))?;
        }

        let count = match &self.count {
            Count::Scalar => 1,
            Count::Repeat(expr) => self.eval(expr, &scope(*cursor))?,
        };

        let length = match &self.length {
            Length::Expr(expr) => Some(self.eval(expr, &scope(*cursor))?),
            Length::Rest => None,
        };

        // Every element needs at least `length` bytes; catch absurd counts
        // before allocating for them. Elements that may be empty are capped
        // at one per buffer byte.
        match length {
            Some(len) if len > 0 => {
                let total = len.checked_mul(count).unwrap_or(usize::MAX);
                slice_at(data, *cursor, total, &self.name)?;
            }
            _ if count > data.len().max(1) => {
                return Err(BoundsError {
                    what: format!("{} count", self.name),
                    offset: *cursor,
                    len: count,
                    available: data.len(),
                }
                .into());
            }
            _ => {}
        }

        let mut values = Vec::with_capacity(count.min(data.len().max(1)));
        for _ in 0..count {
            let len = match length {
                Some(len) => len,
                None => {
                    slice_at(data, *cursor, 0, &self.name)?;
                    data.len() - *cursor
                }
            };
            let bytes = slice_at(data, *cursor, len, &self.name)?;

            let (value, consumed) = match &self.ty {
                FieldType::Primitive(kind) => (kind.decode(bytes), len),
                FieldType::Nested(schema) => {
                    let (nested, end) = schema.decode(bytes, 0)?;
                    let consumed = if length.is_some() { len } else { end };
                    (Value::Record(nested), consumed)
                }
                FieldType::Custom(codec) => {
                    let value = (codec.decode)(bytes, record).map_err(|reason| {
                        DecodeError::Custom {
                            field: self.name.clone(),
                            reason,
                        }
                    })?;
                    (value, len)
                }
            };

            let value = match &self.enum_map {
                Some(map) => apply_enum(value, map),
                None => value,
            };

            values.push(value);
            *cursor += consumed;
        }

        Ok(match self.count {
            Count::Scalar => values.pop().unwrap_or(Value::Array(Vec::new())),
            Count::Repeat(_) => Value::Array(values),
        })
    }

    fn eval_for_encode(&self, expr: &Expr, scope: &Scope<'_>) -> Result<usize, EncodeError> {
        expr.eval(scope).map_err(|source: ExprError| EncodeError::Expr {
            field: self.name.clone(),
            source,
        })
    }

    /// Writes this field's value from `record` into `out` at `*cursor`.
    pub fn encode(
        &self,
        record: &Record,
        out: &mut Vec<u8>,
        cursor: &mut usize,
    ) -> Result<(), EncodeError> {
        let value = record
            .get(&self.name)
            .ok_or_else(|| EncodeError::MissingField(self.name.clone()))?;

        if let Some(offset) = &self.offset {
            let scope = Scope {
                record,
                buffer: out.as_slice(),
                cursor: *cursor,
            };
            *cursor = self.eval_for_encode(offset, &scope)?;
        }

        let scope = Scope {
            record,
            buffer: out.as_slice(),
            cursor: *cursor,
        };

        let elements: &[Value] = match (&self.count, value) {
            (Count::Scalar, Value::Array(values)) if !self.accepts_words() => {
                return Err(self.arity(1, values.len()));
            }
            (Count::Scalar, value) => std::slice::from_ref(value),
            (Count::Repeat(expr), Value::Array(values)) => {
                let expected = self.eval_for_encode(expr, &scope)?;
                if values.len() != expected {
                    return Err(self.arity(expected, values.len()));
                }
                values
            }
            (Count::Repeat(expr), _) => {
                return Err(self.arity(self.eval_for_encode(expr, &scope)?, 1));
            }
        };

        // Lengths that look at the buffer cannot be evaluated against a
        // half-written output; the encoded element decides instead.
        let length = match &self.length {
            Length::Expr(expr) if !expr.reads_buffer() => Some(self.eval_for_encode(expr, &scope)?),
            _ => None,
        };

        for element in elements {
            let bytes = self.encode_element(element, length)?;

            if let Some(expected) = length {
                if bytes.len() != expected {
                    return Err(EncodeError::Length {
                        field: self.name.clone(),
                        expected,
                        actual: bytes.len(),
                    });
                }
            }

            *cursor = write_at(out, *cursor, &bytes, &self.name)?;
        }

        Ok(())
    }

    fn encode_element(&self, element: &Value, length: Option<usize>) -> Result<Vec<u8>, EncodeError> {
        let element = match &self.enum_map {
            Some(map) => unapply_enum(element, map, &self.name)?,
            None => element.clone(),
        };

        match &self.ty {
            FieldType::Primitive(kind) => kind.encode(&element, &self.name),
            FieldType::Nested(schema) => {
                let Value::Record(nested) = &element else {
                    return Err(EncodeError::InvalidValue(self.name.clone()));
                };
                let mut bytes = schema.encode(nested)?;
                // Bytes the sub-schema does not model decode to nothing, so
                // they come back as zeros.
                if let Some(len) = length {
                    if bytes.len() < len {
                        bytes.resize(len, 0);
                    }
                }
                Ok(bytes)
            }
            FieldType::Custom(codec) => {
                (codec.encode)(&element, length).map_err(|reason| EncodeError::Custom {
                    field: self.name.clone(),
                    reason,
                })
            }
        }
    }

    /// 64-bit unsigned scalars also take the `[low, high]` two-word form.
    fn accepts_words(&self) -> bool {
        matches!(self.ty, FieldType::Primitive(PrimitiveKind::UInt { bytes: 8, .. }))
    }

    fn arity(&self, expected: usize, actual: usize) -> EncodeError {
        EncodeError::Arity {
            field: self.name.clone(),
            expected,
            actual,
        }
    }
}

/// Encoded output is limited to what a 32-bit length field can describe.
pub const MAX_ENCODED_LEN: usize = u32::MAX as usize;

/// Writes `bytes` at `pos`, zero-filling any gap and overwriting what is
/// there. Returns the position just past the written bytes.
fn write_at(out: &mut Vec<u8>, pos: usize, bytes: &[u8], what: &str) -> Result<usize, BoundsError> {
    let end = pos
        .checked_add(bytes.len())
        .filter(|end| *end <= MAX_ENCODED_LEN)
        .ok_or_else(|| BoundsError {
            what: what.to_string(),
            offset: pos,
            len: bytes.len(),
            available: MAX_ENCODED_LEN,
        })?;

    if out.len() < end {
        out.resize(end, 0);
    }
    out[pos..end].copy_from_slice(bytes);
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::Endian;

    #[test]
    fn test_compile_implied_length() {
        let field = CompiledField::try_from(&Field::new("version", PrimitiveKind::U32)).unwrap();
        assert!(matches!(field.length, Length::Expr(Expr::Const(4))));
        assert_eq!(field.fixed_size(), Some(4));

        let field = CompiledField::try_from(&Field::rest("data")).unwrap();
        assert!(field.is_rest());
        assert_eq!(field.fixed_size(), None);
    }

    #[test]
    fn test_compile_rejects_bad_fields() {
        assert_eq!(
            CompiledField::try_from(&Field::new(" ", PrimitiveKind::U8)).unwrap_err(),
            SchemaError::InvalidFieldName(" ".to_string())
        );
        assert_eq!(
            CompiledField::try_from(&Field::new("x", PrimitiveKind::U32).length(2)).unwrap_err(),
            SchemaError::InvalidFieldSize("x".to_string())
        );
        assert_eq!(
            CompiledField::try_from(&Field::new("x", PrimitiveKind::Str).length(4).enum_map([(1, "a")]))
                .unwrap_err(),
            SchemaError::EnumOnNonInteger("x".to_string())
        );
    }

    #[test]
    fn test_decode_repeated() {
        let field = CompiledField::try_from(&Field::new("res", PrimitiveKind::U16).count(3)).unwrap();
        let data = [1, 0, 2, 0, 3, 0, 9];
        let mut cursor = 0;

        let value = field.decode(&data, &mut cursor, &Record::new()).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![Value::UInt(1), Value::UInt(2), Value::UInt(3)])
        );
        assert_eq!(cursor, 6);
    }

    #[test]
    fn test_decode_count_one_is_sequence() {
        let field = CompiledField::try_from(&Field::new("n", PrimitiveKind::U8).count(1)).unwrap();
        let mut cursor = 0;
        assert_eq!(
            field.decode(&[7], &mut cursor, &Record::new()),
            Ok(Value::Array(vec![Value::UInt(7)]))
        );
    }

    #[test]
    fn test_decode_huge_count_is_bounds_error() {
        let field =
            CompiledField::try_from(&Field::new("items", PrimitiveKind::U32).count(Expr::field("n"))).unwrap();
        let record = Record::new().with("n", u64::from(u32::MAX));
        let mut cursor = 0;

        assert!(matches!(
            field.decode(&[0; 16], &mut cursor, &record),
            Err(DecodeError::Bounds(_))
        ));
    }

    #[test]
    fn test_encode_arity() {
        let field = CompiledField::try_from(&Field::new("res", PrimitiveKind::U16).count(2)).unwrap();
        let record = Record::new().with("res", Value::Array(vec![Value::UInt(1)]));
        let mut out = Vec::new();

        assert_eq!(
            field.encode(&record, &mut out, &mut 0),
            Err(EncodeError::Arity {
                field: "res".to_string(),
                expected: 2,
                actual: 1
            })
        );

        let record = Record::new().with("res", 5u64);
        assert!(matches!(
            field.encode(&record, &mut out, &mut 0),
            Err(EncodeError::Arity { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_encode_length_mismatch() {
        let field = CompiledField::try_from(&Field::new("magic", PrimitiveKind::Str).length(4)).unwrap();
        let record = Record::new().with("magic", "glTF2");

        assert_eq!(
            field.encode(&record, &mut Vec::new(), &mut 0),
            Err(EncodeError::Length {
                field: "magic".to_string(),
                expected: 4,
                actual: 5
            })
        );
    }

    #[test]
    fn test_write_at_fills_gap() {
        let mut out = vec![1];
        assert_eq!(write_at(&mut out, 3, &[9, 9], "x"), Ok(5));
        assert_eq!(out, vec![1, 0, 0, 9, 9]);

        assert_eq!(write_at(&mut out, 0, &[5], "x"), Ok(1));
        assert_eq!(out, vec![5, 0, 0, 9, 9]);
    }

    #[test]
    fn test_write_at_rejects_huge_positions() {
        let mut out = Vec::new();
        assert!(write_at(&mut out, usize::MAX, &[1], "x").is_err());
        assert!(write_at(&mut out, 1 << 40, &[1], "x").is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_compile_rejects_odd_integer_widths() {
        for kind in [
            PrimitiveKind::UInt { bytes: 16, endian: Endian::Little },
            PrimitiveKind::UInt { bytes: 3, endian: Endian::Big },
            PrimitiveKind::Int { bytes: 0, endian: Endian::Little },
        ] {
            assert_eq!(
                CompiledField::try_from(&Field::new("n", kind)).unwrap_err(),
                SchemaError::InvalidFieldSize("n".to_string())
            );
        }
    }

    #[test]
    fn test_compile_rejects_repeated_rest() {
        assert_eq!(
            CompiledField::try_from(&Field::rest("tail").count(2)).unwrap_err(),
            SchemaError::InvalidFieldSize("tail".to_string())
        );
    }

    #[test]
    fn test_decode_count_of_empty_elements_is_capped() {
        let field = CompiledField::try_from(
            &Field::new("items", PrimitiveKind::Raw).length(0).count(Expr::field("n")),
        )
        .unwrap();
        let mut cursor = 4;

        let record = Record::new().with("n", 20_000_000u64);
        assert!(matches!(
            field.decode(&[0; 4], &mut cursor, &record),
            Err(DecodeError::Bounds(_))
        ));

        let record = Record::new().with("n", 3u64);
        assert_eq!(
            field.decode(&[0; 4], &mut cursor, &record),
            Ok(Value::Array(vec![Value::Bytes(Vec::new()); 3]))
        );
    }

    #[test]
    fn test_encode_remaining_length_from_element() {
        let field = CompiledField::try_from(&Field::new("data", PrimitiveKind::Raw).length(Expr::Remaining)).unwrap();
        let record = Record::new().with("data", Value::Bytes(vec![0xAA, 0xBB]));
        let mut out = vec![1];
        let mut cursor = 1;

        field.encode(&record, &mut out, &mut cursor).unwrap();
        assert_eq!(out, vec![1, 0xAA, 0xBB]);
        assert_eq!(cursor, 3);
    }
}
