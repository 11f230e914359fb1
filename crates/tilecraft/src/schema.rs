//! Schema: compiled, ordered list of fields used to decode byte slices into
//! [Record]s and encode them back.

use std::collections::HashSet;

use crate::{
    compiled::CompiledField,
    errors::{DecodeError, EncodeError, SchemaError},
    field::Field,
    value::Record,
};

/// A compiled schema. Use [Schema::compile] to build one from [Field]s, then
/// [Schema::decode] and [Schema::encode] as often as needed; a schema is
/// never mutated after compilation and can be shared across threads.
#[derive(Debug, Clone)]
pub struct Schema {
    fixed_size: Option<usize>,
    /// Compiled fields in definition order.
    pub fields: Vec<CompiledField>,
}

impl Schema {
    /// Compiles a slice of [Field]s into a schema. Fails if any field is
    /// invalid, a name repeats, or more than one field takes the rest of the buffer.
    pub fn compile(fields: &[Field]) -> Result<Self, SchemaError> {
        let mut compiled_fields: Vec<CompiledField> = Vec::with_capacity(fields.len());
        let mut names = HashSet::with_capacity(fields.len());
        let mut rest_seen = false;
        let mut fixed_size = Some(0usize);

        for field in fields {
            let compiled_field: CompiledField = field.try_into()?;

            if !names.insert(compiled_field.name.clone()) {
                return Err(SchemaError::InvalidFieldName(compiled_field.name));
            }

            if compiled_field.is_rest() {
                if rest_seen {
                    return Err(SchemaError::MultipleRestFields(compiled_field.name));
                }
                rest_seen = true;
            }

            fixed_size = fixed_size
                .zip(compiled_field.fixed_size())
                .and_then(|(total, size)| total.checked_add(size));

            compiled_fields.push(compiled_field);
        }

        Ok(Self {
            fixed_size,
            fields: compiled_fields,
        })
    }

    /// Bytes a decode consumes when every field is sequential with a literal
    /// length and count; `None` when any of it depends on the input.
    pub fn fixed_size(&self) -> Option<usize> {
        self.fixed_size
    }

    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Decodes `data` starting at `base`. Returns the record and the cursor
    /// just past the last field read.
    pub fn decode(&self, data: &[u8], base: usize) -> Result<(Record, usize), DecodeError> {
        let mut record = Record::with_capacity(self.fields.len());
        let mut cursor = base;

        for field in &self.fields {
            let value = field.decode(data, &mut cursor, &record)?;
            tracing::trace!(field = %field.name, cursor, "decoded field");
            record.insert(field.name.clone(), value);
        }

        Ok((record, cursor))
    }

    /// Encodes `record` field by field. Values are written as given: lengths
    /// and counts the record carries are not recomputed, so they must already
    /// agree with the data they describe.
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(self.fixed_size.unwrap_or_default());
        let mut cursor = 0;

        for field in &self.fields {
            field.encode(record, &mut out, &mut cursor)?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::{BoundsError, ExprError},
        expr::Expr,
        registry::PrimitiveKind,
        value::Value,
    };

    use super::*;

    fn header_schema() -> Schema {
        Schema::compile(&[
            Field::new("magic", PrimitiveKind::Str).length(4),
            Field::new("version", PrimitiveKind::U32),
            Field::new("byteLength", PrimitiveKind::U32),
        ])
        .unwrap()
    }

    #[test]
    fn test_decode_empty() {
        let schema = Schema::compile(&[]).unwrap();
        let result = schema.decode(&[0x01, 0x02], 0);
        assert_eq!(result, Ok((Record::new(), 0)));
        assert_eq!(schema.fixed_size(), Some(0));
    }

    #[test]
    fn test_decode_sequential() {
        let schema = header_schema();
        let data = b"glTF\x02\0\0\0\x0c\0\0\0";

        let (record, cursor) = schema.decode(data, 0).unwrap();
        assert_eq!(
            record,
            Record::new()
                .with("magic", "glTF")
                .with("version", 2u64)
                .with("byteLength", 12u64)
        );
        assert_eq!(cursor, 12);
        assert_eq!(schema.fixed_size(), Some(12));
    }

    #[test]
    fn test_decode_from_base_offset() {
        let schema = Schema::compile(&[Field::new("v", PrimitiveKind::U16_BE)]).unwrap();
        assert_eq!(
            schema.decode(&[0xAA, 0x01, 0x02], 1),
            Ok((Record::new().with("v", 0x0102u64), 3))
        );
    }

    #[test]
    fn test_count_from_earlier_field() {
        let schema = Schema::compile(&[
            Field::new("n", PrimitiveKind::U8),
            Field::new("items", PrimitiveKind::U16).count(Expr::field("n")),
            Field::rest("tail"),
        ])
        .unwrap();
        assert_eq!(schema.fixed_size(), None);

        let data = [2, 0x01, 0x00, 0x02, 0x00, 0xEE];
        let (record, cursor) = schema.decode(&data, 0).unwrap();

        assert_eq!(
            record.get("items"),
            Some(&Value::Array(vec![Value::UInt(1), Value::UInt(2)]))
        );
        assert_eq!(record.get("tail"), Some(&Value::Bytes(vec![0xEE])));
        assert_eq!(cursor, 6);
    }

    #[test]
    fn test_offset_override() {
        // String-table style lookup: a pointer, then the text it points at.
        let schema = Schema::compile(&[
            Field::new("nameOffset", PrimitiveKind::U8),
            Field::new("nameLength", PrimitiveKind::U8),
            Field::new("name", PrimitiveKind::Str)
                .offset(Expr::field("nameOffset"))
                .length(Expr::field("nameLength")),
        ])
        .unwrap();

        let data = b"\x04\x03..abc";
        let (record, cursor) = schema.decode(data, 0).unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("abc")));
        assert_eq!(cursor, 7);

        assert_eq!(schema.encode(&record).unwrap(), b"\x04\x03\0\0abc".to_vec());
    }

    #[test]
    fn test_bounds_error_before_slicing() {
        let schema = Schema::compile(&[
            Field::new("len", PrimitiveKind::U8),
            Field::new("data", PrimitiveKind::Raw).length(Expr::field("len")),
        ])
        .unwrap();

        assert_eq!(
            schema.decode(&[10, 1, 2], 0),
            Err(DecodeError::Bounds(BoundsError {
                what: "data".to_string(),
                offset: 1,
                len: 10,
                available: 3,
            }))
        );
    }

    #[test]
    fn test_offset_past_end_is_bounds_error() {
        let schema = Schema::compile(&[Field::new("x", PrimitiveKind::U8).offset(100)]).unwrap();
        assert!(matches!(schema.decode(&[0; 4], 0), Err(DecodeError::Bounds(_))));

        let schema = Schema::compile(&[Field::rest("x").offset(100)]).unwrap();
        assert!(matches!(schema.decode(&[0; 4], 0), Err(DecodeError::Bounds(_))));
    }

    #[test]
    fn test_unresolved_reference() {
        let schema =
            Schema::compile(&[Field::new("data", PrimitiveKind::Raw).length(Expr::field("later"))]).unwrap();

        assert_eq!(
            schema.decode(&[0; 4], 0),
            Err(DecodeError::Expr {
                field: "data".to_string(),
                source: ExprError::UnresolvedReference("later".to_string()),
            })
        );
    }

    #[test]
    fn test_nested_schema() {
        let entry = Schema::compile(&[
            Field::new("type", PrimitiveKind::U8).enum_map([(1, "LOAD"), (2, "DYNAMIC")]),
            Field::new("size", PrimitiveKind::U8),
        ])
        .unwrap();
        assert_eq!(entry.fixed_size(), Some(2));

        let schema = Schema::compile(&[
            Field::new("header", header_schema()),
            Field::new("entries", entry).count(2),
        ])
        .unwrap();
        assert_eq!(schema.fixed_size(), Some(16));

        let data = b"glTF\x02\0\0\0\x10\0\0\0\x01\x08\x07\x09";
        let (record, cursor) = schema.decode(data, 0).unwrap();
        assert_eq!(cursor, 16);
        assert_eq!(record.lookup("header.byteLength"), Some(&Value::UInt(16)));

        let entries = record.get("entries").and_then(Value::as_array).unwrap();
        assert_eq!(
            entries[0],
            Value::Record(Record::new().with("type", Value::Label("LOAD".to_string())).with("size", 8u64))
        );
        assert_eq!(
            entries[1],
            Value::Record(Record::new().with("type", 7u64).with("size", 9u64))
        );

        assert_eq!(schema.encode(&record).unwrap(), data.to_vec());
    }

    #[test]
    fn test_nested_rest_advances_by_consumed() {
        let chunk = Schema::compile(&[
            Field::new("length", PrimitiveKind::U8),
            Field::new("data", PrimitiveKind::Raw).length(Expr::field("length")),
        ])
        .unwrap();
        assert_eq!(chunk.fixed_size(), None);

        let schema = Schema::compile(&[Field::new("chunks", chunk).count(2), Field::rest("end")]).unwrap();
        let data = [1, 0xAA, 2, 0xBB, 0xCC, 0xFF];

        let (record, cursor) = schema.decode(&data, 0).unwrap();
        assert_eq!(record.get("end"), Some(&Value::Bytes(vec![0xFF])));
        assert_eq!(cursor, data.len());
        assert_eq!(schema.encode(&record).unwrap(), data.to_vec());
    }

    #[test]
    fn test_remaining_length_round_trip() {
        let schema = Schema::compile(&[
            Field::new("n", PrimitiveKind::U8),
            Field::new("data", PrimitiveKind::Raw).length(Expr::Remaining),
        ])
        .unwrap();

        let data = [1, 0xAA, 0xBB];
        let (record, _) = schema.decode(&data, 0).unwrap();
        assert_eq!(record.get("data"), Some(&Value::Bytes(vec![0xAA, 0xBB])));
        assert_eq!(schema.encode(&record).unwrap(), data.to_vec());
    }

    #[test]
    fn test_encode_offset_past_limit() {
        let schema = Schema::compile(&[
            Field::new("ptr", PrimitiveKind::U64),
            Field::new("v", PrimitiveKind::U8).offset(Expr::field("ptr")),
        ])
        .unwrap();

        for ptr in [u64::MAX, 1 << 40] {
            let record = Record::new().with("ptr", ptr).with("v", 1u64);
            assert!(matches!(schema.encode(&record), Err(EncodeError::Bounds(_))));
        }
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            Schema::compile(&[Field::new("a", PrimitiveKind::U8), Field::new("a", PrimitiveKind::U8)])
                .unwrap_err(),
            SchemaError::InvalidFieldName("a".to_string())
        );
        assert_eq!(
            Schema::compile(&[Field::rest("a"), Field::rest("b")]).unwrap_err(),
            SchemaError::MultipleRestFields("b".to_string())
        );
    }

    #[test]
    fn test_encode_missing_field() {
        let record = Record::new().with("magic", "glTF").with("version", 2u64);
        assert_eq!(
            header_schema().encode(&record),
            Err(EncodeError::MissingField("byteLength".to_string()))
        );
    }

    #[test]
    fn test_encode_does_not_recompute() {
        let record = Record::new()
            .with("magic", "glTF")
            .with("version", 2u64)
            .with("byteLength", 999u64);

        let bytes = header_schema().encode(&record).unwrap();
        assert_eq!(&bytes[8..], &999u32.to_le_bytes());
    }
}
