use serde::{Serialize, Serializer, ser::SerializeMap};
use tilecraft::value::{Record, Value};

/// Serializes a decoded value as plain JSON.
pub struct ValueOut<'a>(pub &'a Value);

/// Serializes a record as a JSON object, keeping field order.
pub struct RecordOut<'a>(pub &'a Record);

impl Serialize for ValueOut<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Str(s) | Value::Label(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.collect_seq(b),
            Value::Array(values) => serializer.collect_seq(values.iter().map(ValueOut)),
            Value::Record(record) => RecordOut(record).serialize(serializer),
        }
    }
}

impl Serialize for RecordOut<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0.iter() {
            map.serialize_entry(name, &ValueOut(value))?;
        }
        map.end()
    }
}

/// One JSON line for a header.
pub fn to_json_line(record: &Record) -> serde_json::Result<String> {
    serde_json::to_string(&RecordOut(record))
}
