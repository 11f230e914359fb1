//! Definition of logical fields used to build a [crate::schema::Schema].

use std::collections::BTreeMap;

use crate::{
    expr::Expr,
    registry::{FieldType, PrimitiveKind},
};

/// A single named field descriptor: where it lives, how long it is, how many
/// times it repeats and how its bytes are interpreted.
#[derive(Debug, Clone)]
pub struct Field {
    /// Key in the decoded [crate::value::Record]; unique within a schema.
    pub name: String,
    pub ty: FieldType,
    /// Bytes per element. `None` means the length implied by `ty`, or the rest
    /// of the buffer when the type implies none.
    pub length: Option<Expr>,
    /// Absolute position to jump to before reading.
    pub offset: Option<Expr>,
    pub count: Count,
    /// Labels for raw integer values. Unmapped values pass through.
    pub enum_map: Option<BTreeMap<u64, String>>,
}

/// Whether a field holds one value or a sequence.
#[derive(Debug, Clone, Default)]
pub enum Count {
    #[default]
    Scalar,
    /// Always decodes to a sequence, even when the count evaluates to 1.
    Repeat(Expr),
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        Field {
            name: name.into(),
            ty: ty.into(),
            length: None,
            offset: None,
            count: Count::Scalar,
            enum_map: None,
        }
    }

    /// Raw bytes running to the end of the buffer.
    pub fn rest(name: impl Into<String>) -> Self {
        Field::new(name, PrimitiveKind::Raw)
    }

    pub fn length(mut self, length: impl Into<Expr>) -> Self {
        self.length = Some(length.into());
        self
    }

    pub fn offset(mut self, offset: impl Into<Expr>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    pub fn count(mut self, count: impl Into<Expr>) -> Self {
        self.count = Count::Repeat(count.into());
        self
    }

    pub fn enum_map<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        self.enum_map = Some(entries.into_iter().map(|(k, v)| (k, v.into())).collect());
        self
    }
}
