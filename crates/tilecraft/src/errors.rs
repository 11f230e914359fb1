//! Error types for schema construction, decoding and encoding.

/// Errors produced when building a schema or resolving a selector against a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Field name is empty or used twice in the same schema.
    #[error("invalid field name `{0}`")]
    InvalidFieldName(String),
    /// More than one field claims the rest of the buffer.
    #[error("field `{0}` is a second rest-of-buffer field")]
    MultipleRestFields(String),
    /// Declared length disagrees with the width of an integer type.
    #[error("field `{0}` declares a length that does not match its type")]
    InvalidFieldSize(String),
    /// Type tag is neither a primitive nor a registered custom codec.
    #[error("unknown type `{0}`")]
    UnknownType(String),
    /// Enum maps only apply to integer primitives.
    #[error("field `{0}` carries an enum map but is not an integer")]
    EnumOnNonInteger(String),
    /// Magic string is not registered in the dispatch table.
    #[error("unknown magic `{0}`")]
    UnknownMagic(String),
    /// A nested schema referenced by name is not defined.
    #[error("unknown schema `{0}`")]
    UnknownSchema(String),
    /// Magic strings are exactly four single-byte characters.
    #[error("invalid magic `{0}`")]
    InvalidMagic(String),
    /// The tile kind carries no embedded payload.
    #[error("tile kind `{0}` has no embedded payload")]
    NoPayload(String),
}

/// A read or write that would fall outside the buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{what}: range {offset}..{offset}+{len} exceeds buffer of {available} bytes")]
pub struct BoundsError {
    /// Field or structure being accessed.
    pub what: String,
    pub offset: usize,
    pub len: usize,
    pub available: usize,
}

/// Declared sizes disagree with what was actually consumed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    /// A tile declares fewer bytes than its own header occupies.
    #[error("tile {index} declares byteLength {declared} but its header takes {consumed} bytes")]
    TileTooShort {
        index: usize,
        declared: usize,
        consumed: usize,
    },
    /// The tiles do not add up to the container's declared length.
    #[error("container declares byteLength {declared} but its tiles end at {actual}")]
    ContainerLength { declared: usize, actual: usize },
    /// A header field that must be an unsigned integer is not.
    #[error("header field `{0}` is missing or not an unsigned integer")]
    HeaderField(String),
}

/// Errors raised while evaluating a computed offset, length or count.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// The referenced field has not been decoded (yet).
    #[error("unresolved reference `{0}`")]
    UnresolvedReference(String),
    /// The referenced value is not an unsigned integer.
    #[error("`{0}` is not an unsigned integer")]
    NotAnInteger(String),
    /// Arithmetic overflowed, underflowed or divided by zero.
    #[error("arithmetic error in expression")]
    Arithmetic,
}

/// Errors produced while decoding a buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error("field `{field}`: {source}")]
    Expr {
        field: String,
        #[source]
        source: ExprError,
    },
    /// A custom codec rejected its input.
    #[error("field `{field}`: {reason}")]
    Custom { field: String, reason: String },
}

/// Errors produced while encoding a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A write would land past the largest output an encoder produces.
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    /// The record has no value for a field.
    #[error("missing field `{0}`")]
    MissingField(String),
    /// Scalar given where a sequence is expected, or a sequence of the wrong length.
    #[error("field `{field}`: expected {expected} value(s), got {actual}")]
    Arity {
        field: String,
        expected: usize,
        actual: usize,
    },
    /// Encoded element does not fill the declared length exactly.
    #[error("field `{field}`: encoded {actual} bytes, declared length is {expected}")]
    Length {
        field: String,
        expected: usize,
        actual: usize,
    },
    /// Value variant cannot be written by the field's type.
    #[error("field `{0}`: value does not match the field type")]
    InvalidValue(String),
    /// Integer does not fit the field's width.
    #[error("field `{field}`: {value} does not fit in {bytes} byte(s)")]
    OutOfRange {
        field: String,
        value: i128,
        bytes: usize,
    },
    /// Label is not present in the field's enum map.
    #[error("field `{field}`: unknown enum label `{label}`")]
    UnknownLabel { field: String, label: String },
    /// Offset, length or count expression could not be evaluated.
    #[error("field `{field}`: {source}")]
    Expr {
        field: String,
        #[source]
        source: ExprError,
    },
    /// A size does not fit in the 32-bit header field that must carry it.
    #[error("{0} exceeds the 32-bit limit")]
    Overflow(String),
    /// A custom codec rejected its value.
    #[error("field `{field}`: {reason}")]
    Custom { field: String, reason: String },
}
