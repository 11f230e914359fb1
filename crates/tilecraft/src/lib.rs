//! # tilecraft
//!
//! Declarative binary schemas and the 3D Tiles composite (`cmpt`) container.
//!
//! Describe a layout as an ordered list of [`field::Field`]s whose offsets,
//! lengths and counts may depend on fields decoded before them, compile it
//! once into a [`schema::Schema`], then decode byte slices into
//! [`value::Record`]s and encode them back byte for byte.
//! [`container::Composer`] applies this to composite tile files: it walks
//! the tiles, splits them out, and composes new containers.
//!
//! ## Example
//!
//! ```
//! use tilecraft::expr::Expr;
//! use tilecraft::field::Field;
//! use tilecraft::registry::PrimitiveKind;
//! use tilecraft::schema::Schema;
//! use tilecraft::value::Value;
//!
//! let schema = Schema::compile(&[
//!     Field::new("len", PrimitiveKind::U8),
//!     Field::new("name", PrimitiveKind::Str).length(Expr::field("len")),
//! ])
//! .unwrap();
//!
//! let (record, cursor) = schema.decode(b"\x03abc", 0).unwrap();
//! assert_eq!(record.get("name"), Some(&Value::from("abc")));
//! assert_eq!(cursor, 4);
//! assert_eq!(schema.encode(&record).unwrap(), b"\x03abc");
//! ```

pub mod bytes;
pub mod compiled;
pub mod container;
pub mod errors;
pub mod expr;
pub mod field;
pub mod registry;
pub mod schema;
#[cfg(feature = "serde")]
pub mod serde;
pub mod tiles;
pub mod value;
