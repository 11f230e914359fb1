//! Serializable schema and tile-kind definitions.
//!
//! These types describe layouts as data, typically loaded from a JSON file
//! shipped next to the tool, and are then compiled into [`Schema`]s and
//! [`TileKind`]s. A definitions file looks like:
//!
//! ```json
//! {
//!   "schemas": [
//!     { "name": "vctr", "fields": [
//!       { "name": "magic", "type": "str", "length": 4 },
//!       { "name": "version", "type": "u32" },
//!       { "name": "byteLength", "type": "u32" },
//!       { "name": "featureTableJSONByteLength", "type": "u32" }
//!     ]}
//!   ],
//!   "tiles": [
//!     { "magic": "vctr", "schema": "vctr", "sections": ["featureTableJSONByteLength"] }
//!   ]
//! }
//! ```
//!
//! A field's `type` is a primitive tag, a custom codec registered on the
//! [`TypeRegistry`], or the name of a schema defined earlier in the same file.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    errors::SchemaError,
    expr::Expr,
    field::Field,
    registry::{FieldType, TypeRegistry},
    schema::Schema,
    tiles::{DispatchTable, MAGIC_LEN, TileKind},
};

/// Top-level definitions file.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Definitions {
    /// Named schemas. A schema may only nest schemas listed before it.
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
    /// Tile kinds to add to the dispatch table.
    #[serde(default)]
    pub tiles: Vec<TileKindDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchemaDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

/// Description of a single field.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    /// Key in the decoded record.
    pub name: String,
    /// Primitive tag, custom codec name or earlier schema name.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<ExprDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<ExprDef>,
    /// Present for repeated fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<ExprDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_map: Option<BTreeMap<u64, String>>,
}

/// Expression in its serialized form: a number, a field path, or an operator
/// object such as `{"add": ["headerLength", 4]}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExprDef {
    Const(usize),
    /// Dotted field path. The reserved name `$remaining` stands for the bytes
    /// left after the cursor.
    Field(String),
    Op(OpDef),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpDef {
    /// One element of a repeated field.
    Element(String, usize),
    Add(Box<ExprDef>, Box<ExprDef>),
    Sub(Box<ExprDef>, Box<ExprDef>),
    Mul(Box<ExprDef>, Box<ExprDef>),
    Div(Box<ExprDef>, Box<ExprDef>),
}

const REMAINING: &str = "$remaining";

/// A tile format keyed by its magic string.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TileKindDef {
    pub magic: String,
    /// Name of the header schema.
    pub schema: String,
    /// Header fields holding sub-section lengths, in file order.
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub container: bool,
}

impl From<&ExprDef> for Expr {
    fn from(def: &ExprDef) -> Self {
        match def {
            ExprDef::Const(v) => Expr::Const(*v),
            ExprDef::Field(path) if path == REMAINING => Expr::Remaining,
            ExprDef::Field(path) => Expr::field(path.as_str()),
            ExprDef::Op(op) => match op {
                OpDef::Element(path, index) => Expr::element(path.as_str(), *index),
                OpDef::Add(a, b) => Expr::from(a.as_ref()) + Expr::from(b.as_ref()),
                OpDef::Sub(a, b) => Expr::from(a.as_ref()) - Expr::from(b.as_ref()),
                OpDef::Mul(a, b) => Expr::from(a.as_ref()) * Expr::from(b.as_ref()),
                OpDef::Div(a, b) => Expr::from(a.as_ref()) / Expr::from(b.as_ref()),
            },
        }
    }
}

/// Compiled form of [`Definitions`].
#[derive(Debug, Clone, Default)]
pub struct CompiledDefinitions {
    pub schemas: BTreeMap<String, Arc<Schema>>,
    pub tiles: Vec<TileKind>,
}

impl CompiledDefinitions {
    /// Registers every tile kind on `table`, replacing kinds with the same magic.
    pub fn extend(&self, table: &mut DispatchTable) {
        for kind in &self.tiles {
            table.register(kind.clone());
        }
    }
}

impl Definitions {
    /// Compiles schemas in order, then the tile kinds that use them.
    pub fn compile(&self, registry: &TypeRegistry) -> Result<CompiledDefinitions, SchemaError> {
        let mut schemas: BTreeMap<String, Arc<Schema>> = BTreeMap::new();

        for def in &self.schemas {
            let fields = def
                .fields
                .iter()
                .map(|field| field.to_field(registry, &schemas))
                .collect::<Result<Vec<_>, _>>()?;

            let schema = Schema::compile(&fields)?;
            if schemas.insert(def.name.clone(), Arc::new(schema)).is_some() {
                return Err(SchemaError::InvalidFieldName(def.name.clone()));
            }
        }

        let tiles = self
            .tiles
            .iter()
            .map(|def| def.to_kind(&schemas))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledDefinitions { schemas, tiles })
    }
}

impl FieldDef {
    pub fn to_field(
        &self,
        registry: &TypeRegistry,
        schemas: &BTreeMap<String, Arc<Schema>>,
    ) -> Result<Field, SchemaError> {
        let ty = match schemas.get(&self.ty) {
            Some(schema) => FieldType::Nested(schema.clone()),
            None => registry.resolve(&self.ty)?,
        };

        let mut field = Field::new(self.name.as_str(), ty);
        field.length = self.length.as_ref().map(Expr::from);
        field.offset = self.offset.as_ref().map(Expr::from);
        if let Some(count) = &self.count {
            field = field.count(Expr::from(count));
        }
        field.enum_map = self.enum_map.clone();

        Ok(field)
    }
}

impl TileKindDef {
    pub fn to_kind(&self, schemas: &BTreeMap<String, Arc<Schema>>) -> Result<TileKind, SchemaError> {
        if self.magic.chars().count() != MAGIC_LEN || self.magic.chars().any(|c| c as u32 > 0xFF) {
            return Err(SchemaError::InvalidMagic(self.magic.clone()));
        }

        let schema = schemas
            .get(&self.schema)
            .ok_or_else(|| SchemaError::UnknownSchema(self.schema.clone()))?;

        for section in &self.sections {
            if schema.field(section).is_none() {
                return Err(SchemaError::InvalidFieldName(section.clone()));
            }
        }

        let kind = TileKind::new(self.magic.as_str(), schema.clone()).with_sections(self.sections.iter().cloned());
        Ok(if self.container { kind.as_container() } else { kind })
    }
}
