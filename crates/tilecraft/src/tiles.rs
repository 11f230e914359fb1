//! Tile kinds and the magic-string dispatch table.
//!
//! Header layouts follow the 3D Tiles specification: `cmpt` (composite),
//! `b3dm` (batched model), `i3dm` (instanced model) and `pnts` (point cloud).

use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

use crate::{
    errors::SchemaError,
    field::Field,
    registry::PrimitiveKind,
    schema::Schema,
};

pub const CMPT: &str = "cmpt";
pub const B3DM: &str = "b3dm";
pub const I3DM: &str = "i3dm";
pub const PNTS: &str = "pnts";

/// Width of every magic string.
pub const MAGIC_LEN: usize = 4;

/// Header fields declaring the feature/batch table blocks that sit between a
/// tile header and its embedded payload.
pub const TABLE_SECTIONS: [&str; 4] = [
    "featureTableJSONByteLength",
    "featureTableBinaryByteLength",
    "batchTableJSONByteLength",
    "batchTableBinaryByteLength",
];

/// One registered tile format.
#[derive(Debug, Clone)]
pub struct TileKind {
    pub magic: String,
    pub schema: Arc<Schema>,
    /// Header fields whose values are sub-section lengths, in file order.
    pub sections: Vec<String>,
    /// Whether tiles of this kind hold further tiles.
    pub container: bool,
}

impl TileKind {
    pub fn new(magic: impl Into<String>, schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            magic: magic.into(),
            schema: schema.into(),
            sections: Vec::new(),
            container: false,
        }
    }

    pub fn with_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections = sections.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_container(mut self) -> Self {
        self.container = true;
        self
    }

    /// Size of the fixed header, taken from the schema.
    pub fn header_size(&self) -> Option<usize> {
        self.schema.fixed_size()
    }

    /// Whether the kind wraps an embedded payload after its sub-sections.
    pub fn has_payload(&self) -> bool {
        !self.sections.is_empty()
    }
}

fn preamble() -> Vec<Field> {
    vec![
        Field::new("magic", PrimitiveKind::Str).length(MAGIC_LEN),
        Field::new("version", PrimitiveKind::U32),
        Field::new("byteLength", PrimitiveKind::U32),
    ]
}

fn container_schema() -> Schema {
    let mut fields = preamble();
    fields.push(Field::new("tileCount", PrimitiveKind::U32));
    Schema::compile(&fields).expect("composite header schema is valid")
}

fn table_schema(extra: &[Field]) -> Schema {
    let mut fields = preamble();
    fields.extend(TABLE_SECTIONS.iter().map(|name| Field::new(*name, PrimitiveKind::U32)));
    fields.extend_from_slice(extra);
    Schema::compile(&fields).expect("tile header schema is valid")
}

static BUILTIN: LazyLock<DispatchTable> = LazyLock::new(|| {
    let table_kind = |magic: &str, extra: &[Field]| {
        TileKind::new(magic, table_schema(extra)).with_sections(TABLE_SECTIONS)
    };

    let gltf_format = Field::new("gltfFormat", PrimitiveKind::U32).enum_map([(0, "uri"), (1, "embedded")]);

    let mut table = DispatchTable::empty();
    table
        .register(TileKind::new(CMPT, container_schema()).as_container())
        .register(table_kind(B3DM, &[]))
        .register(table_kind(I3DM, &[gltf_format]))
        .register(table_kind(PNTS, &[]));
    table
});

/// Maps magic strings to tile kinds. Built once at startup and only read
/// afterwards; unregistered magic is an error, never skipped.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    kinds: BTreeMap<String, TileKind>,
}

impl DispatchTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The process-wide table of built-in 3D Tiles formats.
    pub fn builtin() -> &'static DispatchTable {
        &BUILTIN
    }

    /// Adds or replaces the kind registered under its magic.
    pub fn register(&mut self, kind: TileKind) -> &mut Self {
        self.kinds.insert(kind.magic.clone(), kind);
        self
    }

    pub fn get(&self, magic: &str) -> Result<&TileKind, SchemaError> {
        self.kinds
            .get(magic)
            .ok_or_else(|| SchemaError::UnknownMagic(magic.to_string()))
    }

    pub fn magics(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }
}
