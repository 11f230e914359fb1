//! Composite container: decode, compose, split and payload extraction.
//!
//! A composite is a 16-byte header followed by `tileCount` tiles laid end to
//! end. Each tile starts with its own magic, version and `byteLength`; the
//! declared `byteLength` alone decides where the next tile begins, since the
//! bytes after a tile header are opaque here.

use crate::{
    bytes::{latin1_to_string, slice_at},
    errors::{BoundsError, DecodeError, EncodeError, InvariantError, SchemaError},
    tiles::{CMPT, DispatchTable, MAGIC_LEN, TileKind},
    value::{Record, Value},
};

pub const CONTAINER_VERSION: u64 = 1;

/// One tile located inside a decoded buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub index: usize,
    pub magic: String,
    /// Absolute position of the tile's first byte.
    pub offset: usize,
    /// Declared `byteLength`, header included.
    pub byte_length: usize,
    pub header: Record,
}

impl Tile {
    /// The whole tile, header and payload.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], BoundsError> {
        slice_at(data, self.offset, self.byte_length, &self.label())
    }

    /// The payload embedded after the header and its declared sub-sections.
    pub fn payload<'a>(&self, data: &'a [u8], table: &DispatchTable) -> Result<&'a [u8], DecodeError> {
        let kind = table.get(&self.magic)?;
        let header_size = match kind.header_size() {
            Some(size) if kind.has_payload() => size,
            _ => return Err(SchemaError::NoPayload(self.magic.clone()).into()),
        };

        let mut start = self.offset + header_size;
        for section in &kind.sections {
            start += header_uint(&self.header, section)?;
        }

        let end = self.offset + self.byte_length;
        if start > end {
            return Err(BoundsError {
                what: format!("{} payload", self.label()),
                offset: start,
                len: 0,
                available: end,
            }
            .into());
        }

        Ok(slice_at(data, start, end - start, &self.label())?)
    }

    fn label(&self) -> String {
        format!("tile {} ({})", self.index, self.magic)
    }
}

/// Result of decoding a buffer: its top-level header and every tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub header: Record,
    pub tiles: Vec<Tile>,
    /// Cursor after the last tile.
    pub end: usize,
    /// `false` when the buffer was a single tile rather than a composite.
    pub composite: bool,
}

/// Decodes and encodes composites against a dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'a> {
    table: &'a DispatchTable,
}

impl Default for Composer<'static> {
    fn default() -> Self {
        Self::new(DispatchTable::builtin())
    }
}

impl<'a> Composer<'a> {
    pub fn new(table: &'a DispatchTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &'a DispatchTable {
        self.table
    }

    /// Decodes the top-level header and, for a composite, every tile header.
    /// The first failing tile aborts the whole decode.
    pub fn decode(&self, data: &[u8]) -> Result<Container, DecodeError> {
        let kind = self.kind_at(data, 0)?;
        let (header, header_end) = kind.schema.decode(data, 0)?;

        if !kind.container {
            let tile = self.locate(kind, header.clone(), 0, header_end, data, 0)?;
            tracing::debug!(magic = %tile.magic, byte_length = tile.byte_length, "decoded single tile");
            return Ok(Container {
                end: tile.byte_length,
                header,
                tiles: vec![tile],
                composite: false,
            });
        }

        let declared = header_uint(&header, "byteLength")?;
        let tile_count = header_uint(&header, "tileCount")?;
        slice_at(data, 0, declared, &kind.magic)?;

        let mut tiles = Vec::with_capacity(tile_count.min(data.len() / MAGIC_LEN));
        let mut cursor = header_end;

        for index in 0..tile_count {
            let tile_kind = self.kind_at(data, cursor)?;
            let (tile_header, end) = tile_kind.schema.decode(data, cursor)?;
            let tile = self.locate(tile_kind, tile_header, cursor, end, data, index)?;

            tracing::debug!(
                index,
                magic = %tile.magic,
                offset = tile.offset,
                byte_length = tile.byte_length,
                "decoded tile header"
            );

            cursor += tile.byte_length;
            tiles.push(tile);
        }

        if cursor != declared {
            return Err(InvariantError::ContainerLength {
                declared,
                actual: cursor,
            }
            .into());
        }

        Ok(Container {
            header,
            tiles,
            end: cursor,
            composite: true,
        })
    }

    fn kind_at(&self, data: &[u8], cursor: usize) -> Result<&'a TileKind, DecodeError> {
        let magic = slice_at(data, cursor, MAGIC_LEN, "magic")?;
        Ok(self.table.get(&latin1_to_string(magic))?)
    }

    fn locate(
        &self,
        kind: &TileKind,
        header: Record,
        offset: usize,
        header_end: usize,
        data: &[u8],
        index: usize,
    ) -> Result<Tile, DecodeError> {
        let byte_length = header_uint(&header, "byteLength")?;
        let consumed = header_end - offset;

        if byte_length < consumed {
            return Err(InvariantError::TileTooShort {
                index,
                declared: byte_length,
                consumed,
            }
            .into());
        }

        let tile = Tile {
            index,
            magic: kind.magic.clone(),
            offset,
            byte_length,
            header,
        };
        tile.bytes(data)?;

        Ok(tile)
    }

    /// Slices every tile out of `data`, in order.
    pub fn split<'d>(&self, data: &'d [u8], container: &Container) -> Result<Vec<&'d [u8]>, BoundsError> {
        container.tiles.iter().map(|tile| tile.bytes(data)).collect()
    }

    /// Builds a composite from already-encoded tiles, kept in the given order.
    pub fn compose<T: AsRef<[u8]>>(&self, tiles: &[T]) -> Result<Vec<u8>, EncodeError> {
        let kind = self.table.get(CMPT)?;
        let header_size = kind
            .header_size()
            .ok_or_else(|| SchemaError::InvalidFieldSize(CMPT.to_string()))?;
        let body: usize = tiles.iter().map(|t| t.as_ref().len()).sum();

        let byte_length = u32::try_from(header_size + body)
            .map_err(|_| EncodeError::Overflow("composite byteLength".to_string()))?;
        let tile_count = u32::try_from(tiles.len())
            .map_err(|_| EncodeError::Overflow("composite tileCount".to_string()))?;

        let header = Record::new()
            .with("magic", CMPT)
            .with("version", CONTAINER_VERSION)
            .with("byteLength", u64::from(byte_length))
            .with("tileCount", u64::from(tile_count));

        let mut out = kind.schema.encode(&header)?;
        out.reserve(body);
        for tile in tiles {
            out.extend_from_slice(tile.as_ref());
        }

        tracing::debug!(tiles = tiles.len(), byte_length, "composed container");
        Ok(out)
    }
}

fn header_uint(header: &Record, name: &str) -> Result<usize, InvariantError> {
    header
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| InvariantError::HeaderField(name.to_string()))
}
