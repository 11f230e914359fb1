use std::{fs, path::Path};

use anyhow::Context;
use tilecraft::{
    registry::TypeRegistry,
    serde::Definitions,
    tiles::DispatchTable,
};

pub const DEFAULT_PROGRESS_STEP: u32 = 10;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Config {
    /// Built-in tile kinds plus any loaded from a definitions file.
    pub table: DispatchTable,
    /// Minimum percent increase between two progress lines.
    pub progress_step: u32,
    /// Worker threads for parallel writes; `None` lets rayon decide.
    pub jobs: Option<usize>,
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table: DispatchTable::builtin().clone(),
            progress_step: DEFAULT_PROGRESS_STEP,
            jobs: None,
            quiet: false,
        }
    }
}

impl Config {
    /// Adds the tile kinds described in a JSON definitions file.
    pub fn load_schemas(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let defs: Definitions =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

        let compiled = defs
            .compile(&TypeRegistry::default())
            .with_context(|| format!("compiling {}", path.display()))?;
        compiled.extend(&mut self.table);

        tracing::debug!(
            path = %path.display(),
            schemas = compiled.schemas.len(),
            tiles = compiled.tiles.len(),
            "loaded schema definitions"
        );
        Ok(())
    }
}
