use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use tilecraft::{
    container::{Composer, Container},
    tiles::{B3DM, I3DM},
};

use crate::{
    config::Config,
    convert::to_json_line,
    fs::{list_with_extensions, write_all, write_durable},
    progress::Progress,
};

/// Tile kinds whose payload is a binary glTF.
const GLB_KINDS: [&str; 2] = [B3DM, I3DM];

fn read_container(config: &Config, input: &Path) -> anyhow::Result<(Vec<u8>, Container)> {
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let container = Composer::new(&config.table)
        .decode(&data)
        .with_context(|| format!("decoding {}", input.display()))?;

    tracing::info!(
        path = %input.display(),
        tiles = container.tiles.len(),
        composite = container.composite,
        "decoded"
    );
    Ok((data, container))
}

/// Prints the top-level header, then every tile header, one JSON object per line.
pub fn info(config: &Config, input: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let (_, container) = read_container(config, input)?;

    writeln!(out, "{}", to_json_line(&container.header)?)?;
    if container.composite {
        for tile in &container.tiles {
            writeln!(out, "{}", to_json_line(&tile.header)?)?;
        }
    }
    Ok(())
}

/// Writes each tile to `<outdir>/<index>.<magic>`.
pub fn split(config: &Config, input: &Path, outdir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let (data, container) = read_container(config, input)?;
    let parts = Composer::new(&config.table).split(&data, &container)?;

    fs::create_dir_all(outdir).with_context(|| format!("creating {}", outdir.display()))?;
    let outputs: Vec<(PathBuf, &[u8])> = container
        .tiles
        .iter()
        .zip(parts)
        .map(|(tile, bytes)| (outdir.join(format!("{}.{}", tile.index, tile.magic)), bytes))
        .collect();

    let progress = Progress::new(outputs.len(), config.progress_step, !config.quiet);
    write_all(&outputs, &progress)?;

    Ok(outputs.into_iter().map(|(path, _)| path).collect())
}

/// Composes every matching file in `dir`, in file-name order, into `output`.
pub fn make(dir: &Path, output: &Path, extensions: &[String]) -> anyhow::Result<usize> {
    let files = list_with_extensions(dir, extensions)?;
    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), ?extensions, "no tiles found");
    }

    let tiles = files
        .iter()
        .map(|path| fs::read(path).with_context(|| format!("reading {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let bytes = Composer::default().compose(&tiles)?;
    write_durable(output, &bytes).with_context(|| format!("writing {}", output.display()))?;

    tracing::info!(path = %output.display(), tiles = tiles.len(), bytes = bytes.len(), "composed");
    Ok(tiles.len())
}

/// Writes the embedded glTF of every batched or instanced model tile.
/// Composite tiles go to `<outdir>/<index>.glb`; a lone tile to
/// `<outdir>/<input stem>.glb`.
pub fn extract(config: &Config, input: &Path, outdir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let (data, container) = read_container(config, input)?;

    let mut outputs: Vec<(PathBuf, &[u8])> = Vec::with_capacity(container.tiles.len());
    for tile in &container.tiles {
        if !GLB_KINDS.contains(&tile.magic.as_str()) {
            tracing::warn!(index = tile.index, magic = %tile.magic, "skipping tile without a glb payload");
            continue;
        }

        let payload = tile
            .payload(&data, &config.table)
            .with_context(|| format!("tile {} of {}", tile.index, input.display()))?;

        let name = if container.composite {
            format!("{}.glb", tile.index)
        } else {
            let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            format!("{stem}.glb")
        };
        outputs.push((outdir.join(name), payload));
    }

    if outputs.is_empty() {
        bail!("{} holds no b3dm or i3dm tiles", input.display());
    }

    fs::create_dir_all(outdir).with_context(|| format!("creating {}", outdir.display()))?;
    let progress = Progress::new(outputs.len(), config.progress_step, !config.quiet);
    write_all(&outputs, &progress)?;

    Ok(outputs.into_iter().map(|(path, _)| path).collect())
}
