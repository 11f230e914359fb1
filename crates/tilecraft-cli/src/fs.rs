use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use rayon::prelude::*;

use crate::progress::Progress;

/// Files in `dir` whose extension is one of `extensions`, sorted by file name.
pub fn list_with_extensions(dir: &Path, extensions: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.with_context(|| format!("reading directory {}", dir.display()))?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e == ext));

        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Writes `bytes` to `path` and waits until they reach the disk.
pub fn write_durable(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Writes every output in parallel. All writes are attempted; if any fail the
/// error lists each failed path. Files already written are left in place.
pub fn write_all(outputs: &[(PathBuf, &[u8])], progress: &Progress) -> anyhow::Result<()> {
    let failures: Vec<String> = outputs
        .par_iter()
        .filter_map(|(path, bytes)| {
            let result = write_durable(path, bytes);
            progress.tick();

            match result {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
                    None
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "write failed");
                    Some(format!("{}: {err}", path.display()))
                }
            }
        })
        .collect();

    if !failures.is_empty() {
        bail!("failed to write {} file(s):\n  {}", failures.len(), failures.join("\n  "));
    }
    Ok(())
}
