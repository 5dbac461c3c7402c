//! Numbered snapshot files `<prefix><N>.json` inside a cache directory.
//! Readers probe `N = 0, 1, ...` until a shard is missing; writers replace
//! all shards by a single shard 0.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn shard_path(dir: &Path, prefix: &str, index: usize) -> PathBuf {
    dir.join(format!("{}{}.json", prefix, index))
}

/// Paths of the consecutive shards starting at 0.
pub fn existing_shards(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    (0..)
        .map(|index| shard_path(dir, prefix, index))
        .take_while(|path| path.is_file())
        .collect()
}

/// Parses every shard. A shard that cannot be read or parsed is skipped
/// with a warning.
pub fn read_shards<T>(dir: &Path, prefix: &str) -> Vec<T>
where
    T: DeserializeOwned,
{
    existing_shards(dir, prefix)
        .into_iter()
        .filter_map(|path| match read_json(&path) {
            Ok(record) => {
                debug!("loaded shard {}", path.display());
                Some(record)
            }
            Err(e) => {
                warn!("skipping shard {}: {:#}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Writes `record` as shard 0 and removes all higher shards.
pub fn replace_shards<T>(dir: &Path, prefix: &str, record: &T) -> Result<()>
where
    T: Serialize,
{
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create cache directory {}", dir.display()))?;

    let stale = existing_shards(dir, prefix);
    write_atomically(&shard_path(dir, prefix, 0), record)?;

    for path in stale.iter().skip(1) {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove stale shard {}", path.display()))?;
    }
    Ok(())
}

/// Serializes into a temporary sibling first, so a crash never leaves a
/// truncated shard behind.
pub fn write_atomically<T>(path: &Path, record: &T) -> Result<()>
where
    T: Serialize,
{
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("shard path has no file name")?;
    let temporary = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let file = File::create(&temporary)
            .with_context(|| format!("failed to create {}", temporary.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record)
            .with_context(|| format!("failed to serialize {}", path.display()))?;
        writer.flush()?;
    }

    fs::rename(&temporary, path)
        .with_context(|| format!("failed to move shard into place at {}", path.display()))
}

pub fn read_json<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut deserializer = serde_json::Deserializer::from_str(&text);
    deserializer.disable_recursion_limit();
    let record = T::deserialize(&mut deserializer)
        .with_context(|| format!("malformed json in {}", path.display()))?;
    deserializer.end()?;
    Ok(record)
}
