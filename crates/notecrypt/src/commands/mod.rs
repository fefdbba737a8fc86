pub mod decrypt;
pub mod derive;
pub mod encrypt;
pub mod probe;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use notecrypt_core::item::ItemPayload;
use notecrypt_core::MasterKeys;

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {what} file: {}", path.display()))
}

/// Read a JSON array of item payloads.
pub fn read_items(path: &Path) -> Result<Vec<ItemPayload>> {
    read_json(path, "items")
}

/// Read a key file (`{"pw": .., "mk": .., "ak": ..}`).
pub fn read_keys(path: &Path) -> Result<MasterKeys> {
    read_json(path, "key")
}

/// Pretty-print `value` as JSON on stdout.
pub fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("Failed to write JSON output")?;
    writeln!(stdout)?;
    Ok(())
}
