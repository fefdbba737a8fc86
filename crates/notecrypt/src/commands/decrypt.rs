use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use notecrypt_core::item::decrypt_items_chunked;
use notecrypt_core::{ItemKeyManager, NativeCryptoProvider};

use super::{read_items, read_keys, write_json};
use crate::config::Config;
use crate::exit_code;
use crate::output::batch_summary;

#[derive(ClapArgs)]
pub struct Args {
    /// JSON array of encrypted items
    #[arg(long, short, value_name = "FILE")]
    pub input: PathBuf,

    /// Master key file
    #[arg(long, short, value_name = "FILE")]
    pub keys: PathBuf,

    /// Stop at the first item that fails to decrypt
    #[arg(long)]
    pub fail_fast: bool,
}

pub fn execute(args: Args, config: &Config) -> Result<u8> {
    let items = read_items(&args.input)?;
    let keys = Arc::new(read_keys(&args.keys)?);
    let manager = Arc::new(ItemKeyManager::new(NativeCryptoProvider::new()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .build()
        .context("Failed to start async runtime")?;

    let (items, result) = runtime
        .block_on(decrypt_items_chunked(
            manager,
            items,
            keys,
            config.encryption.batch_chunk_size,
            args.fail_fast,
        ))
        .into_parts();

    // Items are written even when the batch stopped early
    write_json(&items)?;
    let report = result?;
    eprintln!("{}", batch_summary(&report));

    if report.is_clean() {
        Ok(exit_code::SUCCESS)
    } else {
        Ok(exit_code::DECRYPT_FAILED)
    }
}
