use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use notecrypt_core::item::ItemParams;
use notecrypt_core::{ItemKeyManager, NativeCryptoProvider, ProtocolVersion};

use super::{read_items, read_keys, write_json};
use crate::config::Config;
use crate::exit_code;

#[derive(ClapArgs)]
pub struct Args {
    /// JSON array of decrypted items
    #[arg(long, short, value_name = "FILE")]
    pub input: PathBuf,

    /// Master key file; items are written unencrypted without one
    #[arg(long, short, value_name = "FILE")]
    pub keys: Option<PathBuf>,

    /// Protocol version for new envelopes (defaults to the configured one)
    #[arg(id = "protocol", long = "protocol", value_name = "VERSION")]
    pub version: Option<ProtocolVersion>,

    /// Produce local storage payloads instead of sync payloads
    #[arg(long)]
    pub local: bool,
}

pub fn execute(args: Args, config: &Config) -> Result<u8> {
    let items = read_items(&args.input)?;
    let keys = args.keys.as_deref().map(read_keys).transpose()?;
    let version = args.version.unwrap_or(config.encryption.default_version);
    let manager = ItemKeyManager::new(NativeCryptoProvider::new());

    if keys.is_none() {
        tracing::warn!("No keys given; writing items unencrypted");
    }

    let payloads = items
        .iter()
        .map(|item| {
            let params = ItemParams::new(&manager, item, keys.as_ref(), version);
            let payload = if args.local {
                params.for_local_storage()
            } else {
                params.for_sync()
            };
            payload.with_context(|| format!("Failed to encrypt item {}", item.uuid))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(count = payloads.len(), %version, "Items encrypted");
    write_json(&payloads)?;
    Ok(exit_code::SUCCESS)
}
