//! Check a candidate password against a set of encrypted items.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use notecrypt_core::crypto::KeyParams;
use notecrypt_core::{ItemKeyManager, MasterKeys, NativeCryptoProvider};

use super::{read_items, read_json};
use crate::auth::resolve_password;
use crate::config::Config;
use crate::exit_code;
use crate::output::batch_summary;

#[derive(ClapArgs)]
pub struct Args {
    /// Key parameters file (`auth_params` JSON)
    #[arg(long, value_name = "FILE")]
    pub params: PathBuf,

    /// JSON array of encrypted items
    #[arg(long, short, value_name = "FILE")]
    pub input: PathBuf,

    /// Candidate password (prompted if omitted)
    #[arg(long, env = "NOTECRYPT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub fn execute(args: Args, _config: &Config) -> Result<u8> {
    let params: KeyParams = read_json(&args.params, "params")?;
    let mut items = read_items(&args.input)?;
    let password = resolve_password(args.password, "Password")?;

    let manager = ItemKeyManager::new(NativeCryptoProvider::new());
    let keys = MasterKeys::derive(manager.provider(), &password, &params)
        .context("Failed to derive master keys")?;

    let report = manager.decrypt_multiple_items_parallel(&mut items, &keys, false)?;
    println!("{}", batch_summary(&report));

    if report.decrypted == 0 && report.failed > 0 {
        eprintln!("Password did not decrypt any item");
        return Ok(exit_code::AUTH_FAILED);
    }
    Ok(exit_code::SUCCESS)
}
