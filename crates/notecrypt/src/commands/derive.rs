use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use notecrypt_core::crypto::KeyParams;
use notecrypt_core::{MasterKeys, NativeCryptoProvider};

use super::{read_json, write_json};
use crate::auth::resolve_password;
use crate::config::Config;
use crate::exit_code;

#[derive(ClapArgs)]
pub struct Args {
    /// Key parameters file (`auth_params` JSON)
    #[arg(long, value_name = "FILE")]
    pub params: PathBuf,

    /// Account password or passcode (prompted if omitted)
    #[arg(long, env = "NOTECRYPT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Write fresh 003 parameters for IDENTIFIER to the params file first
    #[arg(long, value_name = "IDENTIFIER")]
    pub generate: Option<String>,
}

pub fn execute(args: Args, config: &Config) -> Result<u8> {
    let provider = NativeCryptoProvider::new();

    let params: KeyParams = match &args.generate {
        Some(identifier) => {
            let params = KeyParams::generate(&provider, identifier, &config.encryption)
                .context("Failed to generate key parameters")?;
            let json = serde_json::to_string_pretty(&params)?;
            std::fs::write(&args.params, json).with_context(|| {
                format!("Failed to write params file: {}", args.params.display())
            })?;
            tracing::info!(path = %args.params.display(), "Wrote new key parameters");
            params
        }
        None => read_json(&args.params, "params")?,
    };

    let password = resolve_password(args.password, "Password")?;
    let keys = MasterKeys::derive(&provider, &password, &params)
        .context("Failed to derive master keys")?;

    write_json(&keys)?;
    Ok(exit_code::SUCCESS)
}
