use anyhow::{Result, bail};
use rpassword::read_password;
use std::io::{self, Write};

/// Prompt for a password on stderr with echo disabled.
///
/// For non-interactive use, pass `--password` or set `NOTECRYPT_PASSWORD`.
pub fn prompt_password(prompt: &str) -> Result<String> {
    eprint!("{prompt}: ");
    io::stderr().flush()?;

    let password = read_password()?;

    if password.is_empty() {
        bail!("Password cannot be empty");
    }

    Ok(password)
}

/// Use the supplied password, or prompt for one.
pub fn resolve_password(password: Option<String>, prompt: &str) -> Result<String> {
    match password {
        Some(p) if !p.is_empty() => Ok(p),
        Some(_) => bail!("Password cannot be empty"),
        None => prompt_password(prompt),
    }
}
