#![forbid(unsafe_code)]

//! Master keys, item keys and key derivation parameters.
//!
//! # Key hierarchy
//!
//! ```text
//! password ──PBKDF2-HMAC-SHA512(768 bits)──► pw ‖ mk ‖ ak
//!                                                 │    │
//!                        item key (512 bits) ◄────┴────┘  wrapped per item
//!                            │
//!                            └─► ek (first half) ‖ ak (second half)
//! ```
//!
//! `pw` is the server authentication hash and is never used for encryption.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{CryptoError, CryptoProvider};
use crate::config::EncryptionConfig;
use crate::envelope::ProtocolVersion;

/// Size of the PBKDF2 output split into `pw`, `mk` and `ak`.
pub const DERIVED_KEY_BITS: usize = 768;

/// Size of a freshly generated item key.
pub const ITEM_KEY_BITS: usize = 512;

/// Size of the random nonce in `003` key parameters.
pub const NONCE_BITS: usize = 256;

/// Errors that can occur when deriving master keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyDerivationError {
    /// **[USER ERROR]** Stored parameters ask for fewer iterations than the
    /// protocol version allows.
    #[error("PBKDF2 cost {cost} is below the minimum {minimum} for version {version}")]
    CostTooLow {
        version: ProtocolVersion,
        cost: u32,
        minimum: u32,
    },

    /// **[USER ERROR]** A parameter required by the protocol version is absent.
    #[error("Key parameters for version {version} are missing '{field}'")]
    MissingParameter {
        version: ProtocolVersion,
        field: &'static str,
    },

    #[error("Key derivation failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Public key derivation parameters (`auth_params` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParams {
    pub version: ProtocolVersion,
    pub pw_cost: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pw_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pw_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl KeyParams {
    /// Generate fresh `003` parameters for `identifier`.
    ///
    /// The cost is taken from `config` but never drops below the `003`
    /// minimum.
    pub fn generate<P: CryptoProvider + ?Sized>(
        provider: &P,
        identifier: &str,
        config: &EncryptionConfig,
    ) -> Result<Self, CryptoError> {
        let version = ProtocolVersion::V003;
        let nonce = provider.generate_random_key(NONCE_BITS)?;
        Ok(Self {
            version,
            pw_cost: config.pbkdf2_cost.max(version.cost_minimum()),
            pw_salt: None,
            pw_nonce: Some(nonce.to_string()),
            identifier: Some(identifier.to_owned()),
        })
    }

    /// Salt fed to PBKDF2 for these parameters.
    pub fn salt<P: CryptoProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<String, KeyDerivationError> {
        match self.version {
            ProtocolVersion::V001 | ProtocolVersion::V002 => {
                self.pw_salt
                    .clone()
                    .ok_or(KeyDerivationError::MissingParameter {
                        version: self.version,
                        field: "pw_salt",
                    })
            }
            ProtocolVersion::V003 => {
                let identifier =
                    self.identifier
                        .as_deref()
                        .ok_or(KeyDerivationError::MissingParameter {
                            version: self.version,
                            field: "identifier",
                        })?;
                let nonce = self
                    .pw_nonce
                    .as_deref()
                    .ok_or(KeyDerivationError::MissingParameter {
                        version: self.version,
                        field: "pw_nonce",
                    })?;
                let cost = self.pw_cost.to_string();
                let input = [identifier, "SF", self.version.as_str(), &cost, nonce].join(":");
                Ok(provider.sha256(&input))
            }
        }
    }

    fn check_cost(&self) -> Result<(), KeyDerivationError> {
        let minimum = self.version.cost_minimum();
        if self.pw_cost < minimum {
            return Err(KeyDerivationError::CostTooLow {
                version: self.version,
                cost: self.pw_cost,
                minimum,
            });
        }
        Ok(())
    }
}

/// Top-level key triple derived from a user secret.
///
/// All three values are 256-bit lowercase hex strings held as
/// [`SecretString`], so `Debug` never prints them.
pub struct MasterKeys {
    pw: SecretString,
    mk: SecretString,
    ak: SecretString,
}

impl MasterKeys {
    pub fn new(pw: impl Into<String>, mk: impl Into<String>, ak: impl Into<String>) -> Self {
        Self {
            pw: SecretString::from(pw.into()),
            mk: SecretString::from(mk.into()),
            ak: SecretString::from(ak.into()),
        }
    }

    /// Derive master keys from `password` with the given parameters.
    #[instrument(level = "debug", skip(provider, password), fields(version = %params.version, cost = params.pw_cost))]
    pub fn derive<P: CryptoProvider + ?Sized>(
        provider: &P,
        password: &str,
        params: &KeyParams,
    ) -> Result<Self, KeyDerivationError> {
        params.check_cost()?;
        let salt = params.salt(provider)?;
        let derived = provider.pbkdf2(password, &salt, params.pw_cost, DERIVED_KEY_BITS)?;

        let third = derived.len() / 3;
        let keys = Self::new(
            &derived[..third],
            &derived[third..2 * third],
            &derived[2 * third..],
        );
        debug!("Master keys derived");
        Ok(keys)
    }

    /// Server authentication hash.
    pub fn server_password(&self) -> &str {
        self.pw.expose_secret()
    }

    /// Master encryption key, wraps item keys.
    pub fn encryption_key(&self) -> &str {
        self.mk.expose_secret()
    }

    /// Master authentication key.
    pub fn auth_key(&self) -> &str {
        self.ak.expose_secret()
    }
}

impl Clone for MasterKeys {
    fn clone(&self) -> Self {
        Self::new(
            self.server_password(),
            self.encryption_key(),
            self.auth_key(),
        )
    }
}

impl fmt::Debug for MasterKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeys")
            .field("pw", &"[REDACTED]")
            .field("mk", &"[REDACTED]")
            .field("ak", &"[REDACTED]")
            .finish()
    }
}

/// Plain serde form of [`MasterKeys`] for secure-store blobs and key files.
#[derive(Serialize, Deserialize)]
pub(crate) struct MasterKeysRepr {
    pub pw: String,
    pub mk: String,
    pub ak: String,
}

impl Serialize for MasterKeys {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MasterKeysRepr {
            pw: self.server_password().to_owned(),
            mk: self.encryption_key().to_owned(),
            ak: self.auth_key().to_owned(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MasterKeys {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = MasterKeysRepr::deserialize(deserializer)?;
        Ok(Self::new(repr.pw, repr.mk, repr.ak))
    }
}

/// A per-item key: 512 random bits in hex, used for exactly one encrypt or
/// decrypt call and zeroized on drop.
pub struct ItemKey(Zeroizing<String>);

impl ItemKey {
    pub fn generate<P: CryptoProvider + ?Sized>(provider: &P) -> Result<Self, CryptoError> {
        provider.generate_random_key(ITEM_KEY_BITS).map(Self)
    }

    pub(crate) fn from_hex(hex: Zeroizing<String>) -> Self {
        Self(hex)
    }

    /// Full hex value, the plaintext of `enc_item_key`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content encryption key (first half).
    pub fn encryption_key(&self) -> &str {
        let (ek, _) = self.halves();
        ek
    }

    /// Content authentication key (second half).
    pub fn auth_key(&self) -> &str {
        let (_, ak) = self.halves();
        ak
    }

    fn halves(&self) -> (&str, &str) {
        let mid = self.0.len() / 2;
        // Hex is ASCII, but a corrupted key could hold anything
        if self.0.is_char_boundary(mid) {
            self.0.split_at(mid)
        } else {
            (&self.0[..0], &self.0[..0])
        }
    }
}

impl fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ItemKey([REDACTED])")
    }
}
