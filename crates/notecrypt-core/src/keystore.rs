#![forbid(unsafe_code)]

//! Session key management over an injected secure store.
//!
//! The platform keychain is an external collaborator reached through the
//! [`KeyStore`] trait, which only stores one opaque blob. [`SessionKeys`]
//! keeps two key sets:
//!
//! - **account keys**, derived from the account password at sign-in;
//! - **offline keys**, derived from a local passcode. Only the passcode hash
//!   (`pw`) is persisted; `mk`/`ak` exist in memory after
//!   [`SessionKeys::unlock_offline`].
//!
//! Account keys win whenever both are present.

use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, KeyDerivationError, KeyParams, MasterKeys};
use crate::envelope::ProtocolVersion;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// The secure store itself failed.
    #[error("Secure store failed: {0}")]
    Backend(String),

    /// Stored blob is not valid key JSON.
    #[error("Stored keys are corrupted: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Key store lock was poisoned")]
    LockPoisoned,

    /// **[USER ERROR]** Removing the passcode requires it to be unlocked first.
    #[error("Offline keys are locked; unlock with the passcode first")]
    OfflineLocked,

    #[error("No offline passcode is configured")]
    NoOfflinePasscode,

    /// **[USER ERROR]**
    #[error("Incorrect passcode")]
    WrongPasscode,

    #[error("Key derivation failed: {0}")]
    Derivation(#[from] KeyDerivationError),
}

/// A secure credential store holding one opaque blob.
pub trait KeyStore: Send + Sync {
    fn get(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError>;
    fn set(&self, blob: &[u8]) -> Result<(), KeyStoreError>;
    fn clear(&self) -> Result<(), KeyStoreError>;
}

impl<T: KeyStore + ?Sized> KeyStore for std::sync::Arc<T> {
    fn get(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        (**self).get()
    }

    fn set(&self, blob: &[u8]) -> Result<(), KeyStoreError> {
        (**self).set(blob)
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        (**self).clear()
    }
}

/// In-process [`KeyStore`]. Contents are zeroized when replaced or dropped.
#[derive(Default)]
pub struct MemoryKeyStore {
    blob: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore").finish_non_exhaustive()
    }
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        let guard = self.blob.read().map_err(|_| KeyStoreError::LockPoisoned)?;
        Ok(guard.clone())
    }

    fn set(&self, blob: &[u8]) -> Result<(), KeyStoreError> {
        let mut guard = self.blob.write().map_err(|_| KeyStoreError::LockPoisoned)?;
        *guard = Some(Zeroizing::new(blob.to_vec()));
        Ok(())
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        let mut guard = self.blob.write().map_err(|_| KeyStoreError::LockPoisoned)?;
        *guard = None;
        Ok(())
    }
}

/// Which key set encrypts new writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionSource {
    Account,
    Offline,
    None,
}

enum OfflineKeys {
    /// Only the passcode hash is known.
    Locked { pw: SecretString },
    Unlocked(MasterKeys),
}

impl OfflineKeys {
    fn passcode_hash(&self) -> &str {
        match self {
            Self::Locked { pw } => pw.expose_secret(),
            Self::Unlocked(keys) => keys.server_password(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OfflineHash {
    pw: String,
}

#[derive(Serialize, Deserialize, Default)]
struct StoredBlob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account: Option<MasterKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_params: Option<KeyParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offline: Option<OfflineHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offline_params: Option<KeyParams>,
}

/// Account and offline keys for the running session.
pub struct SessionKeys<S: KeyStore> {
    store: S,
    account_keys: Option<MasterKeys>,
    account_params: Option<KeyParams>,
    offline_keys: Option<OfflineKeys>,
    offline_params: Option<KeyParams>,
}

impl<S: KeyStore> SessionKeys<S> {
    /// Empty session over `store`, ignoring anything already stored.
    pub fn new(store: S) -> Self {
        Self {
            store,
            account_keys: None,
            account_params: None,
            offline_keys: None,
            offline_params: None,
        }
    }

    /// Restore the session from `store`.
    #[instrument(level = "debug", skip(store))]
    pub fn load(store: S) -> Result<Self, KeyStoreError> {
        let mut session = Self::new(store);
        let Some(blob) = session.store.get()? else {
            debug!("Secure store is empty");
            return Ok(session);
        };

        let stored: StoredBlob = serde_json::from_slice(&blob)?;
        session.account_keys = stored.account;
        session.account_params = stored.auth_params;
        session.offline_keys = stored.offline.map(|o| OfflineKeys::Locked {
            pw: SecretString::from(o.pw),
        });
        session.offline_params = stored.offline_params;
        debug!(source = ?session.encryption_source(), "Session keys loaded");
        Ok(session)
    }

    /// Write the current state to the secure store.
    ///
    /// Offline `mk`/`ak` are never written, only the passcode hash.
    pub fn persist(&self) -> Result<(), KeyStoreError> {
        let stored = StoredBlob {
            account: self.account_keys.clone(),
            auth_params: self.account_params.clone(),
            offline: self.offline_keys.as_ref().map(|o| OfflineHash {
                pw: o.passcode_hash().to_owned(),
            }),
            offline_params: self.offline_params.clone(),
        };
        let blob = Zeroizing::new(serde_json::to_vec(&stored)?);
        self.store.set(&blob)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn set_account_keys(
        &mut self,
        keys: MasterKeys,
        params: KeyParams,
    ) -> Result<(), KeyStoreError> {
        self.account_keys = Some(keys);
        self.account_params = Some(params);
        self.persist()
    }

    pub fn set_offline_keys(
        &mut self,
        keys: MasterKeys,
        params: KeyParams,
    ) -> Result<(), KeyStoreError> {
        self.offline_keys = Some(OfflineKeys::Unlocked(keys));
        self.offline_params = Some(params);
        self.persist()
    }

    /// Keys for encryption: account keys if signed in, else unlocked offline
    /// keys.
    pub fn active_keys(&self) -> Option<&MasterKeys> {
        if let Some(keys) = &self.account_keys {
            return Some(keys);
        }
        match &self.offline_keys {
            Some(OfflineKeys::Unlocked(keys)) => Some(keys),
            _ => None,
        }
    }

    /// Key parameters matching [`active_keys`](Self::active_keys).
    pub fn active_params(&self) -> Option<&KeyParams> {
        if self.account_keys.is_some() {
            self.account_params.as_ref()
        } else {
            self.offline_params.as_ref()
        }
    }

    pub fn encryption_source(&self) -> EncryptionSource {
        if self.account_keys.is_some() {
            EncryptionSource::Account
        } else if matches!(self.offline_keys, Some(OfflineKeys::Unlocked(_))) {
            EncryptionSource::Offline
        } else {
            EncryptionSource::None
        }
    }

    pub fn encryption_enabled(&self) -> bool {
        self.active_keys().is_some()
    }

    /// Protocol version for new writes: the active parameters' version, `002`
    /// for keys without parameters, `001` when there are no keys.
    pub fn protocol_version(&self) -> ProtocolVersion {
        match (self.active_params(), self.active_keys()) {
            (Some(params), _) => params.version,
            (None, Some(_)) => ProtocolVersion::V002,
            (None, None) => ProtocolVersion::V001,
        }
    }

    pub fn offline_passcode_hash(&self) -> Option<&str> {
        self.offline_keys.as_ref().map(OfflineKeys::passcode_hash)
    }

    pub fn has_offline_passcode(&self) -> bool {
        self.offline_keys.is_some()
    }

    pub fn offline_params(&self) -> Option<&KeyParams> {
        self.offline_params.as_ref()
    }

    /// Sign out: forget account keys and parameters.
    #[instrument(level = "info", skip(self))]
    pub fn clear_account(&mut self) -> Result<(), KeyStoreError> {
        self.store.clear()?;
        self.account_keys = None;
        self.account_params = None;
        info!("Account keys cleared");
        self.persist()
    }

    /// Remove the offline passcode. Refused while the offline keys are locked.
    #[instrument(level = "info", skip(self))]
    pub fn clear_offline(&mut self) -> Result<(), KeyStoreError> {
        match self.offline_keys {
            Some(OfflineKeys::Unlocked(_)) => {}
            Some(OfflineKeys::Locked { .. }) => {
                warn!("Refusing to remove locked passcode");
                return Err(KeyStoreError::OfflineLocked);
            }
            None => return Err(KeyStoreError::NoOfflinePasscode),
        }
        self.offline_keys = None;
        self.offline_params = None;
        info!("Offline passcode removed");
        self.persist()
    }

    /// Derive offline keys from `passcode` and unlock them if the derived
    /// hash matches the stored one.
    #[instrument(level = "info", skip(self, provider, passcode))]
    pub fn unlock_offline<P: CryptoProvider + ?Sized>(
        &mut self,
        provider: &P,
        passcode: &str,
    ) -> Result<(), KeyStoreError> {
        let (Some(offline), Some(params)) = (&self.offline_keys, &self.offline_params) else {
            return Err(KeyStoreError::NoOfflinePasscode);
        };

        let keys = MasterKeys::derive(provider, passcode, params)?;
        if !provider.timing_safe_eq(keys.server_password(), offline.passcode_hash()) {
            warn!("Offline passcode rejected");
            return Err(KeyStoreError::WrongPasscode);
        }

        self.offline_keys = Some(OfflineKeys::Unlocked(keys));
        info!("Offline keys unlocked");
        Ok(())
    }
}
