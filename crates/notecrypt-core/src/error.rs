//! Error types for the notecrypt-core crate

// Re-export error types from submodules
pub use crate::config::ConfigError;
pub use crate::crypto::{CryptoError, KeyDerivationError};
pub use crate::envelope::{DecryptError, DecryptErrorKind, EnvelopeError};
pub use crate::item::BatchError;
pub use crate::keystore::KeyStoreError;
