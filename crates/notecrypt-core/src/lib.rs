//! Versioned item encryption for a note-taking sync client.
//!
//! Three layers, leaves first:
//!
//! 1. [`crypto`]: the [`CryptoProvider`](crypto::CryptoProvider) capability
//!    (AES-256-CBC, HMAC-SHA256, PBKDF2, SHA-256, random keys) and key types.
//! 2. [`envelope`]: the `001` and `002`/`003` ciphertext envelopes and their
//!    codec.
//! 3. [`item`]: per-item keys wrapped under master keys, with single-item and
//!    batch encrypt/decrypt.
//!
//! [`keystore`] manages session keys over an external secure store.
//!
//! ```
//! use notecrypt_core::crypto::{MasterKeys, NativeCryptoProvider};
//! use notecrypt_core::envelope::ProtocolVersion;
//! use notecrypt_core::item::{ItemCiphertext, ItemKeyManager};
//!
//! let manager = ItemKeyManager::new(NativeCryptoProvider::new());
//! let keys = MasterKeys::new("00".repeat(32), "11".repeat(32), "22".repeat(32));
//!
//! let params = manager
//!     .encrypt_item("abc-123", "hello world", &keys, ProtocolVersion::V002)
//!     .unwrap();
//! let plaintext = manager
//!     .decrypt_item(
//!         ItemCiphertext {
//!             uuid: "abc-123",
//!             content: &params.content,
//!             enc_item_key: Some(&params.enc_item_key),
//!             auth_hash: params.auth_hash.as_deref(),
//!         },
//!         &keys,
//!     )
//!     .unwrap();
//! assert_eq!(plaintext, "hello world");
//! ```

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod item;
pub mod keystore;

pub use config::EncryptionConfig;
pub use crypto::{CryptoProvider, MasterKeys, NativeCryptoProvider};
pub use envelope::{Envelope, ProtocolVersion};
pub use item::{ItemKeyManager, ItemPayload};

#[cfg(feature = "async")]
pub use item::decrypt_items_chunked;
