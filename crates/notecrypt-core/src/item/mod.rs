//! Item payloads and the two-tier item key manager.
//!
//! Every encryption draws a fresh 512-bit item key. The item key is wrapped
//! under the master keys (`enc_item_key`) and its halves encrypt and
//! authenticate the content envelope:
//!
//! ```text
//! enc_item_key = envelope(item_key, mk, ak)
//! content      = envelope(content_json, item_key[..32], item_key[32..])
//! auth_hash    = HMAC(content, item_key[32..])        (001 only)
//! ```

pub mod batch;
#[cfg(feature = "async")]
pub mod batch_async;
pub mod params;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::crypto::keys::ItemKey;
use crate::crypto::{CryptoError, CryptoProvider, MasterKeys, NativeCryptoProvider};
use crate::envelope::{
    DecryptError, Envelope, EnvelopeCodec, EnvelopeKeys, ProtocolVersion, UNENCRYPTED_TAG,
    VERSION_TAG_LEN,
};

pub use batch::{BatchError, BatchReport, ItemFailure};
#[cfg(feature = "async")]
pub use batch_async::{ChunkedBatch, decrypt_items_chunked};
pub use params::ItemParams;

/// An item as stored locally or exchanged with the sync server.
///
/// `content` is a string while the item is encrypted (or `000`-encoded) and
/// after decryption holds the plaintext JSON text. Local export formats may
/// carry the content object inline, which batch decryption skips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub enc_item_key: Option<String>,
    #[serde(default)]
    pub auth_hash: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    #[serde(
        default,
        rename = "errorDecrypting",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_decrypting: Option<bool>,
    /// Fields this layer does not interpret, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemPayload {
    /// A fresh item with string content and no encryption metadata.
    pub fn new(uuid: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            content_type: None,
            content: Value::String(content.into()),
            enc_item_key: None,
            auth_hash: None,
            deleted: false,
            created_at: None,
            updated_at: None,
            dirty: None,
            error_decrypting: None,
            extra: Map::new(),
        }
    }

    /// Borrowed view of the encrypted fields, or `None` when the content is
    /// not a string.
    pub fn ciphertext(&self) -> Option<ItemCiphertext<'_>> {
        let content = self.content.as_str()?;
        Some(ItemCiphertext {
            uuid: &self.uuid,
            content,
            enc_item_key: self.enc_item_key.as_deref(),
            auth_hash: self.auth_hash.as_deref(),
        })
    }

    /// Content as JSON text, whether it is held as a string or inline.
    pub fn content_json(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_error_decrypting(&self) -> bool {
        self.error_decrypting == Some(true)
    }
}

/// Encrypted fields of one item, as consumed by [`ItemKeyManager::decrypt_item`].
#[derive(Debug, Clone, Copy)]
pub struct ItemCiphertext<'a> {
    pub uuid: &'a str,
    pub content: &'a str,
    pub enc_item_key: Option<&'a str>,
    /// Detached content auth hash, present only for `001` items.
    pub auth_hash: Option<&'a str>,
}

/// Output of [`ItemKeyManager::encrypt_item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedItemParams {
    pub enc_item_key: String,
    pub content: String,
    /// Only set for `001`.
    pub auth_hash: Option<String>,
}

/// Encrypts and decrypts items with per-item keys wrapped under master keys.
#[derive(Debug, Clone, Default)]
pub struct ItemKeyManager<P = NativeCryptoProvider> {
    provider: P,
}

impl<P: CryptoProvider> ItemKeyManager<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn codec(&self) -> EnvelopeCodec<'_, P> {
        EnvelopeCodec::new(&self.provider)
    }

    /// Encrypt `content` for the item `uuid` under fresh item key.
    ///
    /// The `001` key wrapper is written bare, without its version tag.
    #[instrument(level = "debug", skip(self, content, keys), fields(version = %version))]
    pub fn encrypt_item(
        &self,
        uuid: &str,
        content: &str,
        keys: &MasterKeys,
        version: ProtocolVersion,
    ) -> Result<EncryptedItemParams, CryptoError> {
        let codec = self.codec();
        let item_key = ItemKey::generate(&self.provider)?;

        let master = EnvelopeKeys::new(keys.encryption_key(), keys.auth_key());
        let enc_item_key = match codec.encode(item_key.as_str(), master, uuid, version)? {
            Envelope::Legacy(legacy) => legacy.ciphertext().to_owned(),
            authenticated @ Envelope::Authenticated(_) => authenticated.to_string(),
        };

        let item_keys = EnvelopeKeys::new(item_key.encryption_key(), item_key.auth_key());
        let content_envelope = codec.encode(content, item_keys, uuid, version)?;

        let auth_hash = if version.is_authenticated() {
            None
        } else {
            Some(codec.detached_auth_hash(&content_envelope, item_key.auth_key())?)
        };

        debug!("Item encrypted");
        Ok(EncryptedItemParams {
            enc_item_key,
            content: content_envelope.to_string(),
            auth_hash,
        })
    }

    /// Decrypt one item's content.
    ///
    /// Content without a version tag, or an item without `enc_item_key`, is an
    /// unencrypted `000` payload and is base64-decoded. Any failure leaves
    /// nothing half-decrypted: the caller either gets the whole plaintext or
    /// an error.
    #[instrument(level = "debug", skip(self, item, keys), fields(uuid = item.uuid))]
    pub fn decrypt_item(
        &self,
        item: ItemCiphertext<'_>,
        keys: &MasterKeys,
    ) -> Result<String, DecryptError> {
        let enc_item_key = match item.enc_item_key {
            Some(key) if ProtocolVersion::from_prefix(item.content).is_some() => key,
            _ => return decode_unencrypted(item.content),
        };

        let codec = self.codec();

        let (key_envelope, requires_auth) = if is_tagged_envelope(enc_item_key) {
            (Envelope::decode(enc_item_key)?, true)
        } else {
            let tagged = format!("{}{enc_item_key}", ProtocolVersion::V001);
            (Envelope::decode(&tagged)?, false)
        };

        let master = EnvelopeKeys::new(keys.encryption_key(), keys.auth_key());
        let item_key = ItemKey::from_hex(codec.verify_and_decrypt(
            &key_envelope,
            master,
            item.uuid,
            requires_auth,
            None,
        )?);

        let content_envelope = Envelope::decode(item.content)?;
        let item_keys = EnvelopeKeys::new(item_key.encryption_key(), item_key.auth_key());
        let plaintext = codec.verify_and_decrypt(
            &content_envelope,
            item_keys,
            item.uuid,
            true,
            item.auth_hash,
        )?;

        Ok(plaintext.as_str().to_owned())
    }

    /// Decrypt `item` in place.
    ///
    /// Success replaces the content with the plaintext and clears
    /// `errorDecrypting`. Failure sets `errorDecrypting` and leaves the
    /// ciphertext untouched so it can be retried with other keys.
    /// Items whose content is not a string are left alone.
    pub fn apply_decryption(
        &self,
        item: &mut ItemPayload,
        keys: &MasterKeys,
    ) -> Result<(), DecryptError> {
        let Some(ciphertext) = item.ciphertext() else {
            return Ok(());
        };
        match self.decrypt_item(ciphertext, keys) {
            Ok(plaintext) => {
                item.content = Value::String(plaintext);
                item.error_decrypting = Some(false);
                Ok(())
            }
            Err(err) => {
                item.error_decrypting = Some(true);
                Err(err)
            }
        }
    }
}

/// Whether an `enc_item_key` carries its own authenticated version tag.
fn is_tagged_envelope(s: &str) -> bool {
    ProtocolVersion::from_prefix(s).is_some_and(ProtocolVersion::is_authenticated)
        && s.as_bytes().get(VERSION_TAG_LEN) == Some(&b':')
}

/// Encode content for storage without encryption: `"000" + base64(json)`.
pub fn encode_unencrypted(content_json: &str) -> String {
    format!("{UNENCRYPTED_TAG}{}", STANDARD.encode(content_json))
}

/// Read back a payload written by [`encode_unencrypted`].
pub fn decode_unencrypted(content: &str) -> Result<String, DecryptError> {
    let body = content
        .get(VERSION_TAG_LEN..)
        .ok_or(DecryptError::InvalidPlaintextPayload)?;
    let bytes = STANDARD
        .decode(body)
        .map_err(|_| DecryptError::InvalidPlaintextPayload)?;
    String::from_utf8(bytes).map_err(|_| DecryptError::InvalidPlaintextPayload)
}
