//! Builds wire payloads from decrypted items.
//!
//! | Target        | Fields                                                       |
//! |---------------|--------------------------------------------------------------|
//! | sync          | uuid, content_type, deleted, created_at + encrypted params   |
//! | local storage | sync fields + updated_at, dirty, errorDecrypting             |
//!
//! Without keys (or for items that opt out), sync payloads carry
//! `"000" + base64(content)` with null `enc_item_key`/`auth_hash`, while local
//! storage keeps the content object inline.

use serde_json::{Map, Value};
use tracing::trace;

use super::{ItemKeyManager, ItemPayload, encode_unencrypted};
use crate::crypto::{CryptoError, CryptoProvider, MasterKeys};
use crate::envelope::ProtocolVersion;

/// Payload builder for one decrypted item.
pub struct ItemParams<'a, P: CryptoProvider> {
    manager: &'a ItemKeyManager<P>,
    item: &'a ItemPayload,
    keys: Option<&'a MasterKeys>,
    version: ProtocolVersion,
    do_not_encrypt: bool,
}

impl<'a, P: CryptoProvider> ItemParams<'a, P> {
    pub fn new(
        manager: &'a ItemKeyManager<P>,
        item: &'a ItemPayload,
        keys: Option<&'a MasterKeys>,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            manager,
            item,
            keys,
            version,
            do_not_encrypt: false,
        }
    }

    /// Store this item unencrypted even when keys are available.
    #[must_use]
    pub fn do_not_encrypt(mut self, value: bool) -> Self {
        self.do_not_encrypt = value;
        self
    }

    /// Payload for upload to the sync server.
    pub fn for_sync(&self) -> Result<ItemPayload, CryptoError> {
        self.build(false)
    }

    /// Payload for the local database.
    pub fn for_local_storage(&self) -> Result<ItemPayload, CryptoError> {
        let mut params = self.build(true)?;
        params.updated_at.clone_from(&self.item.updated_at);
        params.dirty = self.item.dirty;
        params.error_decrypting = self.item.error_decrypting;
        Ok(params)
    }

    fn build(&self, local: bool) -> Result<ItemPayload, CryptoError> {
        let mut params = ItemPayload {
            uuid: self.item.uuid.clone(),
            content_type: self.item.content_type.clone(),
            content: Value::Null,
            enc_item_key: None,
            auth_hash: None,
            deleted: self.item.deleted,
            created_at: self.item.created_at.clone(),
            updated_at: None,
            dirty: None,
            error_decrypting: None,
            extra: Map::new(),
        };

        match self.keys {
            Some(keys) if !self.do_not_encrypt => {
                let encrypted = self.manager.encrypt_item(
                    &self.item.uuid,
                    &self.item.content_json(),
                    keys,
                    self.version,
                )?;
                params.content = Value::String(encrypted.content);
                params.enc_item_key = Some(encrypted.enc_item_key);
                // Only 001 carries a detached hash
                params.auth_hash = if self.version.is_authenticated() {
                    None
                } else {
                    encrypted.auth_hash
                };
            }
            _ if local => {
                trace!(uuid = %self.item.uuid, "Storing item content inline");
                params.content = match &self.item.content {
                    Value::String(text) => {
                        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
                    }
                    other => other.clone(),
                };
                params.enc_item_key.clone_from(&self.item.enc_item_key);
                params.auth_hash.clone_from(&self.item.auth_hash);
            }
            _ => {
                params.content = Value::String(encode_unencrypted(&self.item.content_json()));
            }
        }

        Ok(params)
    }
}
