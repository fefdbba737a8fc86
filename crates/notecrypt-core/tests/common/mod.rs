#![allow(dead_code)]

use aes::Aes256;
use aes::cipher::{BlockEncrypt, KeyInit};
use base64::{Engine, engine::general_purpose::STANDARD};
use notecrypt_core::crypto::{MasterKeys, NativeCryptoProvider};
use notecrypt_core::item::{ItemKeyManager, ItemPayload};
use notecrypt_core::ProtocolVersion;
use ring::hmac;

pub const TEST_UUID: &str = "abc-123";

/// Deterministic master keys for testing
pub fn test_master_keys() -> MasterKeys {
    MasterKeys::new("01".repeat(32), "02".repeat(32), "03".repeat(32))
}

/// Master keys unrelated to [`test_master_keys`]
pub fn other_master_keys() -> MasterKeys {
    MasterKeys::new("0a".repeat(32), "0b".repeat(32), "0c".repeat(32))
}

pub fn manager() -> ItemKeyManager<NativeCryptoProvider> {
    ItemKeyManager::new(NativeCryptoProvider::new())
}

/// Encrypt `content` into a sync-ready item payload.
pub fn encrypted_item(
    manager: &ItemKeyManager<NativeCryptoProvider>,
    uuid: &str,
    content: &str,
    keys: &MasterKeys,
    version: ProtocolVersion,
) -> ItemPayload {
    let params = manager.encrypt_item(uuid, content, keys, version).unwrap();
    let mut item = ItemPayload::new(uuid, params.content);
    item.enc_item_key = Some(params.enc_item_key);
    item.auth_hash = params.auth_hash;
    item
}

/// AES-256-CBC with a zero IV and PKCS#7 padding, built from the raw block
/// cipher so fixtures do not share code with the implementation under test.
pub fn legacy_cbc_encrypt(plaintext: &[u8], key_hex: &str) -> String {
    let cipher = Aes256::new_from_slice(&hex::decode(key_hex).unwrap()).unwrap();

    let pad = 16 - plaintext.len() % 16;
    let mut data = plaintext.to_vec();
    data.extend(std::iter::repeat_n(u8::try_from(pad).unwrap(), pad));

    let mut prev = [0u8; 16];
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(16) {
        let mut block = aes::Block::default();
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = chunk[i] ^ prev[i];
        }
        cipher.encrypt_block(&mut block);
        prev.copy_from_slice(&block);
        out.extend_from_slice(&block);
    }
    STANDARD.encode(out)
}

/// HMAC-SHA256 as lowercase hex, computed directly with ring.
pub fn hmac_hex(message: &str, key_hex: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, &hex::decode(key_hex).unwrap());
    hex::encode(hmac::sign(&key, message.as_bytes()).as_ref())
}

/// Replace the character at `index` with a different base64/hex-safe one.
pub fn flip_char(s: &str, index: usize) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    chars[index] = if chars[index] == 'a' { 'b' } else { 'a' };
    chars.into_iter().collect()
}

/// Route tracing output through the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
