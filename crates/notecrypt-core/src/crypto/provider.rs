#![forbid(unsafe_code)]

//! Primitive crypto provider.
//!
//! The envelope codec never touches a cipher directly. It goes through the
//! [`CryptoProvider`] capability trait, which speaks the same string encodings
//! the stored payloads use:
//!
//! | Value        | Encoding            |
//! |--------------|---------------------|
//! | keys, IVs    | lowercase hex       |
//! | ciphertext   | standard base64     |
//! | digests      | lowercase hex       |
//! | plaintext    | UTF-8 text          |
//!
//! [`NativeCryptoProvider`] implements the trait with `ring` (HMAC-SHA256,
//! SHA-256, PBKDF2-HMAC-SHA512, system RNG) and the RustCrypto `aes`/`cbc`
//! crates (AES-256-CBC with PKCS#7 padding).

use std::num::NonZeroU32;

use aes::Aes256;
use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, hmac, pbkdf2};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::CryptoError;

/// AES-256 key size in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// AES block size, and therefore CBC IV size, in bytes.
pub const IV_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Capability interface over the symmetric primitives used by the envelope
/// codec and key derivation.
///
/// Implementations must be stateless (or internally synchronized): a single
/// provider is shared by every concurrent encrypt/decrypt call.
///
/// Every `key` argument is hex: 64 hex characters (256 bits) for AES and
/// HMAC keys, matching the halves of derived master keys and item keys.
/// Anything else fails with [`CryptoError::InvalidHex`] or
/// [`CryptoError::InvalidKeyLength`]. `iv` is 32 hex characters.
pub trait CryptoProvider: Send + Sync {
    /// Derive `output_bits` of key material from `password` and `salt`.
    ///
    /// Returns lowercase hex. Deterministic for identical inputs.
    fn pbkdf2(
        &self,
        password: &str,
        salt: &str,
        iterations: u32,
        output_bits: usize,
    ) -> Result<Zeroizing<String>, CryptoError>;

    /// Generate `bits` of random key material as lowercase hex.
    fn generate_random_key(&self, bits: usize) -> Result<Zeroizing<String>, CryptoError>;

    /// Encrypt UTF-8 `plaintext` with AES-CBC, returning base64 ciphertext.
    ///
    /// `iv` of `None` selects the all-zero IV used by the `001` format.
    fn aes_cbc_encrypt(
        &self,
        plaintext: &str,
        key: &str,
        iv: Option<&str>,
    ) -> Result<String, CryptoError>;

    /// Decrypt base64 `ciphertext` with AES-CBC.
    ///
    /// Fails (rather than panicking) on malformed input, bad padding or
    /// non-UTF-8 output.
    fn aes_cbc_decrypt(
        &self,
        ciphertext: &str,
        key: &str,
        iv: Option<&str>,
    ) -> Result<Zeroizing<String>, CryptoError>;

    /// HMAC-SHA256 of `message` under the hex `key`, as lowercase hex.
    fn hmac_sha256(&self, message: &str, key: &str) -> Result<String, CryptoError>;

    /// SHA-256 of `text` as lowercase hex.
    fn sha256(&self, text: &str) -> String;

    /// Compare two authentication tags without leaking the position of the
    /// first difference.
    fn timing_safe_eq(&self, a: &str, b: &str) -> bool {
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }
}

/// Default provider backed by `ring` and the RustCrypto AES crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCryptoProvider;

impl NativeCryptoProvider {
    pub fn new() -> Self {
        Self
    }
}

fn decode_hex(value: &str, field: &'static str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    hex::decode(value)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::InvalidHex { field })
}

fn aes_key(key: &str) -> Result<Zeroizing<[u8; AES_KEY_SIZE]>, CryptoError> {
    let raw = decode_hex(key, "key")?;
    if raw.len() != AES_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_SIZE,
            actual: raw.len(),
        });
    }
    let mut out = Zeroizing::new([0u8; AES_KEY_SIZE]);
    out.copy_from_slice(&raw);
    Ok(out)
}

fn cbc_iv(iv: Option<&str>) -> Result<[u8; IV_SIZE], CryptoError> {
    let Some(iv) = iv else {
        return Ok([0u8; IV_SIZE]);
    };
    let raw = decode_hex(iv, "iv")?;
    raw.as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidIvLength {
            expected: IV_SIZE,
            actual: raw.len(),
        })
}

/// AES-256-CBC encryption with PKCS#7 padding over raw bytes.
pub(crate) fn cbc_encrypt_raw(
    plaintext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; IV_SIZE],
) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// AES-256-CBC decryption with PKCS#7 unpadding over raw bytes.
pub(crate) fn cbc_decrypt_raw(
    ciphertext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; IV_SIZE],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::CipherFailure)
}

impl CryptoProvider for NativeCryptoProvider {
    fn pbkdf2(
        &self,
        password: &str,
        salt: &str,
        iterations: u32,
        output_bits: usize,
    ) -> Result<Zeroizing<String>, CryptoError> {
        let iterations = NonZeroU32::new(iterations).ok_or(CryptoError::InvalidIterationCount)?;
        if output_bits == 0 || output_bits % 8 != 0 {
            return Err(CryptoError::InvalidKeySize { bits: output_bits });
        }

        let mut out = Zeroizing::new(vec![0u8; output_bits / 8]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA512,
            iterations,
            salt.as_bytes(),
            password.as_bytes(),
            &mut out,
        );
        Ok(Zeroizing::new(hex::encode(&*out)))
    }

    fn generate_random_key(&self, bits: usize) -> Result<Zeroizing<String>, CryptoError> {
        if bits == 0 || bits % 8 != 0 {
            return Err(CryptoError::InvalidKeySize { bits });
        }
        let mut bytes = Zeroizing::new(vec![0u8; bits / 8]);
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CryptoError::Rng)?;
        Ok(Zeroizing::new(hex::encode(&*bytes)))
    }

    fn aes_cbc_encrypt(
        &self,
        plaintext: &str,
        key: &str,
        iv: Option<&str>,
    ) -> Result<String, CryptoError> {
        let key = aes_key(key)?;
        let iv = cbc_iv(iv)?;
        let ciphertext = cbc_encrypt_raw(plaintext.as_bytes(), &key, &iv);
        Ok(STANDARD.encode(ciphertext))
    }

    fn aes_cbc_decrypt(
        &self,
        ciphertext: &str,
        key: &str,
        iv: Option<&str>,
    ) -> Result<Zeroizing<String>, CryptoError> {
        let key = aes_key(key)?;
        let iv = cbc_iv(iv)?;
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|_| CryptoError::InvalidBase64 {
                field: "ciphertext",
            })?;
        let plaintext = cbc_decrypt_raw(&raw, &key, &iv)?;
        let text = std::str::from_utf8(&plaintext).map_err(|_| CryptoError::InvalidUtf8)?;
        Ok(Zeroizing::new(text.to_owned()))
    }

    fn hmac_sha256(&self, message: &str, key: &str) -> Result<String, CryptoError> {
        let raw_key = decode_hex(key, "auth key")?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, &raw_key);
        let tag = hmac::sign(&key, message.as_bytes());
        Ok(hex::encode(tag.as_ref()))
    }

    fn sha256(&self, text: &str) -> String {
        hex::encode(digest::digest(&digest::SHA256, text.as_bytes()))
    }
}
