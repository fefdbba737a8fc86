//! Cryptographic primitives and key material for item encryption

pub mod keys;
pub mod provider;

use thiserror::Error;

/// Errors raised by the primitive crypto provider.
///
/// # Security Classification
///
/// None of these variants say anything about *who* produced the input. A
/// padding failure can mean a wrong key as easily as a corrupted ciphertext,
/// so callers above the provider translate them into item-level decryption
/// failures rather than integrity verdicts.
///
/// Variants are marked **[USER ERROR]** when they typically come from bad
/// stored data or wrong keys, and **[PROGRAMMING ERROR]** when they indicate
/// invalid parameters passed by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    // =========================================================================
    // USER ERRORS - Corrupted input or wrong key material
    // =========================================================================
    /// AES-CBC decryption produced invalid PKCS#7 padding.
    ///
    /// **[USER ERROR]** Almost always a wrong key, occasionally a truncated or
    /// modified ciphertext.
    #[error("AES-CBC decryption failed - wrong key or corrupted ciphertext")]
    CipherFailure,

    /// Ciphertext is not valid base64.
    ///
    /// **[USER ERROR]** The stored payload is corrupted.
    #[error("Invalid base64 in {field}")]
    InvalidBase64 { field: &'static str },

    /// Decrypted bytes are not valid UTF-8.
    ///
    /// **[USER ERROR]** Decryption with the wrong key can pass the padding
    /// check by chance; the garbage that comes out is rejected here.
    #[error("Decrypted plaintext is not valid UTF-8")]
    InvalidUtf8,

    // =========================================================================
    // PROGRAMMING ERRORS - Invalid parameters
    // =========================================================================
    /// Key or IV material is not valid hexadecimal.
    ///
    /// **[PROGRAMMING ERROR]** Keys and IVs travel as lowercase hex strings.
    #[error("Invalid hex in {field}")]
    InvalidHex { field: &'static str },

    /// Key material has the wrong length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// IV has the wrong length.
    #[error("Invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    /// Requested key size is zero or not a whole number of bytes.
    #[error("Invalid key size: {bits} bits")]
    InvalidKeySize { bits: usize },

    /// PBKDF2 was asked for zero iterations.
    #[error("PBKDF2 iteration count must be positive")]
    InvalidIterationCount,

    // =========================================================================
    // SYSTEM ERRORS
    // =========================================================================
    /// The system random number generator failed.
    #[error("System RNG failed")]
    Rng,
}

// Re-export commonly used types
pub use keys::{ItemKey, KeyDerivationError, KeyParams, MasterKeys};
pub use provider::{CryptoProvider, NativeCryptoProvider};
