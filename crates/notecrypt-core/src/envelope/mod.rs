//! Versioned ciphertext envelopes.
//!
//! Two layouts exist on the wire:
//!
//! ```text
//! 001<base64 ciphertext>                          (legacy, zero IV, detached auth hash)
//! <version>:<auth_hash>:<uuid>:<iv>:<ciphertext>  (002 and 003)
//! ```
//!
//! For authenticated envelopes the auth hash is
//! `HMAC-SHA256(auth_key, "<version>:<uuid>:<iv>:<ciphertext>")` in lowercase
//! hex. Parsing is pure: [`Envelope::decode`] produces a tagged variant and does
//! no cryptographic work. [`codec::EnvelopeCodec`] performs encryption,
//! verification and decryption.

pub mod codec;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use codec::{DecryptError, DecryptErrorKind, EnvelopeCodec, EnvelopeKeys};

/// Length of the version tag at the start of every envelope.
pub const VERSION_TAG_LEN: usize = 3;

/// Number of `:`-separated fields in an authenticated envelope.
pub const AUTHENTICATED_FIELD_COUNT: usize = 5;

/// Tag prefixed to base64 payloads that were stored without encryption.
pub const UNENCRYPTED_TAG: &str = "000";

/// Encryption protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProtocolVersion {
    /// Zero IV, no inline authentication.
    V001,
    /// Random IV, inline HMAC bound to the item uuid.
    V002,
    /// Same envelope as `002` with nonce-based key derivation.
    V003,
}

impl ProtocolVersion {
    /// Version used for new writes when nothing else is configured.
    pub const LATEST: Self = Self::V003;

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V001 => "001",
            Self::V002 => "002",
            Self::V003 => "003",
        }
    }

    /// Whether envelopes of this version carry an inline auth hash.
    pub const fn is_authenticated(self) -> bool {
        !matches!(self, Self::V001)
    }

    /// Minimum acceptable PBKDF2 iteration count for key derivation.
    pub const fn cost_minimum(self) -> u32 {
        match self {
            Self::V001 | Self::V002 => 3_000,
            Self::V003 => 110_000,
        }
    }

    /// Parse a version tag from the start of `s`, if any.
    pub fn from_prefix(s: &str) -> Option<Self> {
        s.get(..VERSION_TAG_LEN)?.parse().ok()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "001" => Ok(Self::V001),
            "002" => Ok(Self::V002),
            "003" => Ok(Self::V003),
            other => Err(EnvelopeError::UnknownVersion {
                tag: other.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self {
        value.as_str().to_owned()
    }
}

/// Structural envelope decode failures.
///
/// **[USER ERROR]** These always point at corrupted or foreign stored data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Envelope is too short to carry a version tag")]
    TooShort,

    #[error("Unknown envelope version '{tag}'")]
    UnknownVersion { tag: String },

    #[error("Envelope has {found} fields, expected {AUTHENTICATED_FIELD_COUNT}")]
    FieldCount { found: usize },
}

/// Legacy `001` envelope: the version tag followed by base64 ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEnvelope {
    raw: String,
}

impl LegacyEnvelope {
    /// Wrap base64 ciphertext with the `001` tag.
    pub fn from_ciphertext(ciphertext: &str) -> Self {
        Self {
            raw: format!("{}{ciphertext}", ProtocolVersion::V001),
        }
    }

    /// Base64 ciphertext following the three-character tag.
    pub fn ciphertext(&self) -> &str {
        &self.raw[VERSION_TAG_LEN..]
    }

    /// The complete envelope string, which is also the HMAC input for the
    /// detached auth hash.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// `002`/`003` envelope with inline authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedEnvelope {
    pub version: ProtocolVersion,
    pub auth_hash: String,
    pub uuid: String,
    pub iv: String,
    pub ciphertext: String,
}

impl AuthenticatedEnvelope {
    /// The string covered by `auth_hash`: `version:uuid:iv:ciphertext`.
    pub fn signing_input(&self) -> String {
        signing_input(self.version, &self.uuid, &self.iv, &self.ciphertext)
    }
}

pub(crate) fn signing_input(
    version: ProtocolVersion,
    uuid: &str,
    iv: &str,
    ciphertext: &str,
) -> String {
    [version.as_str(), uuid, iv, ciphertext].join(":")
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Legacy(LegacyEnvelope),
    Authenticated(AuthenticatedEnvelope),
}

impl Envelope {
    /// Parse an envelope string.
    ///
    /// A string is legacy when it starts with `001`, or when it starts with a
    /// modern tag that is not followed by `:` (an old writer's output that
    /// happens to begin with those digits in base64). Everything else must be
    /// exactly five `:`-separated fields.
    pub fn decode(s: &str) -> Result<Self, EnvelopeError> {
        let tag = s.get(..VERSION_TAG_LEN).ok_or(EnvelopeError::TooShort)?;
        let version: ProtocolVersion = tag.parse()?;

        if version == ProtocolVersion::V001 || s.as_bytes().get(VERSION_TAG_LEN) != Some(&b':') {
            return Ok(Self::Legacy(LegacyEnvelope { raw: s.to_owned() }));
        }

        let fields: Vec<&str> = s.split(':').collect();
        let [_, auth_hash, uuid, iv, ciphertext] = fields.as_slice() else {
            return Err(EnvelopeError::FieldCount {
                found: fields.len(),
            });
        };

        Ok(Self::Authenticated(AuthenticatedEnvelope {
            version,
            auth_hash: (*auth_hash).to_owned(),
            uuid: (*uuid).to_owned(),
            iv: (*iv).to_owned(),
            ciphertext: (*ciphertext).to_owned(),
        }))
    }

    /// Version tag of the envelope. Legacy envelopes always report `001`.
    pub fn version(&self) -> ProtocolVersion {
        match self {
            Self::Legacy(_) => ProtocolVersion::V001,
            Self::Authenticated(env) => env.version,
        }
    }

    /// Item uuid bound into the envelope, if any.
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::Legacy(_) => None,
            Self::Authenticated(env) => Some(&env.uuid),
        }
    }

    /// Inline auth hash, if any.
    pub fn auth_hash(&self) -> Option<&str> {
        match self {
            Self::Legacy(_) => None,
            Self::Authenticated(env) => Some(&env.auth_hash),
        }
    }

    /// The string an auth hash for this envelope is computed over.
    pub fn signing_input(&self) -> String {
        match self {
            Self::Legacy(env) => env.as_str().to_owned(),
            Self::Authenticated(env) => env.signing_input(),
        }
    }

    /// Base64 ciphertext carried by the envelope.
    pub fn ciphertext(&self) -> &str {
        match self {
            Self::Legacy(env) => env.ciphertext(),
            Self::Authenticated(env) => &env.ciphertext,
        }
    }

    /// Hex IV, absent for legacy envelopes.
    pub fn iv(&self) -> Option<&str> {
        match self {
            Self::Legacy(_) => None,
            Self::Authenticated(env) => Some(&env.iv),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy(env) => f.write_str(env.as_str()),
            Self::Authenticated(env) => write!(
                f,
                "{}:{}:{}:{}:{}",
                env.version, env.auth_hash, env.uuid, env.iv, env.ciphertext
            ),
        }
    }
}

impl FromStr for Envelope {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tags() {
        for (tag, version) in [
            ("001", ProtocolVersion::V001),
            ("002", ProtocolVersion::V002),
            ("003", ProtocolVersion::V003),
        ] {
            assert_eq!(tag.parse::<ProtocolVersion>().unwrap(), version);
            assert_eq!(version.to_string(), tag);
        }
        assert!("004".parse::<ProtocolVersion>().is_err());
        assert!(!ProtocolVersion::V001.is_authenticated());
        assert!(ProtocolVersion::V003.is_authenticated());
        assert_eq!(ProtocolVersion::LATEST, ProtocolVersion::V003);
    }

    #[test]
    fn test_version_serde_uses_tag() {
        let json = serde_json::to_string(&ProtocolVersion::V002).unwrap();
        assert_eq!(json, "\"002\"");
        let parsed: ProtocolVersion = serde_json::from_str("\"003\"").unwrap();
        assert_eq!(parsed, ProtocolVersion::V003);
        assert!(serde_json::from_str::<ProtocolVersion>("\"999\"").is_err());
    }

    #[test]
    fn test_decode_legacy() {
        let env = Envelope::decode("001c2VjcmV0").unwrap();
        let Envelope::Legacy(legacy) = &env else {
            panic!("expected legacy envelope");
        };
        assert_eq!(legacy.ciphertext(), "c2VjcmV0");
        assert_eq!(env.signing_input(), "001c2VjcmV0");
        assert_eq!(env.uuid(), None);
        assert_eq!(env.auth_hash(), None);
        assert_eq!(env.iv(), None);
    }

    #[test]
    fn test_decode_modern_tag_without_colon_is_legacy() {
        let env = Envelope::decode("002abcdef").unwrap();
        assert!(matches!(env, Envelope::Legacy(_)));
        assert_eq!(env.ciphertext(), "abcdef");
    }

    #[test]
    fn test_decode_authenticated() {
        let env = Envelope::decode("002:ffee:abc-123:00aa:Y2lwaGVy").unwrap();
        let Envelope::Authenticated(inner) = &env else {
            panic!("expected authenticated envelope");
        };
        assert_eq!(inner.version, ProtocolVersion::V002);
        assert_eq!(inner.auth_hash, "ffee");
        assert_eq!(inner.uuid, "abc-123");
        assert_eq!(inner.iv, "00aa");
        assert_eq!(inner.ciphertext, "Y2lwaGVy");
        assert_eq!(env.signing_input(), "002:abc-123:00aa:Y2lwaGVy");
        assert_eq!(env.to_string(), "002:ffee:abc-123:00aa:Y2lwaGVy");
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Envelope::decode("00"), Err(EnvelopeError::TooShort));
        assert_eq!(
            Envelope::decode("abc:1:2:3:4"),
            Err(EnvelopeError::UnknownVersion {
                tag: "abc".to_owned()
            })
        );
        assert_eq!(
            Envelope::decode("002:a:b:c"),
            Err(EnvelopeError::FieldCount { found: 4 })
        );
        assert_eq!(
            Envelope::decode("003:a:b:c:d:e"),
            Err(EnvelopeError::FieldCount { found: 6 })
        );
    }

    #[test]
    fn test_decode_multibyte_does_not_panic() {
        assert!(Envelope::decode("0é1xyz").is_err());
    }

    #[test]
    fn test_from_prefix() {
        assert_eq!(
            ProtocolVersion::from_prefix("002:x"),
            Some(ProtocolVersion::V002)
        );
        assert_eq!(ProtocolVersion::from_prefix("000abc"), None);
        assert_eq!(ProtocolVersion::from_prefix("0"), None);
    }
}
