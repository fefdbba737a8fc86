mod common;

use common::{TEST_UUID, flip_char};
use notecrypt_core::crypto::{CryptoProvider, NativeCryptoProvider};
use notecrypt_core::envelope::{
    DecryptError, DecryptErrorKind, Envelope, EnvelopeCodec, EnvelopeError, EnvelopeKeys,
    ProtocolVersion,
};
use proptest::prelude::*;

const EK: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
const AK: &str = "4a6566654a6566654a6566654a6566654a6566654a6566654a6566654a656665";

fn keys() -> EnvelopeKeys<'static> {
    EnvelopeKeys::new(EK, AK)
}

fn encode_wire(version: ProtocolVersion, plaintext: &str) -> String {
    let provider = NativeCryptoProvider::new();
    EnvelopeCodec::new(&provider)
        .encode(plaintext, keys(), TEST_UUID, version)
        .unwrap()
        .to_string()
}

fn decrypt_wire(wire: &str, uuid: &str) -> Result<String, DecryptError> {
    let provider = NativeCryptoProvider::new();
    let envelope = Envelope::decode(wire)?;
    EnvelopeCodec::new(&provider)
        .verify_and_decrypt(&envelope, keys(), uuid, true, None)
        .map(|p| p.as_str().to_owned())
}

#[test]
fn test_authenticated_layout() {
    let wire = encode_wire(ProtocolVersion::V002, "hello world");
    let fields: Vec<&str> = wire.split(':').collect();
    assert_eq!(fields.len(), 5);
    assert_eq!(fields[0], "002");
    assert_eq!(fields[1].len(), 64);
    assert!(fields[1].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(fields[2], TEST_UUID);
    assert_eq!(fields[3].len(), 32);
    assert!(fields[3].chars().all(|c| c.is_ascii_hexdigit()));

    // Auth hash covers version:uuid:iv:ciphertext
    let signing_input = [fields[0], fields[2], fields[3], fields[4]].join(":");
    assert_eq!(fields[1], common::hmac_hex(&signing_input, AK));
}

#[test]
fn test_003_uses_same_layout() {
    let wire = encode_wire(ProtocolVersion::V003, "hello world");
    assert!(wire.starts_with("003:"));
    assert_eq!(wire.split(':').count(), 5);
    assert_eq!(decrypt_wire(&wire, TEST_UUID).unwrap(), "hello world");
}

#[test]
fn test_random_iv_per_encryption() {
    let a = encode_wire(ProtocolVersion::V002, "same plaintext");
    let b = encode_wire(ProtocolVersion::V002, "same plaintext");
    assert_ne!(a, b);
    assert_eq!(decrypt_wire(&a, TEST_UUID).unwrap(), "same plaintext");
    assert_eq!(decrypt_wire(&b, TEST_UUID).unwrap(), "same plaintext");
}

#[test]
fn test_legacy_encoding_is_deterministic() {
    let a = encode_wire(ProtocolVersion::V001, "same plaintext");
    let b = encode_wire(ProtocolVersion::V001, "same plaintext");
    assert_eq!(a, b);
    assert_eq!(
        &a[3..],
        common::legacy_cbc_encrypt(b"same plaintext", EK).as_str()
    );
}

#[test]
fn test_tampered_ciphertext_detected() {
    let wire = encode_wire(ProtocolVersion::V002, "hello world");
    let tampered = flip_char(&wire, wire.len() - 5);
    assert_eq!(
        decrypt_wire(&tampered, TEST_UUID).unwrap_err(),
        DecryptError::AuthMismatch
    );
}

#[test]
fn test_tampered_iv_detected() {
    let wire = encode_wire(ProtocolVersion::V002, "hello world");
    let iv_start = wire.match_indices(':').nth(2).unwrap().0 + 1;
    let tampered = flip_char(&wire, iv_start);
    assert_eq!(
        decrypt_wire(&tampered, TEST_UUID).unwrap_err().kind(),
        DecryptErrorKind::AuthMismatch
    );
}

#[test]
fn test_tampered_auth_hash_detected() {
    let wire = encode_wire(ProtocolVersion::V002, "hello world");
    let tampered = flip_char(&wire, 4);
    assert_eq!(
        decrypt_wire(&tampered, TEST_UUID).unwrap_err().kind(),
        DecryptErrorKind::AuthMismatch
    );
}

#[test]
fn test_uuid_binding() {
    let wire = encode_wire(ProtocolVersion::V002, "hello world");

    // Moved to another item
    let err = decrypt_wire(&wire, "xyz-789").unwrap_err();
    assert_eq!(err.kind(), DecryptErrorKind::UuidMismatch);

    // Uuid rewritten to match another item: HMAC no longer matches
    let rewritten = wire.replace(TEST_UUID, "xyz-789");
    assert_eq!(
        decrypt_wire(&rewritten, "xyz-789").unwrap_err(),
        DecryptError::AuthMismatch
    );
}

#[test]
fn test_missing_auth_hash_when_required() {
    let provider = NativeCryptoProvider::new();
    let wire = encode_wire(ProtocolVersion::V001, "legacy");
    let envelope = Envelope::decode(&wire).unwrap();
    let err = EnvelopeCodec::new(&provider)
        .verify_and_decrypt(&envelope, keys(), TEST_UUID, true, None)
        .unwrap_err();
    assert_eq!(err, DecryptError::AuthRequired);
}

#[test]
fn test_detached_hash_verified_for_legacy() {
    let provider = NativeCryptoProvider::new();
    let codec = EnvelopeCodec::new(&provider);
    let wire = encode_wire(ProtocolVersion::V001, "legacy");
    let envelope = Envelope::decode(&wire).unwrap();

    let good = provider.hmac_sha256(&wire, AK).unwrap();
    let plain = codec
        .verify_and_decrypt(&envelope, keys(), TEST_UUID, true, Some(&good))
        .unwrap();
    assert_eq!(plain.as_str(), "legacy");

    let bad = flip_char(&good, 0);
    assert_eq!(
        codec
            .verify_and_decrypt(&envelope, keys(), TEST_UUID, true, Some(&bad))
            .unwrap_err(),
        DecryptError::AuthMismatch
    );
}

#[test]
fn test_malformed_envelopes() {
    assert_eq!(
        decrypt_wire("002:only:three", TEST_UUID).unwrap_err(),
        DecryptError::Envelope(EnvelopeError::FieldCount { found: 3 })
    );
    assert_eq!(
        decrypt_wire("", TEST_UUID).unwrap_err().kind(),
        DecryptErrorKind::MalformedEnvelope
    );
    assert!(matches!(
        decrypt_wire("999:a:b:c:d", TEST_UUID),
        Err(DecryptError::Envelope(EnvelopeError::UnknownVersion { .. }))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_envelope_roundtrip(plaintext in "\\PC{0,200}", modern in any::<bool>()) {
        let version = if modern { ProtocolVersion::V002 } else { ProtocolVersion::V001 };
        let provider = NativeCryptoProvider::new();
        let codec = EnvelopeCodec::new(&provider);

        let wire = codec.encode(&plaintext, keys(), TEST_UUID, version).unwrap().to_string();
        let envelope = Envelope::decode(&wire).unwrap();
        let decrypted = codec
            .verify_and_decrypt(&envelope, keys(), TEST_UUID, modern, None)
            .unwrap();
        prop_assert_eq!(decrypted.as_str(), plaintext.as_str());
    }

    #[test]
    fn test_any_ciphertext_change_detected(plaintext in "[a-z]{1,64}", position in any::<prop::sample::Index>()) {
        let wire = encode_wire(ProtocolVersion::V002, &plaintext);
        let ciphertext_start = wire.rfind(':').unwrap() + 1;
        let index = ciphertext_start + position.index(wire.len() - ciphertext_start);
        let tampered = flip_char(&wire, index);
        prop_assert_eq!(decrypt_wire(&tampered, TEST_UUID).unwrap_err(), DecryptError::AuthMismatch);
    }
}
