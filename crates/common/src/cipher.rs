//! AES-GCM sealing and opening of [`Envelope`]s.
//!
//! The key length selects the variant: 16 bytes → AES-128-GCM, 24 → AES-192-GCM,
//! 32 → AES-256-GCM. Every call to [`encrypt`] draws a fresh 96-bit nonce from
//! the OS CSPRNG. GCM nonce reuse under one key breaks both confidentiality and
//! authentication, so nonces are never derived or cached.

use aes_gcm::{
    aead::{consts::U12, rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::ProtocolError;
use crate::protocol::Envelope;

/// Byte length of an AES-GCM nonce (96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of an AES-GCM authentication tag (128 bits).
pub const TAG_LEN: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Seal `plaintext` under `key` and split the result into an [`Envelope`].
///
/// # Errors
///
/// Returns [`ProtocolError::EncryptionFailed`] if `key` is not 16, 24 or 32
/// bytes or the AEAD rejects the input.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Envelope, ProtocolError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = match key.len() {
        16 => seal_with::<Aes128Gcm>(key, &nonce, plaintext),
        24 => seal_with::<Aes192Gcm>(key, &nonce, plaintext),
        32 => seal_with::<Aes256Gcm>(key, &nonce, plaintext),
        _ => None,
    }
    .ok_or(ProtocolError::EncryptionFailed)?;

    // The AEAD appends the tag to the ciphertext; the wire format carries it separately.
    if sealed.len() < TAG_LEN {
        return Err(ProtocolError::EncryptionFailed);
    }
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(Envelope {
        data: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(nonce),
        tag: STANDARD.encode(tag),
    })
}

/// Open an [`Envelope`] sealed under `key`.
///
/// # Errors
///
/// - [`ProtocolError::MalformedEnvelope`] if a field is not valid base64.
/// - [`ProtocolError::InvalidNonceLength`] if `iv` is not [`NONCE_LEN`] bytes;
///   checked before any decryption is attempted.
/// - [`ProtocolError::DecryptionFailed`] for a wrong-sized tag, a wrong key or
///   tampered data. These cases are deliberately not told apart.
pub fn decrypt(envelope: &Envelope, key: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let nonce = decode_field(&envelope.iv, "iv")?;
    if nonce.len() != NONCE_LEN {
        return Err(ProtocolError::InvalidNonceLength(nonce.len()));
    }
    let tag = decode_field(&envelope.tag, "tag")?;
    if tag.len() != TAG_LEN {
        return Err(ProtocolError::DecryptionFailed);
    }
    let mut sealed = decode_field(&envelope.data, "data")?;
    sealed.extend_from_slice(&tag);

    match key.len() {
        16 => open_with::<Aes128Gcm>(key, &nonce, &sealed),
        24 => open_with::<Aes192Gcm>(key, &nonce, &sealed),
        32 => open_with::<Aes256Gcm>(key, &nonce, &sealed),
        _ => None,
    }
    .ok_or(ProtocolError::DecryptionFailed)
}

fn decode_field(value: &str, name: &str) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(value)
        .map_err(|_| ProtocolError::MalformedEnvelope(format!("`{name}` is not valid base64")))
}

fn seal_with<C>(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Option<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let cipher = C::new_from_slice(key).ok()?;
    cipher.encrypt(Nonce::from_slice(nonce), plaintext).ok()
}

fn open_with<C>(key: &[u8], nonce: &[u8], sealed: &[u8]) -> Option<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let cipher = C::new_from_slice(key).ok()?;
    cipher.decrypt(Nonce::from_slice(nonce), sealed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn random_key(len: usize) -> Vec<u8> {
        let mut key = vec![0u8; len];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Flip one bit inside the decoded bytes of a base64 field.
    fn flip_bit(field: &str, byte: usize, bit: u8) -> String {
        let mut raw = STANDARD.decode(field).unwrap();
        raw[byte] ^= 1 << bit;
        STANDARD.encode(raw)
    }

    #[test]
    fn round_trip_all_key_sizes() {
        for len in [16, 24, 32] {
            let key = random_key(len);
            let plaintext = br#"{"name":"x"}"#;
            let env = encrypt(plaintext, &key).unwrap();
            assert_eq!(decrypt(&env, &key).unwrap(), plaintext, "key len {len}");
        }
    }

    #[test]
    fn round_trip_empty_and_binary() {
        let key = random_key(32);
        for plaintext in [Vec::new(), (0u8..=255).collect::<Vec<u8>>(), vec![0u8; 4096]] {
            let env = encrypt(&plaintext, &key).unwrap();
            assert_eq!(decrypt(&env, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn envelope_field_sizes() {
        let key = random_key(16);
        let env = encrypt(b"hello", &key).unwrap();
        assert_eq!(STANDARD.decode(&env.iv).unwrap().len(), NONCE_LEN);
        assert_eq!(STANDARD.decode(&env.tag).unwrap().len(), TAG_LEN);
        assert_eq!(STANDARD.decode(&env.data).unwrap().len(), 5);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let env = encrypt(b"secret", &random_key(32)).unwrap();
        assert_eq!(
            decrypt(&env, &random_key(32)),
            Err(ProtocolError::DecryptionFailed)
        );
    }

    #[test]
    fn wrong_key_size_is_indistinguishable() {
        let env = encrypt(b"secret", &random_key(32)).unwrap();
        assert_eq!(
            decrypt(&env, &random_key(16)),
            Err(ProtocolError::DecryptionFailed)
        );
        assert_eq!(decrypt(&env, b"short"), Err(ProtocolError::DecryptionFailed));
    }

    #[test]
    fn invalid_key_length_rejected_on_encrypt() {
        assert_eq!(encrypt(b"x", &[0u8; 20]), Err(ProtocolError::EncryptionFailed));
    }

    #[test]
    fn every_bit_flip_in_data_is_detected() {
        let key = random_key(32);
        let env = encrypt(b"tamper me", &key).unwrap();
        let len = STANDARD.decode(&env.data).unwrap().len();
        for byte in 0..len {
            for bit in 0..8 {
                let tampered = Envelope {
                    data: flip_bit(&env.data, byte, bit),
                    ..env.clone()
                };
                assert_eq!(decrypt(&tampered, &key), Err(ProtocolError::DecryptionFailed));
            }
        }
    }

    #[test]
    fn every_bit_flip_in_iv_is_detected() {
        let key = random_key(24);
        let env = encrypt(b"tamper me", &key).unwrap();
        for byte in 0..NONCE_LEN {
            for bit in 0..8 {
                let tampered = Envelope {
                    iv: flip_bit(&env.iv, byte, bit),
                    ..env.clone()
                };
                assert_eq!(decrypt(&tampered, &key), Err(ProtocolError::DecryptionFailed));
            }
        }
    }

    #[test]
    fn every_bit_flip_in_tag_is_detected() {
        let key = random_key(16);
        let env = encrypt(b"tamper me", &key).unwrap();
        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let tampered = Envelope {
                    tag: flip_bit(&env.tag, byte, bit),
                    ..env.clone()
                };
                assert_eq!(decrypt(&tampered, &key), Err(ProtocolError::DecryptionFailed));
            }
        }
    }

    #[test]
    fn short_iv_rejected_before_decryption() {
        let key = random_key(32);
        let env = encrypt(b"x", &key).unwrap();
        let bad = Envelope {
            iv: STANDARD.encode([0u8; 8]),
            ..env
        };
        assert_eq!(decrypt(&bad, &key), Err(ProtocolError::InvalidNonceLength(8)));
    }

    #[test]
    fn truncated_tag_rejected() {
        let key = random_key(32);
        let env = encrypt(b"x", &key).unwrap();
        let raw_tag = STANDARD.decode(&env.tag).unwrap();
        let bad = Envelope {
            tag: STANDARD.encode(&raw_tag[..12]),
            ..env
        };
        assert_eq!(decrypt(&bad, &key), Err(ProtocolError::DecryptionFailed));
    }

    #[test]
    fn bad_base64_is_malformed() {
        let key = random_key(32);
        let env = encrypt(b"x", &key).unwrap();
        let bad = Envelope {
            data: "!!!not base64!!!".into(),
            ..env
        };
        assert!(matches!(
            decrypt(&bad, &key),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn nonces_are_unique() {
        let key = random_key(32);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let env = encrypt(b"same plaintext", &key).unwrap();
            assert!(seen.insert(env.iv), "nonce collision");
        }
    }
}
