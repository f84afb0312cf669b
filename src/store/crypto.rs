//! Passphrase envelope for staging files
//!
//! Layout: `MAGIC (8) | version (1) | salt (16) | nonce (12) | ciphertext`.
//! The key is derived from the passphrase with Argon2id; the payload is sealed
//! with ChaCha20-Poly1305 using the header as associated data. A file without
//! the magic prefix is plain JSON.

use crate::error::{StageError, StageResult};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

const MAGIC: &[u8; 8] = b"PSTGENC\x00";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;

/// User-supplied passphrase; wiped from memory on drop
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into()))
    }

    /// `None` for an empty string, so an unset environment variable and an
    /// empty one behave the same
    pub fn from_optional(passphrase: Option<String>) -> Option<Self> {
        passphrase.filter(|p| !p.is_empty()).map(Self::new)
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

pub fn encrypt(plaintext: &[u8], passphrase: &Passphrase) -> StageResult<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + 16);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);

    let key = derive_key(passphrase, &salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &out[..HEADER_LEN],
            },
        )
        .map_err(|_| StageError::Encryption("cipher failure".to_string()))?;

    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open an envelope; any authentication failure is `DecryptionFailed`
pub fn decrypt(data: &[u8], passphrase: &Passphrase) -> StageResult<Vec<u8>> {
    if data.len() < HEADER_LEN || !is_encrypted(data) || data[MAGIC.len()] != VERSION {
        return Err(StageError::DecryptionFailed);
    }

    let salt_start = MAGIC.len() + 1;
    let salt = &data[salt_start..salt_start + SALT_LEN];
    let nonce = &data[salt_start + SALT_LEN..HEADER_LEN];

    let key = derive_key(passphrase, salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: &data[HEADER_LEN..],
                aad: &data[..HEADER_LEN],
            },
        )
        .map_err(|_| StageError::DecryptionFailed)
}

fn derive_key(passphrase: &Passphrase, salt: &[u8]) -> StageResult<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| StageError::Encryption(format!("key derivation failed: {}", e)))?;
    Ok(key)
}
