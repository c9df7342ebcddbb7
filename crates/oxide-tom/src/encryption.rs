//! Symmetric encryption for secure columns.
//!
//! Values are encrypted with AES in CBC mode and PKCS#7 padding. Every call
//! draws a fresh IV, so the same cleartext never produces the same bytes
//! twice. The stored layout is `[iv length][iv][ciphertext]`.

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::{Result, TomError};

const IV_LEN: u8 = 16;

/// Supported key sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLength {
    Aes128,
    Aes192,
    Aes256,
}

impl KeyLength {
    /// Key size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    const fn from_bytes(len: usize) -> Option<Self> {
        match len {
            16 => Some(Self::Aes128),
            24 => Some(Self::Aes192),
            32 => Some(Self::Aes256),
            _ => None,
        }
    }
}

/// Encrypts and decrypts column values with one fixed key.
#[derive(Clone)]
pub struct Encryptor {
    key: Vec<u8>,
    length: KeyLength,
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl Encryptor {
    /// Creates an encryptor from a 16, 24 or 32 byte key.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        let length = KeyLength::from_bytes(key.len()).ok_or_else(|| {
            TomError::InvalidKey(format!(
                "key must be 16, 24 or 32 bytes, got {}",
                key.len()
            ))
        })?;
        Ok(Self { key, length })
    }

    /// Creates an encryptor from the text form, e.g. `"0 255 17 ..."`.
    pub fn from_key_text(text: &str) -> Result<Self> {
        let key = text
            .split_whitespace()
            .map(|part| {
                part.parse::<u8>()
                    .map_err(|_| TomError::InvalidKey(format!("`{part}` is not a byte value")))
            })
            .collect::<Result<Vec<u8>>>()?;
        Self::new(key)
    }

    /// Generates a random key of the given length.
    pub fn generate_key(length: KeyLength) -> Vec<u8> {
        random_bytes(length.bytes())
    }

    /// Renders a key in the text form accepted by [`Self::from_key_text`].
    pub fn key_text(key: &[u8]) -> String {
        key.iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub const fn key_length(&self) -> KeyLength {
        self.length
    }

    /// Encrypts `plain` under a fresh random IV.
    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let iv = random_bytes(usize::from(IV_LEN));
        let ciphertext = match self.length {
            KeyLength::Aes128 => cbc::Encryptor::<Aes128>::new_from_slices(&self.key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plain)),
            KeyLength::Aes192 => cbc::Encryptor::<Aes192>::new_from_slices(&self.key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plain)),
            KeyLength::Aes256 => cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plain)),
        }
        .map_err(|e| TomError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(1 + iv.len() + ciphertext.len());
        out.push(IV_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts bytes produced by [`Self::encrypt`].
    pub fn decrypt(&self, stored: &[u8]) -> Result<Vec<u8>> {
        let (&iv_len, rest) = stored
            .split_first()
            .ok_or_else(|| TomError::Encryption("ciphertext is empty".into()))?;
        let iv_len = usize::from(iv_len);
        if rest.len() < iv_len {
            return Err(TomError::Encryption(format!(
                "ciphertext shorter than its {iv_len} byte IV"
            )));
        }
        let (iv, ciphertext) = rest.split_at(iv_len);

        let init = |e: aes::cipher::InvalidLength| TomError::Encryption(e.to_string());
        let unpad = |e: aes::cipher::block_padding::UnpadError| TomError::Encryption(e.to_string());
        match self.length {
            KeyLength::Aes128 => cbc::Decryptor::<Aes128>::new_from_slices(&self.key, iv)
                .map_err(init)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(unpad),
            KeyLength::Aes192 => cbc::Decryptor::<Aes192>::new_from_slices(&self.key, iv)
                .map_err(init)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(unpad),
            KeyLength::Aes256 => cbc::Decryptor::<Aes256>::new_from_slices(&self.key, iv)
                .map_err(init)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(unpad),
        }
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngExt;
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(bytes.as_mut_slice());
    bytes
}
