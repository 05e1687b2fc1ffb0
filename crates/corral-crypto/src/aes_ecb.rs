//! AES-128-ECB payload cipher.
//!
//! Keyed by the numeric session key recovered during bootstrap and applied
//! to every encrypted request/response body. ECB is deterministic by
//! construction, which is what the device protocol relies on: the same
//! session never re-keys, and payloads carry no nonce.
//!
//! Padding follows the device convention: in compaction mode (`comp_mode`,
//! the wire default) the plaintext is padded with trailing spaces to the
//! block boundary and trimmed after decrypt; otherwise PKCS#7 is used.
//! Ciphertext travels as lowercase hex.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::CryptoError;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Symmetric payload cipher for one device session.
pub struct Aes128Ecb {
    cipher: Aes128,
    comp_mode: bool,
}

impl Aes128Ecb {
    /// Build a cipher from the numeric session key.
    ///
    /// The key integer is encoded big-endian into the low 8 bytes of the
    /// 16-byte AES key; the high 8 bytes are zero.
    pub fn new(key: u64, comp_mode: bool) -> Self {
        let mut key_bytes = [0u8; BLOCK_SIZE];
        key_bytes[8..].copy_from_slice(&key.to_be_bytes());
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&key_bytes)),
            comp_mode,
        }
    }

    /// Encrypt plaintext into a lowercase hex ciphertext string.
    pub fn encrypt_text(&self, plaintext: &str) -> String {
        let mut data = plaintext.as_bytes().to_vec();
        if self.comp_mode {
            // Space padding only up to the boundary; aligned input gets none.
            while data.len() % BLOCK_SIZE != 0 {
                data.push(b' ');
            }
        } else {
            let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
            #[allow(clippy::cast_possible_truncation)]
            data.extend(std::iter::repeat_n(pad as u8, pad));
        }
        for block in data.chunks_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block(GenericArray::from_mut_slice(block));
        }
        hex::encode(data)
    }

    /// Decrypt a hex ciphertext string back into plaintext.
    pub fn decrypt_text(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let mut data = hex::decode(ciphertext.trim())
            .map_err(|e| CryptoError::DecryptionFailed(format!("bad hex: {e}")))?;
        if data.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::DecryptionFailed(format!(
                "ciphertext length {} is not a multiple of the block size",
                data.len()
            )));
        }
        for block in data.chunks_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block(GenericArray::from_mut_slice(block));
        }
        if self.comp_mode {
            while data.last() == Some(&b' ') {
                data.pop();
            }
        } else {
            if data.is_empty() {
                return Err(CryptoError::DecryptionFailed("bad padding".into()));
            }
            let pad = usize::from(*data.last().unwrap_or(&0));
            if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
                return Err(CryptoError::DecryptionFailed("bad padding".into()));
            }
            if !data[data.len() - pad..].iter().all(|&b| usize::from(b) == pad) {
                return Err(CryptoError::DecryptionFailed("bad padding".into()));
            }
            data.truncate(data.len() - pad);
        }
        String::from_utf8(data)
            .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".into()))
    }
}
