//! Integer-RSA bootstrap primitive (wire tag `srsa1`).
//!
//! Textbook RSA over a fixed 64-bit modulus, used exactly once per session
//! to recover the device-chosen symmetric key. The public and private
//! exponents are loaded from a pair of key files at process start; each
//! file holds a single decimal integer.
//!
//! Wire format: `-`-separated decimal residues. Each plaintext chunk is at
//! most [`CHUNK_BYTES`] bytes, prefixed with a `0x01` marker byte before
//! exponentiation so that leading zeros and short tail chunks survive the
//! integer round-trip.

use std::path::Path;

use crate::error::CryptoError;

/// Fixed srsa1 modulus (product of two 31-bit primes).
///
/// Shared by every deployment; secrecy lives in the private exponent only.
pub const MODULUS: u64 = 3_754_025_729_259_552_269;

/// Plaintext bytes carried per residue.
pub const CHUNK_BYTES: usize = 3;

const CHUNK_MARKER: u8 = 0x01;

/// Integer-RSA engine holding the exponent pair.
pub struct Srsa {
    pubkey: u64,
    privkey: u64,
}

impl Srsa {
    pub const fn new(pubkey: u64, privkey: u64) -> Self {
        Self { pubkey, privkey }
    }

    /// Load the exponent pair from a key file pair.
    ///
    /// Each file holds one decimal integer, optionally surrounded by
    /// whitespace.
    pub fn from_key_files(pubkey_path: &Path, privkey_path: &Path) -> Result<Self, CryptoError> {
        Ok(Self {
            pubkey: read_exponent(pubkey_path)?,
            privkey: read_exponent(privkey_path)?,
        })
    }

    /// Encrypt text with the public exponent.
    ///
    /// Only used by tests and tooling; devices carry their own encryptor.
    pub fn encrypt_text(&self, plaintext: &str) -> String {
        let mut residues = Vec::new();
        for chunk in plaintext.as_bytes().chunks(CHUNK_BYTES) {
            let mut m = u64::from(CHUNK_MARKER);
            for &byte in chunk {
                m = (m << 8) | u64::from(byte);
            }
            residues.push(mod_pow(m, self.pubkey, MODULUS).to_string());
        }
        residues.join("-")
    }

    /// Decrypt a `-`-separated residue string with the private exponent.
    pub fn decrypt_text(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let mut plaintext = Vec::new();
        for part in ciphertext.split('-') {
            let residue: u64 = part
                .trim()
                .parse()
                .map_err(|_| CryptoError::DecryptionFailed(format!("bad residue '{part}'")))?;
            if residue >= MODULUS {
                return Err(CryptoError::DecryptionFailed(format!(
                    "residue out of range ({residue})"
                )));
            }
            let m = mod_pow(residue, self.privkey, MODULUS);
            plaintext.extend_from_slice(&unpack_chunk(m)?);
        }
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".into()))
    }
}

/// Strip the marker byte and return the chunk payload.
fn unpack_chunk(m: u64) -> Result<Vec<u8>, CryptoError> {
    if m == 0 {
        return Err(CryptoError::DecryptionFailed("empty chunk".into()));
    }
    let bytes = m.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    if bytes[start] != CHUNK_MARKER || bytes.len() - start > CHUNK_BYTES + 1 {
        return Err(CryptoError::DecryptionFailed("bad chunk marker".into()));
    }
    Ok(bytes[start + 1..].to_vec())
}

/// Extract the session key from decrypted plaintext.
///
/// Devices pad the key with incidental whitespace and control characters on
/// the wire; the first maximal run of ASCII digits is the key. This tolerant
/// parsing is a documented policy, not an error path. No digits at all is a
/// decryption failure.
pub fn extract_numeric_key(plaintext: &str) -> Result<u64, CryptoError> {
    let digits: String = plaintext
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Err(CryptoError::DecryptionFailed(
            "no numeric key in plaintext".into(),
        ));
    }
    digits
        .parse()
        .map_err(|_| CryptoError::DecryptionFailed("numeric key out of range".into()))
}

fn read_exponent(path: &Path) -> Result<u64, CryptoError> {
    let content = std::fs::read_to_string(path)?;
    content
        .trim()
        .parse()
        .map_err(|e| CryptoError::InvalidKeyFile {
            path: path.display().to_string(),
            reason: format!("{e}"),
        })
}

/// Modular exponentiation with 128-bit intermediates.
///
/// `MODULUS` is below 2^62 so the squaring step cannot overflow u128.
fn mod_pow(base: u64, mut exp: u64, modulus: u64) -> u64 {
    let m = u128::from(modulus);
    let mut result: u128 = 1;
    let mut b = u128::from(base % modulus);
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        exp >>= 1;
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        result as u64
    }
}
