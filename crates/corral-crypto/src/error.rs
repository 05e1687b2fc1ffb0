//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key file {path}: {reason}")]
    InvalidKeyFile { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
