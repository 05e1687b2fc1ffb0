//! API error taxonomy.
//!
//! Domain errors are raised next to the violated precondition and caught
//! once at the dispatch boundary, where they turn into an HTTP status and a
//! public message. Nothing below the dispatcher writes to the response.

use corral_crypto::CryptoError;

/// Message sent to devices in place of any internal error detail.
pub const MASKED_ERROR: &str =
    "It seems like we are experiencing a problem, please try again later.";

/// Result alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by API operations.
///
/// Quota and consistency errors map to 401 rather than 429/500 by protocol
/// compatibility: deployed devices treat 401-class responses as "back off
/// and retry registration", which is the intended reaction to both.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input (400).
    #[error("{0}")]
    Validation(String),

    /// Missing/invalid/unknown token or credentials (401).
    #[error("{0}")]
    Auth(String),

    /// Plan limit hit (401 by wire compatibility, never 429).
    #[error("{0}")]
    QuotaExceeded(String),

    /// Identity claim clashes with existing state, e.g. a device
    /// registering under a different App than the one it belongs to (401).
    #[error("{0}")]
    Conflict(String),

    /// Unknown commit/app/thing (404).
    #[error("{0}")]
    NotFound(String),

    /// Internal invariant violated, e.g. a Thing with no App (401 surfaced,
    /// logged as a server-side anomaly).
    #[error("{0}")]
    Consistency(String),

    /// Bad ciphertext (400).
    #[error("{0}")]
    Decryption(String),

    /// Unclassified fault (500); the public message is masked and the
    /// detail only reaches the server log.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error class.
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Decryption(_) => 400,
            Self::Auth(_) | Self::QuotaExceeded(_) | Self::Conflict(_) | Self::Consistency(_) => {
                401
            }
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to put on the wire.
    pub fn public_message(&self) -> &str {
        match self {
            Self::Internal(_) => MASKED_ERROR,
            Self::Validation(msg)
            | Self::Auth(msg)
            | Self::QuotaExceeded(msg)
            | Self::Conflict(msg)
            | Self::NotFound(msg)
            | Self::Consistency(msg)
            | Self::Decryption(msg) => msg,
        }
    }

    /// Whether the full detail belongs in the server log as an anomaly.
    pub const fn is_server_fault(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Consistency(_))
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        Self::Decryption(format!("{e}"))
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(e: crate::db::DatabaseError) -> Self {
        match e {
            crate::db::DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(format!("{other}")),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(format!("bad JSON payload: {e}"))
    }
}
