//! Corral device-channel encryption library.
//!
//! Devices bootstrap an encrypted session in two steps:
//!
//! - **Bootstrap**: the device picks a numeric session key, encrypts it with
//!   the server's public exponent (integer RSA, wire tag `srsa1`) and submits
//!   it once at pre-registration. The server recovers the key with its
//!   private exponent.
//! - **Payload**: every subsequent request/response body is encrypted with
//!   AES-128-ECB keyed by that numeric session key.
//!
//! Asymmetric crypto runs exactly once per session because the devices are
//! resource-constrained; the symmetric cipher carries the hot path.

pub mod aes_ecb;
pub mod error;
pub mod srsa;

pub use aes_ecb::Aes128Ecb;
pub use error::CryptoError;
pub use srsa::{Srsa, extract_numeric_key};
