//! Encrypted request envelope handling.
//!
//! A device that completed pre-registration wraps its request bodies as
//! `{"encrypted": <hex>, "token": <session token>}`. Opening the envelope
//! resolves the session's payload key, decrypts, and splices the inner
//! fields over the outer body; from then on handlers see one flat request.
//! When an envelope was opened, every outbound payload of the same call is
//! encrypted with the same key.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{error, warn};

use corral_core::{ApiError, ApiResult};
use corral_crypto::Aes128Ecb;

use crate::storage::{CloudDatabase, Session};

use super::AppState;

/// An opened request body plus the crypto context it arrived with.
pub struct Envelope {
    pub data: Value,
    cipher: Option<Aes128Ecb>,
}

impl Envelope {
    pub fn cipher(&self) -> Option<&Aes128Ecb> {
        self.cipher.as_ref()
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Open a request body, decrypting and splicing when it is an envelope.
pub async fn open(state: &AppState, body: Value) -> ApiResult<Envelope> {
    let mut data = body;
    if !data.is_object() {
        return Err(ApiError::Validation("Wrong data format".to_string()));
    }

    let Some(encrypted) = data.get("encrypted").and_then(Value::as_str).map(str::to_string)
    else {
        return Ok(Envelope { data, cipher: None });
    };

    let token = data
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Auth("Token is missing".to_string()))?;

    let session = state
        .db
        .find_session(token)
        .await?
        .ok_or_else(|| ApiError::Auth("Token not found".to_string()))?;
    let key: u64 = session
        .key
        .as_deref()
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| ApiError::Auth("Session has no payload key".to_string()))?;

    let cipher = Aes128Ecb::new(key, true);
    let plaintext = cipher.decrypt_text(encrypted.as_str())?;
    let inner: Value = serde_json::from_str(&plaintext)?;

    let Some(inner) = inner.as_object() else {
        return Err(ApiError::Validation("Wrong data format".to_string()));
    };
    if let Some(outer) = data.as_object_mut() {
        for (k, v) in inner {
            outer.insert(k.clone(), v.clone());
        }
    }

    Ok(Envelope {
        data,
        cipher: Some(cipher),
    })
}

/// Resolve the envelope's token to an active session.
pub async fn active_session(db: &CloudDatabase, envelope: &Envelope) -> ApiResult<Session> {
    let token = envelope
        .str_field("token")
        .ok_or_else(|| ApiError::Validation("Got an empty token".to_string()))?;
    let session = db
        .find_session(token)
        .await?
        .filter(|s| s.active != 0)
        .ok_or_else(|| ApiError::Auth("Token not found".to_string()))?;
    Ok(session)
}

/// What a device operation hands back for the wire.
pub enum Payload {
    Json(Value),
    /// Opaque text body (assembled source code, artifact files).
    Raw(String),
}

/// Turn an operation result into a response, honoring the call's crypto
/// context. Success bodies carry the payload itself; error bodies carry
/// the public message as a JSON string.
pub fn respond(cipher: Option<&Aes128Ecb>, result: ApiResult<Payload>) -> Response {
    match result {
        Ok(payload) => sealed(cipher, StatusCode::OK, payload),
        Err(err) => fail(cipher, &err),
    }
}

/// Error response in the device wire shape.
pub fn fail(cipher: Option<&Aes128Ecb>, err: &ApiError) -> Response {
    if err.is_server_fault() {
        error!(error = %err, "Server fault while handling device request");
    } else {
        warn!(error = %err, "Rejected device request");
    }
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    sealed(
        cipher,
        status,
        Payload::Json(Value::String(err.public_message().to_string())),
    )
}

fn sealed(cipher: Option<&Aes128Ecb>, status: StatusCode, payload: Payload) -> Response {
    match cipher {
        Some(cipher) => {
            let plaintext = match &payload {
                Payload::Json(value) => value.to_string(),
                Payload::Raw(text) => text.clone(),
            };
            let ciphertext = cipher.encrypt_text(&plaintext);
            (status, [(header::CONTENT_TYPE, "text/plain")], ciphertext).into_response()
        }
        None => match payload {
            Payload::Json(value) => (status, Json(value)).into_response(),
            Payload::Raw(text) => {
                (status, [(header::CONTENT_TYPE, "text/plain")], text).into_response()
            }
        },
    }
}
