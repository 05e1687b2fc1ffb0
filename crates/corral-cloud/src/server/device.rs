//! Device-facing API handlers.
//!
//! Every POST body may arrive wrapped in an encrypted envelope; handlers
//! work on the opened form and never touch the response encoding directly.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use serde_json::{Value, json};

use corral_core::db::unix_timestamp;
use corral_core::{ApiError, ApiResult};

use crate::code::{self, CodePayload};
use crate::commands;
use crate::messaging;
use crate::registration::{self, RegisterParams, require_active_thing};

use super::AppState;
use super::envelope::{self, Envelope, Payload};

type Body = Result<Json<Value>, JsonRejection>;

async fn opened(state: &AppState, body: Body) -> ApiResult<Envelope> {
    let Json(body) = body.map_err(|_| ApiError::Validation("Wrong data format".to_string()))?;
    envelope::open(state, body).await
}

fn required<'a>(envelope: &'a Envelope, name: &str) -> ApiResult<&'a str> {
    envelope
        .str_field(name)
        .ok_or_else(|| ApiError::Validation(format!("Got an empty \"{name}\"")))
}

/// Devices send flags as JSON bools or as stringified Python bools.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "True" | "true" | "1"),
        _ => false,
    }
}

/// `GET /api/v1/time/epoch_s/` — clock sync at device boot.
pub async fn epoch() -> Json<Value> {
    Json(json!({ "epoch_s": unix_timestamp() }))
}

/// `POST /api/v1/things/preregister/`
pub async fn preregister(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };

    let result = handle_preregister(&state, &envelope).await;
    match result {
        // The response is encrypted with the key recovered in this very
        // call, proving key possession to the device.
        Ok(pre) => envelope::respond(
            Some(&pre.cipher),
            Ok(Payload::Json(json!({ "token": pre.session.token }))),
        ),
        Err(err) => envelope::fail(envelope.cipher(), &err),
    }
}

async fn handle_preregister(
    state: &AppState,
    envelope: &Envelope,
) -> ApiResult<registration::Preregistration> {
    let key = required(envelope, "key")?;
    let kty = required(envelope, "kty")?;
    let ken = required(envelope, "ken")?;
    registration::preregister(&state.db, &state.srsa, key, kty, ken).await
}

/// `POST /api/v1/things/register/`
pub async fn register(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };
    let result = handle_register(&state, &envelope).await;
    envelope::respond(envelope.cipher(), result)
}

async fn handle_register(state: &AppState, envelope: &Envelope) -> ApiResult<Payload> {
    let field = |name: &str| envelope.str_field(name).map(str::to_string);
    let params = RegisterParams {
        tid: field("tid"),
        aid: field("aid"),
        token: field("token"),
        app_version: field("app_version"),
        // Older firmware sends the OS version under its former product name.
        os_version: field("os_version").or_else(|| field("pythings_version")),
        platform: field("platform"),
        capabilities: field("capabilities"),
        frozen: truthy(envelope.data.get("frozen")),
        pool: field("pool"),
    };

    let registration = registration::register(&state.db, params).await?;
    Ok(Payload::Json(json!({
        "token": registration.session.token,
        "epoch": registration.epoch,
    })))
}

/// `POST /api/v1/things/report/`
pub async fn report(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };
    let result = handle_report(&state, &envelope).await;
    envelope::respond(envelope.cipher(), result)
}

async fn handle_report(state: &AppState, envelope: &Envelope) -> ApiResult<Payload> {
    let session = envelope::active_session(&state.db, envelope).await?;
    let what = required(envelope, "what")?;
    let status = required(envelope, "status")?;
    let msg = envelope.data.get("msg");

    messaging::report_status(&state.db, &session, what, status, msg).await?;
    Ok(Payload::Json(json!({})))
}

/// `POST /api/v1/apps/worker/`
pub async fn drop_worker_message(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };
    let result = handle_drop_worker_message(&state, &envelope).await;
    envelope::respond(envelope.cipher(), result)
}

async fn handle_drop_worker_message(state: &AppState, envelope: &Envelope) -> ApiResult<Payload> {
    let session = envelope::active_session(&state.db, envelope).await?;
    let msg = envelope
        .data
        .get("msg")
        .filter(|m| !m.is_null())
        .ok_or_else(|| ApiError::Validation("Got an empty \"msg\"".to_string()))?;
    let ts = envelope.data.get("ts").filter(|t| !t.is_null());

    messaging::drop_worker_message(&state.db, &state.config, &session, msg, ts).await?;
    Ok(Payload::Json(json!({})))
}

/// `POST /api/v1/apps/management/`
pub async fn poll_management(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };
    let result = handle_poll_management(&state, &envelope).await;
    envelope::respond(envelope.cipher(), result)
}

async fn handle_poll_management(state: &AppState, envelope: &Envelope) -> ApiResult<Payload> {
    let session = envelope::active_session(&state.db, envelope).await?;
    let status = envelope.data.get("status").filter(|s| !s.is_null());

    let response = commands::poll_management(&state.db, &session, status).await?;
    Ok(Payload::Json(response))
}

/// `POST /api/v1/apps/get/` — App code download.
pub async fn get_app_code(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };
    let result = handle_get_app_code(&state, &envelope).await;
    envelope::respond(envelope.cipher(), result)
}

async fn handle_get_app_code(state: &AppState, envelope: &Envelope) -> ApiResult<Payload> {
    let session = envelope::active_session(&state.db, envelope).await?;
    let (_, app) = require_active_thing(&state.db, &session).await?;
    let version = required(envelope, "version")?;
    let list = truthy(envelope.data.get("list"));
    let file_name = envelope.str_field("file_name");

    match code::get_commit(&state.db, &app, version, list, file_name).await? {
        CodePayload::FileList(names) => Ok(Payload::Json(json!(names))),
        CodePayload::Source(source) => Ok(Payload::Raw(source)),
    }
}

/// `POST /api/v1/os/get/` — OS/firmware artifact download.
pub async fn get_os_code(State(state): State<AppState>, body: Body) -> Response {
    let envelope = match opened(&state, body).await {
        Ok(envelope) => envelope,
        Err(err) => return envelope::fail(None, &err),
    };
    let result = handle_get_os_code(&state, &envelope).await;
    envelope::respond(envelope.cipher(), result)
}

async fn handle_get_os_code(state: &AppState, envelope: &Envelope) -> ApiResult<Payload> {
    let _session = envelope::active_session(&state.db, envelope).await?;
    let version = required(envelope, "version")?;
    let platform = required(envelope, "platform")?;

    if truthy(envelope.data.get("list")) {
        let files = state.artifacts.list(version, platform).await?;
        return Ok(Payload::Json(json!(files)));
    }

    let file_name = required(envelope, "file_name")?;
    let content = state.artifacts.file(version, platform, file_name).await?;
    Ok(Payload::Raw(content))
}
