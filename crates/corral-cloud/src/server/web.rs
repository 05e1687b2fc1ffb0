//! Operator web API: queue commands for devices and read messages back.
//!
//! Authenticated by account API key; errors use the `{"detail": ...}`
//! shape, unlike the device surface.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{error, warn};

use corral_core::{ApiError, ApiResult};

use crate::commands;
use crate::messaging;
use crate::storage::{Account, command_kind};

use super::AppState;

type Body = Result<Json<Value>, JsonRejection>;

fn into_response(result: ApiResult<Value>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(err) => {
            if err.is_server_fault() {
                error!(error = %err, "Server fault while handling web request");
            } else {
                warn!(error = %err, "Rejected web request");
            }
            let status =
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "detail": err.public_message() }))).into_response()
        }
    }
}

fn parse_body(body: Body) -> ApiResult<Value> {
    let Json(body) = body.map_err(|_| ApiError::Validation("Wrong data format".to_string()))?;
    if !body.is_object() {
        return Err(ApiError::Validation("Wrong data format".to_string()));
    }
    Ok(body)
}

fn str_field<'a>(data: &'a Value, name: &str) -> ApiResult<&'a str> {
    data.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("Got empty \"{name}\"")))
}

/// Web clients send flags as JSON bools or stringified Python bools.
fn flag(data: &Value, name: &str) -> bool {
    match data.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "True" | "true" | "1"),
        _ => false,
    }
}

async fn authenticate(state: &AppState, data: &Value) -> ApiResult<Account> {
    let apikey = data
        .get("apikey")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ApiError::Auth("This is a private API. Provide an apikey".to_string())
        })?;
    state
        .db
        .find_account_by_apikey(apikey)
        .await?
        .ok_or_else(|| ApiError::Auth("Wrong API key".to_string()))
}

/// `POST /api/web/v1/msg/management/new/`
pub async fn management_new(State(state): State<AppState>, body: Body) -> Response {
    into_response(handle_management_new(&state, body).await)
}

async fn handle_management_new(state: &AppState, body: Body) -> ApiResult<Value> {
    let data = parse_body(body)?;
    let account = authenticate(state, &data).await?;

    let tid = str_field(&data, "tid")?;
    let msg = str_field(&data, "msg")?;
    let kind = if flag(&data, "cmd") {
        command_kind::CMD
    } else {
        command_kind::APP
    };

    if msg.len() > state.config.web_message_max_bytes {
        return Err(ApiError::Validation(format!(
            "Message too long (max {} bytes)",
            state.config.web_message_max_bytes
        )));
    }

    let mid = commands::enqueue_command(&state.db, &account.id, tid, msg, kind).await?;
    Ok(json!({ "mid": mid }))
}

/// `POST /api/web/v1/msg/management/get/`
pub async fn management_get(State(state): State<AppState>, body: Body) -> Response {
    into_response(handle_management_get(&state, body).await)
}

async fn handle_management_get(state: &AppState, body: Body) -> ApiResult<Value> {
    let data = parse_body(body)?;
    let account = authenticate(state, &data).await?;
    let mid = str_field(&data, "mid")?;

    let denied =
        || ApiError::Validation("Not existent Message or no access rights".to_string());

    let message = state
        .db
        .find_management_message_by_uuid(mid)
        .await?
        .ok_or_else(denied)?;
    let app = state
        .db
        .find_app_by_aid(&message.aid)
        .await?
        .ok_or_else(denied)?;
    if app.account_id != account.id {
        return Err(denied());
    }

    Ok(json!({ "status": message.status, "reply": message.reply }))
}

/// `POST /api/web/v1/msg/worker/new/`
pub async fn worker_new(State(state): State<AppState>, body: Body) -> Response {
    into_response(handle_worker_new(&state, body).await)
}

async fn handle_worker_new(state: &AppState, body: Body) -> ApiResult<Value> {
    let data = parse_body(body)?;
    let account = authenticate(state, &data).await?;
    let tid = str_field(&data, "tid")?;
    let msg = data
        .get("msg")
        .filter(|m| !m.is_null())
        .ok_or_else(|| ApiError::Validation("Got empty \"msg\"".to_string()))?;
    let ts = data.get("ts").filter(|t| !t.is_null());

    messaging::drop_worker_message_for_thing(&state.db, &state.config, &account, tid, msg, ts)
        .await?;
    Ok(json!({}))
}

/// `POST /api/web/v1/msg/worker/get/`
pub async fn worker_get(State(state): State<AppState>, body: Body) -> Response {
    into_response(handle_worker_get(&state, body).await)
}

async fn handle_worker_get(state: &AppState, body: Body) -> ApiResult<Value> {
    let data = parse_body(body)?;
    let account = authenticate(state, &data).await?;

    let from_ts = epoch_field(&data, "from")
        .ok_or_else(|| ApiError::Validation("No from set".to_string()))?;
    let to_ts = epoch_field(&data, "to")
        .ok_or_else(|| ApiError::Validation("No to set".to_string()))?;
    let tid = str_field(&data, "tid")?;

    let thing = state
        .db
        .find_thing_in_account(&account.id, tid)
        .await?
        .ok_or_else(|| {
            ApiError::Validation("Not existent Thing or no access rights".to_string())
        })?;
    let app = state.db.get_app(&thing.app_id).await?;

    let messages = state
        .db
        .get_worker_messages(&app.aid, &thing.tid, from_ts, to_ts)
        .await?;
    let messages: Vec<Value> = messages
        .into_iter()
        .map(|m| json!({ "ts": m.ts, "data": m.data }))
        .collect();
    Ok(json!(messages))
}

fn epoch_field(data: &Value, name: &str) -> Option<f64> {
    match data.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|ts| ts.is_finite())
}
