//! Pull-based management command delivery.
//!
//! Devices cannot be pushed to; a poll hands out at most one queued
//! command, and the device closes the loop later with a status report
//! carrying the command's mid.

use corral_core::{ApiError, ApiResult};
use serde_json::{Value, json};
use tracing::debug;

use crate::health::Health;
use crate::registration::require_active_thing;
use crate::storage::{CloudDatabase, Session, command_kind};

/// Handle a management poll: refresh contact bookkeeping, return effective
/// settings, and opportunistically deliver one queued command.
pub async fn poll_management(
    db: &CloudDatabase,
    session: &Session,
    status: Option<&Value>,
) -> ApiResult<Value> {
    let (thing, _) = require_active_thing(db, session).await?;
    db.touch_session(&session.token).await?;

    if let Some(status) = status {
        db.set_session_heartbeat_status(&session.token, &serde_json::to_string(status)?)
            .await?;
    }

    let (settings, pool) = db.effective_settings(&thing).await?;
    let mut response = json!({
        "settings": settings.to_wire(),
        "pool": pool.name,
    });

    // Never hand work to a Thing that has not confirmed a healthy boot.
    if Health::from_status(&session.last_os_status).is_ok()
        && let Some(message) = db.claim_next_queued_message(&thing.tid).await?
    {
        debug!(tid = %thing.tid, mid = %message.uuid, "Delivering management message");
        response["msg"] = Value::String(message.data);
        response["mid"] = Value::String(message.uuid);
        response["type"] = Value::String(message.kind);
    }

    Ok(response)
}

/// Queue a command for a Thing on behalf of its account owner.
///
/// Fire-and-forget: the uuid is returned immediately, delivery and the
/// reply arrive through polling.
pub async fn enqueue_command(
    db: &CloudDatabase,
    account_id: &str,
    tid: &str,
    payload: &str,
    kind: &str,
) -> ApiResult<String> {
    if kind != command_kind::APP && kind != command_kind::CMD {
        return Err(ApiError::Validation(format!(
            "Unknown message type \"{kind}\""
        )));
    }

    let thing = db
        .find_thing_in_account(account_id, tid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Thing \"{tid}\"")))?;
    let app = db.get_app(&thing.app_id).await?;

    let uuid = db
        .enqueue_management_message(&app.aid, &thing.tid, payload, kind, Some(&thing.id))
        .await?;
    Ok(uuid)
}
