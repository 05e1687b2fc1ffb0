//! Worker message ingestion and device status reporting.

use corral_core::db::unix_timestamp_f;
use corral_core::{ApiError, ApiResult, CloudConfig};
use serde_json::Value;
use tracing::{debug, warn};

use crate::registration::require_active_thing;
use crate::storage::{Account, App, CloudDatabase, Session, Thing};

/// Status routing tags accepted by `report_status`.
pub mod report_target {
    pub const WORKER: &str = "worker";
    pub const MANAGEMENT: &str = "management";
    pub const OS: &str = "os";
    /// Former product name, still sent as the OS tag by older firmware.
    pub const OS_LEGACY: &str = "pythings";
}

/// Store a worker message against the Thing behind an active session.
pub async fn drop_worker_message(
    db: &CloudDatabase,
    config: &CloudConfig,
    session: &Session,
    msg: &Value,
    ts: Option<&Value>,
) -> ApiResult<()> {
    let (thing, app) = require_active_thing(db, session).await?;
    let account = db.get_account(&app.account_id).await?;
    ingest_worker_message(
        db,
        &account,
        &app,
        &thing,
        msg,
        ts,
        config.device_message_max_bytes,
    )
    .await
}

/// Store a worker message on behalf of an account owner, addressed by tid.
///
/// Same quota and storage path as the device drop, but with the larger
/// operator-side size cap.
pub async fn drop_worker_message_for_thing(
    db: &CloudDatabase,
    config: &CloudConfig,
    account: &Account,
    tid: &str,
    msg: &Value,
    ts: Option<&Value>,
) -> ApiResult<()> {
    let thing = db
        .find_thing_in_account(&account.id, tid)
        .await?
        .ok_or_else(|| {
            ApiError::Validation("Not existent Thing or no access rights".to_string())
        })?;
    let app = db.get_app(&thing.app_id).await?;
    ingest_worker_message(db, account, &app, &thing, msg, ts, config.web_message_max_bytes).await
}

async fn ingest_worker_message(
    db: &CloudDatabase,
    account: &Account,
    app: &App,
    thing: &Thing,
    msg: &Value,
    ts: Option<&Value>,
    max_bytes: usize,
) -> ApiResult<()> {
    let counter = db.get_message_counter(&account.id).await?;
    if counter.total >= account.plan_messages_limit {
        return Err(ApiError::QuotaExceeded(
            "Plan limit for messages reached".to_string(),
        ));
    }

    // Messages are stored in their serialized form; a bare string stays a
    // string, a dict stays a dict.
    let serialized = serde_json::to_string(msg)?;
    if serialized.len() > max_bytes {
        return Err(ApiError::Validation(format!(
            "Message too long (max {max_bytes} bytes)"
        )));
    }

    let ts = match ts {
        Some(value) => parse_epoch(value)?,
        None => unix_timestamp_f(),
    };

    let stored = db
        .store_worker_message(&account.id, &app.aid, &thing.tid, ts, &serialized)
        .await?;
    if !stored {
        debug!(tid = %thing.tid, ts, "Duplicate worker message ignored");
    }
    Ok(())
}

/// Route a device status report to the session field it belongs to.
///
/// A bare status replaces the stored value; a status with a detail message
/// appends `": "+msg`. A management report carrying a `mid` is a reply to a
/// previously delivered command and closes its loop instead.
pub async fn report_status(
    db: &CloudDatabase,
    session: &Session,
    what: &str,
    status: &str,
    msg: Option<&Value>,
) -> ApiResult<()> {
    let (thing, app) = require_active_thing(db, session).await?;
    db.touch_session(&session.token).await?;

    match what {
        report_target::OS | report_target::OS_LEGACY => {
            db.set_session_os_status(&session.token, &composed_status(status, msg))
                .await?;
        }
        report_target::WORKER => {
            db.set_session_worker_status(&session.token, &composed_status(status, msg))
                .await?;
        }
        report_target::MANAGEMENT => {
            if let Some(mid) = msg.and_then(|m| m.get("mid")).and_then(Value::as_str) {
                // The bare verdict still lands on the session before the
                // command loop is closed.
                db.set_session_management_status(&session.token, status)
                    .await?;
                let reply = msg
                    .and_then(|m| m.get("rep"))
                    .map(|rep| rep.as_str().map_or_else(|| rep.to_string(), str::to_string));
                match db.find_management_message(&thing.tid, mid).await? {
                    Some(message) => {
                        db.mark_message_received(message.id, reply.as_deref()).await?;
                        db.count_management_message(&app.account_id).await?;
                    }
                    None => {
                        warn!(tid = %thing.tid, mid, "Reply to unknown management message");
                    }
                }
            } else {
                db.set_session_management_status(&session.token, &composed_status(status, msg))
                    .await?;
            }
        }
        other => {
            return Err(ApiError::Validation(format!(
                "Unknown status target \"{other}\""
            )));
        }
    }
    Ok(())
}

fn composed_status(status: &str, msg: Option<&Value>) -> String {
    match msg {
        Some(msg) => format!("{status}: {}", text_of(msg)),
        None => status.to_string(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_epoch(value: &Value) -> ApiResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|ts| ts.is_finite())
        .ok_or_else(|| ApiError::Validation("Invalid timestamp".to_string()))
}
