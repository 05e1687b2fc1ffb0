//! Data models for Corral cloud storage.
//!
//! Booleans are stored as SQLite integers; the wire layer converts where a
//! JSON bool is expected.

use serde::{Deserialize, Serialize};

/// Management message lifecycle states.
pub mod command_status {
    pub const QUEUED: &str = "Queued";
    pub const DELIVERED: &str = "Delivered";
    pub const RECEIVED: &str = "Received";
}

/// Management message kinds.
pub mod command_kind {
    /// Queued through the App and delivered opportunistically.
    pub const APP: &str = "APP";
    /// Ad-hoc remote-shell style command bound directly to a Thing.
    pub const CMD: &str = "CMD";
}

/// Reserved AID of the per-account unbound pseudo-App.
pub const UNBOUND_AID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    pub apikey: String,
    pub plan: String,
    pub plan_messages_limit: i64,
    pub plan_things_limit: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct App {
    pub id: String,
    pub aid: String,
    pub name: String,
    pub account_id: String,
    pub default_pool_id: Option<String>,
    pub hidden: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settings {
    pub id: String,
    pub os_version: String,
    pub backend: Option<String>,
    pub app_version: String,
    pub app_tag: Option<String>,
    pub management_interval: String,
    pub worker_interval: String,
    pub ssl: i64,
    pub payload_encryption: i64,
    pub battery_operated: i64,
    pub setup_timeout: i64,
    pub edited: i64,
}

impl Settings {
    /// Wire form sent to devices on every management poll.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut wire = serde_json::json!({
            "os_version": self.os_version,
            "app_version": self.app_version,
            "management_interval": self.management_interval,
            "worker_interval": self.worker_interval,
            "battery_operated": self.battery_operated != 0,
            "setup_timeout": self.setup_timeout,
            "ssl": self.ssl != 0,
            "payload_encryption": self.payload_encryption != 0,
        });
        if let Some(backend) = &self.backend {
            wire["backend"] = serde_json::Value::String(backend.clone());
        }
        wire
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pool {
    pub id: String,
    pub app_id: String,
    pub name: String,
    pub settings_id: String,
    pub use_latest_os_version: i64,
    pub use_latest_app_version: i64,
    pub development: i64,
    pub staging: i64,
    pub production: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thing {
    pub id: String,
    pub tid: String,
    pub name: Option<String>,
    pub app_id: String,
    pub pool_id: String,
    pub settings_id: Option<String>,
    pub use_custom_settings: i64,
    pub frozen_os: i64,
    pub platform: Option<String>,
    pub capabilities: Option<String>,
    pub app_set_via: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub token: String,
    pub thing_id: Option<String>,
    pub started: i64,
    pub active: i64,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub last_contact: i64,
    pub last_os_status: String,
    pub last_worker_status: String,
    pub last_management_status: String,
    pub last_heartbeat_status: Option<String>,
    pub pool_id: Option<String>,
    pub key: Option<String>,
    pub kty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerMessage {
    pub id: i64,
    pub aid: String,
    pub tid: String,
    pub ts: f64,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ManagementMessage {
    pub id: i64,
    pub aid: String,
    pub tid: String,
    pub ts: f64,
    pub uuid: String,
    pub status: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub thing_id: Option<String>,
    pub data: String,
    pub reply: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageCounter {
    pub account_id: String,
    pub total: i64,
    pub worker: i64,
    pub management: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceFile {
    pub id: i64,
    pub app_id: String,
    pub name: String,
    pub path: String,
    pub content: String,
    pub ts: i64,
    pub committed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Commit {
    pub id: i64,
    pub app_id: String,
    pub cid: String,
    pub ts: i64,
    pub tag: Option<String>,
    pub valid: i64,
}
