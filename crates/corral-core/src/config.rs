//! Runtime configuration for the cloud control plane.
//!
//! Built-in defaults, overridable by environment variables (`CORRAL_*`).
//! Endpoint addressing and key paths come from CLI arguments instead; this
//! covers the protocol knobs the handlers consult per request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Cloud configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Serialized worker-message byte cap on the device-facing endpoint.
    pub device_message_max_bytes: usize,
    /// Serialized worker-message byte cap on the web-facing endpoint.
    ///
    /// Deliberately looser than the device cap; the two limits are distinct
    /// protocol constants and must not be unified.
    pub web_message_max_bytes: usize,
    /// Default per-account message quota for new accounts.
    pub plan_messages_limit: i64,
    /// Default per-account device quota for new accounts.
    pub plan_things_limit: i64,
    /// Root of the on-disk OS/firmware artifact tree
    /// (`{root}/{version}/{platform}/{file}`).
    pub os_dist_root: PathBuf,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            device_message_max_bytes: 512,
            web_message_max_bytes: 1024,
            plan_messages_limit: 100_000,
            plan_things_limit: 5,
            os_dist_root: PathBuf::from("/opt/corral-os-dist"),
        }
    }
}

impl CloudConfig {
    /// Defaults with environment overrides applied.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("CORRAL_DEVICE_MSG_MAX_BYTES")
            && let Ok(n) = val.parse()
        {
            config.device_message_max_bytes = n;
        }
        if let Ok(val) = std::env::var("CORRAL_WEB_MSG_MAX_BYTES")
            && let Ok(n) = val.parse()
        {
            config.web_message_max_bytes = n;
        }
        if let Ok(val) = std::env::var("CORRAL_PLAN_MESSAGES_LIMIT")
            && let Ok(n) = val.parse()
        {
            config.plan_messages_limit = n;
        }
        if let Ok(val) = std::env::var("CORRAL_PLAN_THINGS_LIMIT")
            && let Ok(n) = val.parse()
        {
            config.plan_things_limit = n;
        }
        if let Ok(val) = std::env::var("CORRAL_OS_DIST_ROOT") {
            config.os_dist_root = PathBuf::from(val);
        }
        config
    }
}
