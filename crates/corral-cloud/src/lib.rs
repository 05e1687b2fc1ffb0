//! Corral Cloud Server Library
//!
//! Device-facing control plane for an IoT fleet:
//! - SQLite storage for accounts, apps, pools, things, sessions, and messages
//! - Encrypted request envelopes bootstrapped by an asymmetric key handshake
//! - Idempotent device registration with per-account quotas
//! - Worker message ingestion with atomic per-account counters
//! - Pull-based management command delivery
//! - Application code and OS artifact downloads

pub mod artifacts;
pub mod code;
pub mod commands;
pub mod health;
pub mod messaging;
pub mod registration;
pub mod server;
pub mod storage;
