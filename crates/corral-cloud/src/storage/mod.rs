//! SQLite-backed storage for the cloud server.

mod db;
mod models;
mod queries_code;
mod queries_commands;
mod queries_identity;
mod queries_messages;
mod queries_sessions;


pub use db::CloudDatabase;
pub use models::{
    Account, App, Commit, ManagementMessage, MessageCounter, Pool, Session, Settings, SourceFile,
    Thing, UNBOUND_AID, WorkerMessage, command_kind, command_status,
};
pub use queries_identity::CreateAppParams;
