//! HTTP surface: device-facing control plane and operator web API.

pub mod device;
pub mod envelope;
pub mod web;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use corral_core::CloudConfig;
use corral_crypto::Srsa;

use crate::artifacts::OsArtifacts;
use crate::storage::CloudDatabase;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: CloudDatabase,
    pub srsa: Arc<Srsa>,
    pub config: Arc<CloudConfig>,
    pub artifacts: Arc<OsArtifacts>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Device-facing control plane
        .route("/api/v1/time/epoch_s/", get(device::epoch))
        .route("/api/v1/things/preregister/", post(device::preregister))
        .route("/api/v1/things/register/", post(device::register))
        .route("/api/v1/things/report/", post(device::report))
        .route("/api/v1/apps/worker/", post(device::drop_worker_message))
        .route("/api/v1/apps/management/", post(device::poll_management))
        .route("/api/v1/apps/get/", post(device::get_app_code))
        .route("/api/v1/os/get/", post(device::get_os_code))
        // Operator web API
        .route("/api/web/v1/msg/management/new/", post(web::management_new))
        .route("/api/web/v1/msg/management/get/", post(web::management_get))
        .route("/api/web/v1/msg/worker/new/", post(web::worker_new))
        .route("/api/web/v1/msg/worker/get/", post(web::worker_get))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
