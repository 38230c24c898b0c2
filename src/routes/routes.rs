//! Defines routes for the file proxy.
//!
//! ## Structure
//! - `GET  /healthz`, `GET /readyz` — liveness and readiness
//! - `HEAD /files/{*path}` — existence and size probe
//! - `GET  /files/{*path}` — full or ranged download
//! - `GET  /data_registry` — IGV entry point, one menu URL per experiment
//! - `GET  /xml/{name}` — menu of one experiment
//!
//! The wildcard `*path` keeps nested keys like `runs/2024/sample.bam` whole.

use crate::{
    handlers::{
        file_handlers::{get_file, head_file},
        health_handlers::{healthz, readyz},
        menu_handlers::{data_registry, experiment_menu},
    },
    services::proxy_service::ProxyService,
};
use axum::{Router, routing::get};

/// Build and return the router.
///
/// The router carries shared state (`ProxyService`) to all handlers.
pub fn routes() -> Router<ProxyService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files/{*path}", get(get_file).head(head_file))
        .route("/data_registry", get(data_registry))
        .route("/xml/{name}", get(experiment_menu))
}
