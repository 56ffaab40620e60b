//! `GET /_gatehouse/health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, build revision, uptime, node state, config source metadata,
//! deployed API and acceptor counts, and cumulative request statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build: BuildInfo,
    pub uptime_seconds: u64,
    pub node: String,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct BuildInfo {
    pub commit: String,
    pub profile: String,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub server_id: String,
    pub apis: usize,
    pub acceptors: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_handled: u64,
    pub requests_failed: u64,
    pub requests_unmatched: u64,
    pub pending_requests: usize,
    pub config_reloads: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (source_name, version_str, loaded_ago) = {
        let loaded = state.config.read().await;
        (
            loaded.source_name.clone(),
            loaded.version.short().to_string(),
            loaded.loaded_at.elapsed().as_secs(),
        )
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: BuildInfo {
            commit: env!("GATEHOUSE_GIT_SHORT").to_string(),
            profile: env!("GATEHOUSE_BUILD_PROFILE").to_string(),
        },
        uptime_seconds: state.start_time.elapsed().as_secs(),
        node: state.node.state().to_string(),
        config: ConfigHealth {
            source: source_name,
            version: version_str,
            loaded_ago_seconds: loaded_ago,
            server_id: state.server_id.clone(),
            apis: state.registry.len(),
            acceptors: state.registry.acceptors().len(),
        },
        stats: StatsResponse {
            requests_handled: state.stats.handled.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
            requests_unmatched: state.stats.unmatched.load(Ordering::Relaxed),
            pending_requests: state.registry.pending_requests(),
            config_reloads: state.stats.config_reloads.load(Ordering::Relaxed),
        },
    })
}
