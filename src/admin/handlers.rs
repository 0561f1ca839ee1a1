use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::AppState;
use crate::pool::PoolStats;
use crate::proxy::ProxyStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub proxy: ProxyStatus,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        proxy: state.proxy().status(),
    })
}

pub async fn get_pools(State(state): State<AppState>) -> Json<Vec<PoolStats>> {
    Json(state.proxy().pool_stats())
}
