//! Metrics endpoints.
//!
//! - GET /tickets/metrics/overview           - Counts by status, priority and category
//! - GET /tickets/metrics/sla                - SLA compliance
//! - GET /tickets/metrics/agent-performance  - Per-agent workload

use super::{organization, permissions};
use crate::reports::{self, AgentPerformance, Overview, SlaReport};
use crate::server::AppState;
use axum::{extract::State, Json};
use supportdesk_web::{AppError, Principal};

/// Overview counts.
pub async fn overview(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<Overview>, AppError> {
    let organization_id = organization(&principal, permissions::LIST)?;
    let now = state.clock.now();
    let report = state
        .tickets
        .view(|s| reports::overview(s, organization_id, now))
        .await;
    Ok(Json(report))
}

/// SLA compliance.
pub async fn sla(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<SlaReport>, AppError> {
    let organization_id = organization(&principal, permissions::LIST)?;
    let now = state.clock.now();
    let report = state
        .tickets
        .view(|s| reports::sla(s, organization_id, now))
        .await;
    Ok(Json(report))
}

/// Per-agent workload and resolution times.
pub async fn agent_performance(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<Vec<AgentPerformance>>, AppError> {
    let organization_id = organization(&principal, permissions::LIST)?;
    let rows = state
        .tickets
        .view(|s| reports::agent_performance(s, organization_id))
        .await;
    Ok(Json(rows))
}
