//! Bulk updates.
//!
//! `POST /tickets/batch/update` applies one patch to up to 100 tickets. Each
//! ticket is updated atomically on its own; the response reports every item.

use super::{authorize, permissions, unexpected};
use crate::aggregate::{BatchReport, Outcome, TicketCommand, TicketPatch};
use crate::server::AppState;
use crate::types::TicketId;
use axum::{extract::State, Json};
use serde::Deserialize;
use supportdesk_web::{ApiJson, AppError, Principal};
use uuid::Uuid;

/// Body of `POST /tickets/batch/update`
#[derive(Debug, Deserialize)]
pub struct BatchUpdateRequest {
    /// Tickets to update (1..=100, no duplicates)
    pub ticket_ids: Vec<Uuid>,
    /// Fields to set on each ticket
    pub updates: TicketPatch,
}

/// Apply `updates` to every listed ticket.
pub async fn batch_update(
    principal: Principal,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchUpdateRequest>,
) -> Result<Json<BatchReport>, AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::BatchUpdate {
                ticket_ids: request
                    .ticket_ids
                    .into_iter()
                    .map(TicketId::from_uuid)
                    .collect(),
                patch: request.updates,
            },
        )
        .await?;

    match outcome {
        Outcome::Batch(report) => {
            tracing::info!(
                succeeded = report.succeeded,
                failed = report.failed,
                "Batch update applied"
            );
            Ok(Json(report))
        },
        other => Err(unexpected(&other)),
    }
}
