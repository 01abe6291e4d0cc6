//! Ticket CRUD and workflow endpoints.
//!
//! - GET    /tickets                 - List with filters and pagination
//! - POST   /tickets                 - Create
//! - GET    /tickets/:id             - Fetch one
//! - PATCH  /tickets/:id             - Partial update
//! - DELETE /tickets/:id             - Delete with cascade
//! - POST   /tickets/:id/assign      - Assign to an agent
//! - PATCH  /tickets/:id/status      - Direct status update
//! - POST   /tickets/:id/close       - Close with a resolution
//! - POST   /tickets/:id/reopen      - Reopen a closed ticket
//! - PATCH  /tickets/:id/priority    - Change priority
//! - POST   /tickets/escalate        - Escalate (ticket id in the body)
//! - POST   /tickets/:id/escalate    - Escalate
//! - GET    /tickets/:id/history     - Audit log

use super::{authorize, into_ticket, organization, permissions, unexpected};
use crate::aggregate::{NewTicket, Outcome, TicketCommand, TicketPatch};
use crate::queries::{self, Page, PageParams, TicketFilter};
use crate::server::AppState;
use crate::types::{
    HistoryEntry, Ticket, TicketCategory, TicketId, TicketPriority, TicketStatus, UserId,
};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use supportdesk_web::{ApiJson, ApiPath, ApiQuery, AppError, Principal};
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

/// Query string of `GET /tickets`
#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsQuery {
    /// Page number (default 1)
    pub page: Option<u32>,
    /// Page size (default 20, max 100)
    pub page_size: Option<u32>,
    /// Filter by status
    pub status: Option<TicketStatus>,
    /// Filter by priority
    pub priority: Option<TicketPriority>,
    /// Filter by category
    pub category: Option<TicketCategory>,
    /// Filter by assignee
    pub assigned_to_id: Option<Uuid>,
    /// Case-insensitive text search
    pub search: Option<String>,
}

impl ListTicketsQuery {
    fn split(self) -> (TicketFilter, PageParams) {
        let defaults = PageParams::default();
        (
            TicketFilter {
                status: self.status,
                priority: self.priority,
                category: self.category,
                assigned_to_id: self.assigned_to_id.map(UserId::from_uuid),
                search: self.search,
            },
            PageParams {
                page: self.page.unwrap_or(defaults.page),
                page_size: self.page_size.unwrap_or(defaults.page_size),
            },
        )
    }
}

/// Body of `POST /tickets/:id/assign`
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// Agent to assign
    pub assigned_to_id: Uuid,
}

/// Body of `PATCH /tickets/:id/status`
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status
    pub status: TicketStatus,
}

/// Body of `POST /tickets/:id/close`
#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    /// Resolution text
    pub resolution: String,
}

/// Body of `POST /tickets/:id/reopen`
#[derive(Debug, Deserialize)]
pub struct ReopenRequest {
    /// Why the ticket is reopened
    pub reason: String,
}

/// Body of `PATCH /tickets/:id/priority`
#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    /// New priority
    pub priority: TicketPriority,
}

/// Body of `POST /tickets/:id/escalate`
#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    /// Why
    pub reason: String,
    /// Target level
    pub escalate_to_level: u8,
}

/// Body of `POST /tickets/escalate`
#[derive(Debug, Deserialize)]
pub struct EscalateByBodyRequest {
    /// Ticket to escalate
    pub ticket_id: Uuid,
    /// Why
    pub reason: String,
    /// Target level
    pub escalate_to_level: u8,
}

// ============================================================================
// Handlers
// ============================================================================

/// List tickets of the caller's organization, newest first.
pub async fn list_tickets(
    principal: Principal,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListTicketsQuery>,
) -> Result<Json<Page<Ticket>>, AppError> {
    let organization_id = organization(&principal, permissions::LIST)?;
    let (filter, params) = query.split();
    let params = params.validate()?;

    let page = state
        .tickets
        .view(|s| queries::list_tickets(s, organization_id, &filter, params))
        .await;
    Ok(Json(page))
}

/// Create a ticket.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/tickets \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"subject": "Login Issue", "priority": "high"}'
/// ```
pub async fn create_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let actor = authorize(&principal, permissions::CREATE)?;
    let ticket = into_ticket(
        state
            .tickets
            .execute(actor, TicketCommand::Create(request))
            .await?,
    )?;

    tracing::info!(ticket_id = %ticket.id, ticket_number = %ticket.ticket_number, "Ticket created");
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Fetch one ticket.
pub async fn get_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let organization_id = organization(&principal, permissions::READ)?;
    let ticket = state
        .tickets
        .read(|s| queries::get_ticket(s, organization_id, TicketId::from_uuid(id)))
        .await?;
    Ok(Json(ticket))
}

async fn run(
    state: &AppState,
    principal: &Principal,
    command: TicketCommand,
) -> Result<Json<Ticket>, AppError> {
    let actor = authorize(principal, permissions::UPDATE)?;
    let outcome = state.tickets.execute(actor, command).await?;
    into_ticket(outcome).map(Json)
}

/// Partial update; absent fields stay unchanged.
pub async fn update_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<TicketPatch>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::Update {
            ticket_id: TicketId::from_uuid(id),
            patch,
        },
    )
    .await
}

/// Delete a ticket with its comments, attachments, history, followers and tags.
pub async fn delete_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let actor = authorize(&principal, permissions::DELETE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::Delete {
                ticket_id: TicketId::from_uuid(id),
            },
        )
        .await?;

    let attachments = match outcome {
        Outcome::TicketDeleted { attachments } => attachments,
        other => return Err(unexpected(&other)),
    };
    for attachment in &attachments {
        super::attachments::discard(&state, &attachment.storage_key).await;
    }

    tracing::info!(ticket_id = %id, "Ticket deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Assign to an agent; open tickets move to `in_progress`.
pub async fn assign_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AssignRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::Assign {
            ticket_id: TicketId::from_uuid(id),
            assigned_to_id: UserId::from_uuid(request.assigned_to_id),
        },
    )
    .await
}

/// Direct status update along the transition table.
pub async fn update_status(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<StatusRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::ChangeStatus {
            ticket_id: TicketId::from_uuid(id),
            status: request.status,
        },
    )
    .await
}

/// Close a resolved or in-progress ticket.
pub async fn close_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<CloseRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::Close {
            ticket_id: TicketId::from_uuid(id),
            resolution: request.resolution,
        },
    )
    .await
}

/// Reopen a closed ticket.
pub async fn reopen_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ReopenRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::Reopen {
            ticket_id: TicketId::from_uuid(id),
            reason: request.reason,
        },
    )
    .await
}

/// Change priority.
pub async fn set_priority(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<PriorityRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::SetPriority {
            ticket_id: TicketId::from_uuid(id),
            priority: request.priority,
        },
    )
    .await
}

/// Escalate the ticket named in the body.
pub async fn escalate_ticket(
    principal: Principal,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EscalateByBodyRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::Escalate {
            ticket_id: TicketId::from_uuid(request.ticket_id),
            reason: request.reason,
            level: request.escalate_to_level,
        },
    )
    .await
}

/// Escalate the ticket named in the path.
pub async fn escalate_ticket_by_id(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<EscalateRequest>,
) -> Result<Json<Ticket>, AppError> {
    run(
        &state,
        &principal,
        TicketCommand::Escalate {
            ticket_id: TicketId::from_uuid(id),
            reason: request.reason,
            level: request.escalate_to_level,
        },
    )
    .await
}

/// Audit log, oldest change first.
pub async fn ticket_history(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let organization_id = organization(&principal, permissions::READ)?;
    let history = state
        .tickets
        .read(|s| queries::ticket_history(s, organization_id, TicketId::from_uuid(id)))
        .await?;
    Ok(Json(history))
}
