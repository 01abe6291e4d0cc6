//! Follower and tag endpoints.
//!
//! - POST   /tickets/:id/followers           - Follow (201 new, 200 already following)
//! - DELETE /tickets/:id/followers/:user_id  - Unfollow
//! - POST   /tickets/:id/tags                - Tag
//! - DELETE /tickets/:id/tags/:tag           - Untag

use super::{authorize, into_ticket, permissions, unexpected};
use crate::aggregate::{Outcome, TicketCommand};
use crate::server::AppState;
use crate::types::{Ticket, TicketId, UserId};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use supportdesk_web::{ApiJson, ApiPath, AppError, Principal};
use uuid::Uuid;

/// Body of `POST /tickets/:id/followers`
#[derive(Debug, Deserialize)]
pub struct FollowerRequest {
    /// User to add
    pub user_id: Uuid,
}

/// Body of `POST /tickets/:id/tags`
#[derive(Debug, Deserialize)]
pub struct TagRequest {
    /// Tag; stored trimmed and lower-cased
    pub tag: String,
}

/// Add a follower; already following is not an error.
pub async fn add_follower(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<FollowerRequest>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::AddFollower {
                ticket_id: TicketId::from_uuid(id),
                user_id: UserId::from_uuid(request.user_id),
            },
        )
        .await?;

    match outcome {
        Outcome::FollowerAdded {
            ticket,
            newly_added: true,
        } => Ok((StatusCode::CREATED, Json(ticket))),
        Outcome::FollowerAdded { ticket, .. } => Ok((StatusCode::OK, Json(ticket))),
        other => Err(unexpected(&other)),
    }
}

/// Remove a follower.
pub async fn remove_follower(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath((id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    state
        .tickets
        .execute(
            actor,
            TicketCommand::RemoveFollower {
                ticket_id: TicketId::from_uuid(id),
                user_id: UserId::from_uuid(user_id),
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add a tag.
pub async fn add_tag(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<TagRequest>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::AddTag {
                ticket_id: TicketId::from_uuid(id),
                tag: request.tag,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(into_ticket(outcome)?)))
}

/// Remove a tag.
pub async fn remove_tag(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath((id, tag)): ApiPath<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    state
        .tickets
        .execute(
            actor,
            TicketCommand::RemoveTag {
                ticket_id: TicketId::from_uuid(id),
                tag,
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
