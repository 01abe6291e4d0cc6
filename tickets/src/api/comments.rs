//! Comment endpoints.
//!
//! - GET    /tickets/:id/comments              - Oldest first, paginated
//! - POST   /tickets/:id/comments              - Add
//! - PATCH  /tickets/:id/comments/:comment_id  - Edit
//! - DELETE /tickets/:id/comments/:comment_id  - Delete

use super::{authorize, organization, permissions, unexpected};
use crate::aggregate::{Outcome, TicketCommand};
use crate::queries::{self, Page, PageParams};
use crate::server::AppState;
use crate::types::{Comment, CommentId, TicketId};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use supportdesk_web::{ApiJson, ApiPath, ApiQuery, AppError, Principal};
use uuid::Uuid;

/// Query string of the comment list
#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    /// Page number (default 1)
    pub page: Option<u32>,
    /// Page size (default 20, max 100)
    pub page_size: Option<u32>,
    /// Include internal notes (default true)
    pub include_internal: Option<bool>,
}

/// Body of a new comment
#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    /// Comment text
    pub content: String,
    /// Visible to agents only
    #[serde(default)]
    pub is_internal: bool,
    /// Marks the comment as the ticket's resolution
    #[serde(default)]
    pub is_resolution: bool,
}

/// Body of a comment edit
#[derive(Debug, Deserialize)]
pub struct EditCommentRequest {
    /// New text
    pub content: Option<String>,
    /// New visibility
    pub is_internal: Option<bool>,
}

fn into_comment(outcome: Outcome) -> Result<Comment, AppError> {
    match outcome {
        Outcome::Comment(comment) => Ok(comment),
        other => Err(unexpected(&other)),
    }
}

/// List comments of a ticket.
pub async fn list_comments(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListCommentsQuery>,
) -> Result<Json<Page<Comment>>, AppError> {
    let organization_id = organization(&principal, permissions::READ)?;
    let defaults = PageParams::default();
    let params = PageParams {
        page: query.page.unwrap_or(defaults.page),
        page_size: query.page_size.unwrap_or(defaults.page_size),
    }
    .validate()?;
    let include_internal = query.include_internal.unwrap_or(true);

    let page = state
        .tickets
        .read(|s| {
            queries::list_comments(
                s,
                organization_id,
                TicketId::from_uuid(id),
                include_internal,
                params,
            )
        })
        .await?;
    Ok(Json(page))
}

/// Add a comment.
pub async fn add_comment(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AddCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::AddComment {
                ticket_id: TicketId::from_uuid(id),
                content: request.content,
                is_internal: request.is_internal,
                is_resolution: request.is_resolution,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(into_comment(outcome)?)))
}

/// Edit a comment.
pub async fn edit_comment(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath((id, comment_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(request): ApiJson<EditCommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::EditComment {
                ticket_id: TicketId::from_uuid(id),
                comment_id: CommentId::from_uuid(comment_id),
                content: request.content,
                is_internal: request.is_internal,
            },
        )
        .await?;
    into_comment(outcome).map(Json)
}

/// Delete a comment.
pub async fn delete_comment(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath((id, comment_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    state
        .tickets
        .execute(
            actor,
            TicketCommand::DeleteComment {
                ticket_id: TicketId::from_uuid(id),
                comment_id: CommentId::from_uuid(comment_id),
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
