//! HTTP API endpoints under `/api/v1`.
//!
//! Every handler authenticates through [`Principal`], checks its permission,
//! and acts for the organization bound to the token.
//!
//! - `tickets`: CRUD and workflow operations
//! - `comments`: ticket comments
//! - `attachments`: multipart uploads
//! - `collaborators`: followers and tags
//! - `reports`: metrics endpoints
//! - `batch`: bulk updates

pub mod attachments;
pub mod batch;
pub mod collaborators;
pub mod comments;
pub mod reports;
pub mod tickets;

use crate::aggregate::Outcome;
use crate::types::{Actor, OrganizationId, Ticket, UserId};
use supportdesk_web::{AppError, Principal};

/// Permission names
pub mod permissions {
    /// List tickets and read reports
    pub const LIST: &str = "ticket:list";
    /// Create tickets
    pub const CREATE: &str = "ticket:create";
    /// Read a ticket and its sub-records
    pub const READ: &str = "ticket:read";
    /// Mutate a ticket and its sub-records
    pub const UPDATE: &str = "ticket:update";
    /// Delete tickets
    pub const DELETE: &str = "ticket:delete";
}

/// Check `permission` and build the acting [`Actor`].
pub(crate) fn authorize(principal: &Principal, permission: &str) -> Result<Actor, AppError> {
    principal.require(permission)?;
    Ok(Actor::new(
        UserId::from_uuid(principal.user_id),
        OrganizationId::from_uuid(principal.organization()?),
    ))
}

/// The organization of an authorized caller.
pub(crate) fn organization(principal: &Principal, permission: &str) -> Result<OrganizationId, AppError> {
    authorize(principal, permission).map(|actor| actor.organization_id)
}

pub(crate) fn unexpected(outcome: &Outcome) -> AppError {
    tracing::error!(?outcome, "Command produced an unexpected outcome");
    AppError::internal("Unexpected command outcome")
}

/// Unwrap a ticket outcome.
pub(crate) fn into_ticket(outcome: Outcome) -> Result<Ticket, AppError> {
    match outcome {
        Outcome::Ticket(ticket) => Ok(ticket),
        other => Err(unexpected(&other)),
    }
}
