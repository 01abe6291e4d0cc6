//! Router and shared state for the HTTP server.

use crate::api::{attachments, batch, collaborators, comments, reports, tickets};
use crate::service::TicketService;
use crate::storage::AttachmentStore;
use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use supportdesk_core::environment::Clock;
use supportdesk_runtime::HealthCheck;
use supportdesk_web::{correlation_id_layer, handlers, JwtVerifier};
use tower_http::trace::TraceLayer;

/// Extra room for multipart framing and the description part
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Ticket commands and reads
    pub tickets: TicketService,
    /// Attachment bytes
    pub attachments: Arc<dyn AttachmentStore>,
    /// Bearer token validation
    pub verifier: Arc<JwtVerifier>,
    /// Clock for reports
    pub clock: Arc<dyn Clock>,
    /// Largest accepted attachment
    pub attachment_max_bytes: usize,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        tickets: TicketService,
        attachments: Arc<dyn AttachmentStore>,
        verifier: Arc<JwtVerifier>,
        clock: Arc<dyn Clock>,
        attachment_max_bytes: usize,
    ) -> Self {
        Self {
            tickets,
            attachments,
            verifier,
            clock,
            attachment_max_bytes,
        }
    }
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthCheck>) {
    handlers::readiness_response(state.tickets.health())
}

/// Build the complete Axum router.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state
        .attachment_max_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let ticket_routes = Router::new()
        .route("/tickets", get(tickets::list_tickets).post(tickets::create_ticket))
        .route("/tickets/escalate", post(tickets::escalate_ticket))
        .route("/tickets/batch/update", post(batch::batch_update))
        .route("/tickets/metrics/overview", get(reports::overview))
        .route("/tickets/metrics/sla", get(reports::sla))
        .route(
            "/tickets/metrics/agent-performance",
            get(reports::agent_performance),
        )
        .route(
            "/tickets/:id",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route("/tickets/:id/assign", post(tickets::assign_ticket))
        .route("/tickets/:id/status", patch(tickets::update_status))
        .route("/tickets/:id/close", post(tickets::close_ticket))
        .route("/tickets/:id/reopen", post(tickets::reopen_ticket))
        .route("/tickets/:id/priority", patch(tickets::set_priority))
        .route("/tickets/:id/escalate", post(tickets::escalate_ticket_by_id))
        .route("/tickets/:id/history", get(tickets::ticket_history))
        .route(
            "/tickets/:id/comments",
            get(comments::list_comments).post(comments::add_comment),
        )
        .route(
            "/tickets/:id/comments/:comment_id",
            patch(comments::edit_comment).delete(comments::delete_comment),
        )
        .route(
            "/tickets/:id/attachments",
            get(attachments::list_attachments).post(attachments::upload_attachment),
        )
        .route(
            "/tickets/:id/attachments/:attachment_id",
            delete(attachments::delete_attachment),
        )
        .route("/tickets/:id/followers", post(collaborators::add_follower))
        .route(
            "/tickets/:id/followers/:user_id",
            delete(collaborators::remove_follower),
        )
        .route("/tickets/:id/tags", post(collaborators::add_tag))
        .route("/tickets/:id/tags/:tag", delete(collaborators::remove_tag))
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(handlers::health_check))
        .route("/ready", get(readiness_check))
        .nest("/api/v1", ticket_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
