//! The ticket reducer: the workflow engine behind every ticket mutation.
//!
//! Commands arrive as [`TicketAction::Command`] carrying a `request_id` and
//! the acting [`Actor`]. The reducer:
//!
//! 1. Validates the command against the current state and workflow rules
//! 2. Produces [`TicketEvent`]s and applies them to the state (status change
//!    and history entry land in the same reduction)
//! 3. Returns effects: append the events to the journal, then reply with
//!    [`TicketAction::Completed`]
//!
//! Rejected commands change nothing and reply with [`TicketAction::Rejected`].
//! Callers wait for the reply with `Store::send_and_wait_for`.

use crate::events::{TicketDetails, TicketEvent, TicketEventKind};
use crate::state::TicketState;
use crate::types::{
    Actor, Attachment, AttachmentId, Comment, CommentId, OrganizationId, Ticket, TicketCategory,
    TicketError, TicketId, TicketPriority, TicketStatus, UserId,
};
use crate::workflow::{self, WorkflowPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use supportdesk_core::{
    effect::Effect,
    environment::{Clock, IdGenerator},
    journal::{EventJournal, JournalRecord},
    reducer::Reducer,
    smallvec, SmallVec,
};
use uuid::Uuid;

/// Largest accepted batch
pub const MAX_BATCH_SIZE: usize = 100;

// ============================================================================
// Commands
// ============================================================================

/// Fields for a new ticket
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    /// Subject (required)
    pub subject: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Priority, `medium` when absent
    #[serde(default)]
    pub priority: TicketPriority,
    /// Category, `general` when absent
    #[serde(default)]
    pub category: TicketCategory,
    /// Requester name
    #[serde(default)]
    pub requester_name: Option<String>,
    /// Requester email
    #[serde(default)]
    pub requester_email: Option<String>,
    /// Initial assignee
    #[serde(default)]
    pub assigned_to_id: Option<UserId>,
    /// Due date; derived from the SLA policy when absent
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Initial tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPatch {
    /// New subject
    #[serde(default)]
    pub subject: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// New status (validated against the transition table)
    #[serde(default)]
    pub status: Option<TicketStatus>,
    /// New priority
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    /// New category
    #[serde(default)]
    pub category: Option<TicketCategory>,
    /// New assignee
    #[serde(default)]
    pub assigned_to_id: Option<UserId>,
    /// New requester name
    #[serde(default)]
    pub requester_name: Option<String>,
    /// New requester email
    #[serde(default)]
    pub requester_email: Option<String>,
    /// New due date
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Replacement tag set; tags are normalized like `POST /tags`
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl TicketPatch {
    /// True when no field is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.assigned_to_id.is_none()
            && self.requester_name.is_none()
            && self.requester_email.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
    }
}

/// An uploaded file whose bytes are already in the attachment store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentUpload {
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub content_type: String,
    /// Stored size
    pub size_bytes: u64,
    /// Key of the stored bytes
    pub storage_key: String,
    /// Optional description
    pub description: Option<String>,
}

/// Operations on tickets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketCommand {
    /// Create a ticket
    Create(NewTicket),
    /// Partial update
    Update {
        /// Ticket
        ticket_id: TicketId,
        /// Changes
        patch: TicketPatch,
    },
    /// Assign to an agent
    Assign {
        /// Ticket
        ticket_id: TicketId,
        /// Agent
        assigned_to_id: UserId,
    },
    /// Direct status update
    ChangeStatus {
        /// Ticket
        ticket_id: TicketId,
        /// Target status
        status: TicketStatus,
    },
    /// Close with a resolution
    Close {
        /// Ticket
        ticket_id: TicketId,
        /// Resolution text
        resolution: String,
    },
    /// Reopen a closed ticket
    Reopen {
        /// Ticket
        ticket_id: TicketId,
        /// Why
        reason: String,
    },
    /// Raise the escalation level
    Escalate {
        /// Ticket
        ticket_id: TicketId,
        /// Why
        reason: String,
        /// Target level
        level: u8,
    },
    /// Change priority
    SetPriority {
        /// Ticket
        ticket_id: TicketId,
        /// New priority
        priority: TicketPriority,
    },
    /// Delete a ticket and everything it owns
    Delete {
        /// Ticket
        ticket_id: TicketId,
    },
    /// Add a comment
    AddComment {
        /// Ticket
        ticket_id: TicketId,
        /// Body
        content: String,
        /// Agent-only
        is_internal: bool,
        /// Carries the resolution
        is_resolution: bool,
    },
    /// Edit a comment
    EditComment {
        /// Ticket
        ticket_id: TicketId,
        /// Comment
        comment_id: CommentId,
        /// New body
        content: Option<String>,
        /// New visibility
        is_internal: Option<bool>,
    },
    /// Delete a comment
    DeleteComment {
        /// Ticket
        ticket_id: TicketId,
        /// Comment
        comment_id: CommentId,
    },
    /// Record an uploaded attachment
    AddAttachment {
        /// Ticket
        ticket_id: TicketId,
        /// Upload metadata
        upload: AttachmentUpload,
    },
    /// Remove an attachment
    RemoveAttachment {
        /// Ticket
        ticket_id: TicketId,
        /// Attachment
        attachment_id: AttachmentId,
    },
    /// Follow a ticket
    AddFollower {
        /// Ticket
        ticket_id: TicketId,
        /// Follower
        user_id: UserId,
    },
    /// Unfollow a ticket
    RemoveFollower {
        /// Ticket
        ticket_id: TicketId,
        /// Follower
        user_id: UserId,
    },
    /// Tag a ticket
    AddTag {
        /// Ticket
        ticket_id: TicketId,
        /// Tag
        tag: String,
    },
    /// Untag a ticket
    RemoveTag {
        /// Ticket
        ticket_id: TicketId,
        /// Tag
        tag: String,
    },
    /// Apply the same patch to several tickets, each atomically
    BatchUpdate {
        /// Tickets
        ticket_ids: Vec<TicketId>,
        /// Changes
        patch: TicketPatch,
    },
}

impl TicketCommand {
    /// Short name for logs and metrics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Assign { .. } => "assign",
            Self::ChangeStatus { .. } => "change_status",
            Self::Close { .. } => "close",
            Self::Reopen { .. } => "reopen",
            Self::Escalate { .. } => "escalate",
            Self::SetPriority { .. } => "set_priority",
            Self::Delete { .. } => "delete",
            Self::AddComment { .. } => "add_comment",
            Self::EditComment { .. } => "edit_comment",
            Self::DeleteComment { .. } => "delete_comment",
            Self::AddAttachment { .. } => "add_attachment",
            Self::RemoveAttachment { .. } => "remove_attachment",
            Self::AddFollower { .. } => "add_follower",
            Self::RemoveFollower { .. } => "remove_follower",
            Self::AddTag { .. } => "add_tag",
            Self::RemoveTag { .. } => "remove_tag",
            Self::BatchUpdate { .. } => "batch_update",
        }
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Per-ticket result of a batch update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Ticket
    pub ticket_id: TicketId,
    /// Whether the patch was applied
    pub success: bool,
    /// Ticket after the update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
    /// Why the update failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a batch update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of tickets updated
    pub succeeded: usize,
    /// Number of tickets left unchanged because of an error
    pub failed: usize,
    /// One entry per requested ticket, in request order
    pub results: Vec<BatchItemResult>,
}

/// What a completed command produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The ticket after the command
    Ticket(Ticket),
    /// The comment after the command
    Comment(Comment),
    /// The recorded attachment
    Attachment(Attachment),
    /// The attachment that was removed (its bytes can now be deleted)
    AttachmentRemoved(Attachment),
    /// The ticket was deleted along with these attachments
    TicketDeleted {
        /// Attachments whose bytes can now be deleted
        attachments: Vec<Attachment>,
    },
    /// A sub-record was removed
    Removed,
    /// A follower was added, or already present
    FollowerAdded {
        /// The ticket after the command
        ticket: Ticket,
        /// False when the user already followed the ticket
        newly_added: bool,
    },
    /// Batch update report
    Batch(BatchReport),
}

// ============================================================================
// Actions
// ============================================================================

/// Actions for the ticket store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    /// A command from an API caller
    Command {
        /// Correlates the reply
        request_id: Uuid,
        /// Who is acting
        actor: Actor,
        /// What to do
        command: TicketCommand,
    },

    /// The command was applied
    Completed {
        /// Request being answered
        request_id: Uuid,
        /// Result
        outcome: Box<Outcome>,
    },

    /// The command was refused; nothing changed
    Rejected {
        /// Request being answered
        request_id: Uuid,
        /// Why
        error: TicketError,
    },

    /// A ticket was escalated; published for notification subscribers
    EscalationRaised {
        /// Ticket
        ticket_id: TicketId,
        /// Organization
        organization_id: OrganizationId,
        /// New level
        level: u8,
        /// Why
        reason: String,
    },
}

impl TicketAction {
    /// Wrap a command
    #[must_use]
    pub const fn command(request_id: Uuid, actor: Actor, command: TicketCommand) -> Self {
        Self::Command {
            request_id,
            actor,
            command,
        }
    }

    /// The request this action replies to, if it is a reply
    #[must_use]
    pub const fn reply_to(&self) -> Option<Uuid> {
        match self {
            Self::Completed { request_id, .. } | Self::Rejected { request_id, .. } => {
                Some(*request_id)
            },
            Self::Command { .. } | Self::EscalationRaised { .. } => None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the ticket reducer
#[derive(Clone)]
pub struct TicketEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Source of new record IDs
    pub ids: Arc<dyn IdGenerator>,
    /// Journal that receives accepted events
    pub journal: Arc<dyn EventJournal>,
    /// Workflow rules
    pub policy: WorkflowPolicy,
}

impl TicketEnvironment {
    /// Creates a new `TicketEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        journal: Arc<dyn EventJournal>,
        policy: WorkflowPolicy,
    ) -> Self {
        Self {
            clock,
            ids,
            journal,
            policy,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for support tickets
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketReducer;

/// How to build the reply once events are applied
enum Reply {
    Ticket(TicketId),
    Comment(TicketId, CommentId),
    Attachment(TicketId, AttachmentId),
    AttachmentRemoved(Attachment),
    TicketDeleted(Vec<Attachment>),
    Removed,
    FollowerAdded(TicketId, bool),
    Batch(Vec<(TicketId, Option<TicketError>)>),
}

/// Events to record plus the reply to send
struct Decision {
    events: Vec<TicketEvent>,
    reply: Reply,
}

impl Decision {
    const fn new(events: Vec<TicketEvent>, reply: Reply) -> Self {
        Self { events, reply }
    }
}

/// Builds events sharing one actor, ticket and timestamp
struct EventBuilder {
    ticket_id: TicketId,
    actor: UserId,
    at: DateTime<Utc>,
}

impl EventBuilder {
    const fn new(ticket_id: TicketId, actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            actor: actor.user_id,
            at,
        }
    }

    const fn event(&self, kind: TicketEventKind) -> TicketEvent {
        TicketEvent::new(self.ticket_id, self.actor, self.at, kind)
    }
}

impl TicketReducer {
    // ========== Validation + decisions ==========

    fn reject_if_closed(ticket: &Ticket, operation: &str) -> Result<(), TicketError> {
        if ticket.status == TicketStatus::Closed {
            return Err(TicketError::validation(format!(
                "Cannot {operation} a closed ticket; reopen it first"
            )));
        }
        Ok(())
    }

    fn decide_create(
        state: &TicketState,
        actor: &Actor,
        new: NewTicket,
        env: &TicketEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let subject = workflow::validate_subject(&new.subject)?;
        let requester_email = new
            .requester_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(workflow::validate_email)
            .transpose()?;
        let tags = new
            .tags
            .iter()
            .map(|t| workflow::normalize_tag(t))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let id = TicketId::from_uuid(env.ids.next_id());
        let number_sequence = state.next_number_sequence(actor.organization_id);
        let due_date = new
            .due_date
            .or_else(|| Some(now + env.policy.sla.resolution_time(new.priority)));

        let ticket = Ticket {
            id,
            organization_id: actor.organization_id,
            ticket_number: env.policy.ticket_number(number_sequence),
            subject,
            description: workflow::optional_text(new.description.as_deref()),
            status: TicketStatus::Open,
            priority: new.priority,
            category: new.category,
            requester_name: workflow::optional_text(new.requester_name.as_deref()),
            requester_email,
            assigned_to_id: new.assigned_to_id,
            created_by: actor.user_id,
            escalation_level: 0,
            due_date,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            resolution_notes: None,
            tags,
            followers: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };

        let events = vec![EventBuilder::new(id, actor, now).event(TicketEventKind::Created {
            ticket: Box::new(ticket),
            number_sequence,
        })];
        Ok(Decision::new(events, Reply::Ticket(id)))
    }

    /// Events for a patch; shared by single and batch updates.
    fn plan_update(
        ticket: &Ticket,
        patch: &TicketPatch,
        events: &EventBuilder,
    ) -> Result<Vec<TicketEvent>, TicketError> {
        Self::reject_if_closed(ticket, "update")?;

        let mut planned = Vec::new();

        let current = TicketDetails::of(ticket);
        let mut details = current.clone();
        if let Some(subject) = &patch.subject {
            details.subject = workflow::validate_subject(subject)?;
        }
        if let Some(description) = &patch.description {
            details.description = workflow::optional_text(Some(description));
        }
        if let Some(category) = patch.category {
            details.category = category;
        }
        if let Some(name) = &patch.requester_name {
            details.requester_name = workflow::optional_text(Some(name));
        }
        if let Some(email) = &patch.requester_email {
            details.requester_email = match email.trim() {
                "" => None,
                email => Some(workflow::validate_email(email)?),
            };
        }
        if let Some(due_date) = patch.due_date {
            details.due_date = Some(due_date);
        }
        if details != current {
            planned.push(events.event(TicketEventKind::DetailsUpdated { details }));
        }

        if let Some(priority) = patch.priority.filter(|p| *p != ticket.priority) {
            planned.push(events.event(TicketEventKind::PriorityChanged {
                from: ticket.priority,
                to: priority,
            }));
        }

        if let Some(tags) = &patch.tags {
            let wanted = tags
                .iter()
                .map(|t| workflow::normalize_tag(t))
                .collect::<Result<BTreeSet<_>, _>>()?;
            for tag in ticket.tags.difference(&wanted) {
                planned.push(events.event(TicketEventKind::TagRemoved { tag: tag.clone() }));
            }
            for tag in wanted.difference(&ticket.tags) {
                planned.push(events.event(TicketEventKind::TagAdded { tag: tag.clone() }));
            }
        }

        let mut status = ticket.status;
        if let Some(assignee) = patch.assigned_to_id {
            if ticket.assigned_to_id != Some(assignee) {
                planned.push(events.event(TicketEventKind::Assigned {
                    from: ticket.assigned_to_id,
                    to: assignee,
                }));
            }
            if patch.status.is_none() && workflow::assignment_starts_work(status) {
                planned.push(events.event(TicketEventKind::StatusChanged {
                    from: status,
                    to: TicketStatus::InProgress,
                    note: None,
                }));
                status = TicketStatus::InProgress;
            }
        }

        if let Some(target) = patch.status.filter(|s| *s != status) {
            workflow::check_transition(status, target)?;
            planned.push(events.event(TicketEventKind::StatusChanged {
                from: status,
                to: target,
                note: None,
            }));
        }

        Ok(planned)
    }

    fn decide_update(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        patch: &TicketPatch,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        let events = Self::plan_update(ticket, patch, &EventBuilder::new(ticket_id, actor, now))?;
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_assign(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        assignee: UserId,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        Self::reject_if_closed(ticket, "assign")?;

        let builder = EventBuilder::new(ticket_id, actor, now);
        let mut events = Vec::new();
        if ticket.assigned_to_id != Some(assignee) {
            events.push(builder.event(TicketEventKind::Assigned {
                from: ticket.assigned_to_id,
                to: assignee,
            }));
        }
        // Also when the assignee was set at creation and is confirmed here
        if workflow::assignment_starts_work(ticket.status) {
            events.push(builder.event(TicketEventKind::StatusChanged {
                from: ticket.status,
                to: TicketStatus::InProgress,
                note: None,
            }));
        }
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_change_status(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        if ticket.status == status {
            return Err(TicketError::validation(format!(
                "Ticket is already {status}"
            )));
        }
        workflow::check_transition(ticket.status, status)?;

        let events = vec![EventBuilder::new(ticket_id, actor, now).event(
            TicketEventKind::StatusChanged {
                from: ticket.status,
                to: status,
                note: None,
            },
        )];
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_close(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        resolution: &str,
        env: &TicketEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        let resolution = workflow::required_text(resolution, "Resolution")?;
        if !workflow::can_close(ticket.status) {
            return Err(TicketError::validation(format!(
                "Only resolved or in-progress tickets can be closed (current: {})",
                ticket.status
            )));
        }

        let builder = EventBuilder::new(ticket_id, actor, now);
        let mut events = Vec::new();
        if !state.comments_of(ticket_id).iter().any(|c| c.is_resolution) {
            events.push(builder.event(TicketEventKind::CommentAdded {
                comment: Comment {
                    id: CommentId::from_uuid(env.ids.next_id()),
                    ticket_id,
                    author_id: actor.user_id,
                    content: resolution.clone(),
                    is_internal: false,
                    is_resolution: true,
                    created_at: now,
                    updated_at: now,
                },
            }));
        }
        events.push(builder.event(TicketEventKind::StatusChanged {
            from: ticket.status,
            to: TicketStatus::Closed,
            note: Some(resolution),
        }));
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_reopen(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        if ticket.status != TicketStatus::Closed {
            return Err(TicketError::validation(format!(
                "Only closed tickets can be reopened (current: {})",
                ticket.status
            )));
        }
        let reason = workflow::required_text(reason, "Reason")?;

        let events = vec![EventBuilder::new(ticket_id, actor, now).event(
            TicketEventKind::StatusChanged {
                from: TicketStatus::Closed,
                to: TicketStatus::Reopened,
                note: Some(reason),
            },
        )];
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_escalate(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        reason: &str,
        level: u8,
        env: &TicketEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        Self::reject_if_closed(ticket, "escalate")?;
        let reason = workflow::required_text(reason, "Escalation reason")?;

        let max = env.policy.max_escalation_level;
        if level == 0 || level > max {
            return Err(TicketError::validation(format!(
                "Escalation level must be between 1 and {max}"
            )));
        }
        if level <= ticket.escalation_level {
            return Err(TicketError::validation(format!(
                "Ticket is already at escalation level {}",
                ticket.escalation_level
            )));
        }

        let events = vec![EventBuilder::new(ticket_id, actor, now).event(
            TicketEventKind::Escalated {
                from: ticket.escalation_level,
                to: level,
                reason,
            },
        )];
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_set_priority(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        priority: TicketPriority,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        Self::reject_if_closed(ticket, "reprioritize")?;

        let mut events = Vec::new();
        if ticket.priority != priority {
            events.push(EventBuilder::new(ticket_id, actor, now).event(
                TicketEventKind::PriorityChanged {
                    from: ticket.priority,
                    to: priority,
                },
            ));
        }
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_delete(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        state.ticket(actor.organization_id, ticket_id)?;
        let attachments = state.attachments_of(ticket_id).to_vec();
        let events =
            vec![EventBuilder::new(ticket_id, actor, now).event(TicketEventKind::Deleted)];
        Ok(Decision::new(events, Reply::TicketDeleted(attachments)))
    }

    #[allow(clippy::too_many_arguments)]
    fn decide_add_comment(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        content: &str,
        is_internal: bool,
        is_resolution: bool,
        env: &TicketEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        let content = workflow::required_text(content, "Comment content")?;
        if is_resolution {
            Self::reject_if_closed(ticket, "add a resolution to")?;
        }

        let builder = EventBuilder::new(ticket_id, actor, now);
        let comment_id = CommentId::from_uuid(env.ids.next_id());
        let mut events = vec![builder.event(TicketEventKind::CommentAdded {
            comment: Comment {
                id: comment_id,
                ticket_id,
                author_id: actor.user_id,
                content: content.clone(),
                is_internal,
                is_resolution,
                created_at: now,
                updated_at: now,
            },
        })];
        if is_resolution && ticket.status.is_active() {
            events.push(builder.event(TicketEventKind::StatusChanged {
                from: ticket.status,
                to: TicketStatus::Resolved,
                note: Some(content),
            }));
        }
        Ok(Decision::new(events, Reply::Comment(ticket_id, comment_id)))
    }

    fn decide_edit_comment(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        comment_id: CommentId,
        content: Option<&str>,
        is_internal: Option<bool>,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        state.ticket(actor.organization_id, ticket_id)?;
        let comment = state
            .comment(ticket_id, comment_id)
            .ok_or_else(|| TicketError::not_found("Comment", comment_id))?;

        let content = match content {
            Some(content) => workflow::required_text(content, "Comment content")?,
            None => comment.content.clone(),
        };
        let is_internal = is_internal.unwrap_or(comment.is_internal);

        let mut events = Vec::new();
        if content != comment.content || is_internal != comment.is_internal {
            events.push(EventBuilder::new(ticket_id, actor, now).event(
                TicketEventKind::CommentEdited {
                    comment_id,
                    content,
                    is_internal,
                },
            ));
        }
        Ok(Decision::new(events, Reply::Comment(ticket_id, comment_id)))
    }

    fn decide_delete_comment(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        comment_id: CommentId,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        state.ticket(actor.organization_id, ticket_id)?;
        state
            .comment(ticket_id, comment_id)
            .ok_or_else(|| TicketError::not_found("Comment", comment_id))?;

        let events = vec![EventBuilder::new(ticket_id, actor, now)
            .event(TicketEventKind::CommentDeleted { comment_id })];
        Ok(Decision::new(events, Reply::Removed))
    }

    fn decide_add_attachment(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        upload: AttachmentUpload,
        env: &TicketEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        state.ticket(actor.organization_id, ticket_id)?;
        let file_name = workflow::required_text(&upload.file_name, "File name")?;
        if upload.size_bytes == 0 {
            return Err(TicketError::validation("Attachment is empty"));
        }

        let attachment_id = AttachmentId::from_uuid(env.ids.next_id());
        let events = vec![EventBuilder::new(ticket_id, actor, now).event(
            TicketEventKind::AttachmentAdded {
                attachment: Attachment {
                    id: attachment_id,
                    ticket_id,
                    file_name,
                    content_type: upload.content_type,
                    size_bytes: upload.size_bytes,
                    storage_key: upload.storage_key,
                    description: workflow::optional_text(upload.description.as_deref()),
                    uploaded_by: actor.user_id,
                    created_at: now,
                },
            },
        )];
        Ok(Decision::new(events, Reply::Attachment(ticket_id, attachment_id)))
    }

    fn decide_remove_attachment(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        attachment_id: AttachmentId,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        state.ticket(actor.organization_id, ticket_id)?;
        let attachment = state
            .attachment(ticket_id, attachment_id)
            .ok_or_else(|| TicketError::not_found("Attachment", attachment_id))?
            .clone();

        let events = vec![EventBuilder::new(ticket_id, actor, now).event(
            TicketEventKind::AttachmentRemoved {
                attachment_id,
                file_name: attachment.file_name.clone(),
            },
        )];
        Ok(Decision::new(events, Reply::AttachmentRemoved(attachment)))
    }

    fn decide_add_follower(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        if ticket.followers.contains(&user_id) {
            return Ok(Decision::new(Vec::new(), Reply::FollowerAdded(ticket_id, false)));
        }
        let events = vec![EventBuilder::new(ticket_id, actor, now)
            .event(TicketEventKind::FollowerAdded { user_id })];
        Ok(Decision::new(events, Reply::FollowerAdded(ticket_id, true)))
    }

    fn decide_remove_follower(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        if !ticket.followers.contains(&user_id) {
            return Err(TicketError::not_found("Follower", user_id));
        }
        let events = vec![EventBuilder::new(ticket_id, actor, now)
            .event(TicketEventKind::FollowerRemoved { user_id })];
        Ok(Decision::new(events, Reply::Removed))
    }

    fn decide_add_tag(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        let tag = workflow::normalize_tag(tag)?;
        if ticket.tags.contains(&tag) {
            return Err(TicketError::Conflict(format!(
                "Ticket is already tagged '{tag}'"
            )));
        }
        let events =
            vec![EventBuilder::new(ticket_id, actor, now).event(TicketEventKind::TagAdded { tag })];
        Ok(Decision::new(events, Reply::Ticket(ticket_id)))
    }

    fn decide_remove_tag(
        state: &TicketState,
        actor: &Actor,
        ticket_id: TicketId,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        let ticket = state.ticket(actor.organization_id, ticket_id)?;
        let normalized = tag.trim().to_lowercase();
        if !ticket.tags.contains(&normalized) {
            return Err(TicketError::not_found("Tag", tag));
        }
        let events = vec![EventBuilder::new(ticket_id, actor, now)
            .event(TicketEventKind::TagRemoved { tag: normalized })];
        Ok(Decision::new(events, Reply::Removed))
    }

    fn decide_batch(
        state: &TicketState,
        actor: &Actor,
        ticket_ids: &[TicketId],
        patch: &TicketPatch,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        if ticket_ids.is_empty() {
            return Err(TicketError::InvalidRequest(
                "ticket_ids cannot be empty".to_string(),
            ));
        }
        if ticket_ids.len() > MAX_BATCH_SIZE {
            return Err(TicketError::InvalidRequest(format!(
                "At most {MAX_BATCH_SIZE} tickets can be updated at once"
            )));
        }
        let mut seen = HashSet::with_capacity(ticket_ids.len());
        if let Some(duplicate) = ticket_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(TicketError::InvalidRequest(format!(
                "Ticket {duplicate} is listed more than once"
            )));
        }
        if patch.is_empty() {
            return Err(TicketError::InvalidRequest(
                "updates must set at least one field".to_string(),
            ));
        }

        let mut events = Vec::new();
        let mut results = Vec::with_capacity(ticket_ids.len());
        for &ticket_id in ticket_ids {
            let planned = state
                .ticket(actor.organization_id, ticket_id)
                .and_then(|ticket| {
                    Self::plan_update(ticket, patch, &EventBuilder::new(ticket_id, actor, now))
                });
            match planned {
                Ok(planned) => {
                    events.extend(planned);
                    results.push((ticket_id, None));
                },
                Err(error) => results.push((ticket_id, Some(error))),
            }
        }
        Ok(Decision::new(events, Reply::Batch(results)))
    }

    fn decide(
        state: &TicketState,
        actor: &Actor,
        command: TicketCommand,
        env: &TicketEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Decision, TicketError> {
        match command {
            TicketCommand::Create(new) => Self::decide_create(state, actor, new, env, now),
            TicketCommand::Update { ticket_id, patch } => {
                Self::decide_update(state, actor, ticket_id, &patch, now)
            },
            TicketCommand::Assign {
                ticket_id,
                assigned_to_id,
            } => Self::decide_assign(state, actor, ticket_id, assigned_to_id, now),
            TicketCommand::ChangeStatus { ticket_id, status } => {
                Self::decide_change_status(state, actor, ticket_id, status, now)
            },
            TicketCommand::Close {
                ticket_id,
                resolution,
            } => Self::decide_close(state, actor, ticket_id, &resolution, env, now),
            TicketCommand::Reopen { ticket_id, reason } => {
                Self::decide_reopen(state, actor, ticket_id, &reason, now)
            },
            TicketCommand::Escalate {
                ticket_id,
                reason,
                level,
            } => Self::decide_escalate(state, actor, ticket_id, &reason, level, env, now),
            TicketCommand::SetPriority {
                ticket_id,
                priority,
            } => Self::decide_set_priority(state, actor, ticket_id, priority, now),
            TicketCommand::Delete { ticket_id } => {
                Self::decide_delete(state, actor, ticket_id, now)
            },
            TicketCommand::AddComment {
                ticket_id,
                content,
                is_internal,
                is_resolution,
            } => Self::decide_add_comment(
                state,
                actor,
                ticket_id,
                &content,
                is_internal,
                is_resolution,
                env,
                now,
            ),
            TicketCommand::EditComment {
                ticket_id,
                comment_id,
                content,
                is_internal,
            } => Self::decide_edit_comment(
                state,
                actor,
                ticket_id,
                comment_id,
                content.as_deref(),
                is_internal,
                now,
            ),
            TicketCommand::DeleteComment {
                ticket_id,
                comment_id,
            } => Self::decide_delete_comment(state, actor, ticket_id, comment_id, now),
            TicketCommand::AddAttachment { ticket_id, upload } => {
                Self::decide_add_attachment(state, actor, ticket_id, upload, env, now)
            },
            TicketCommand::RemoveAttachment {
                ticket_id,
                attachment_id,
            } => Self::decide_remove_attachment(state, actor, ticket_id, attachment_id, now),
            TicketCommand::AddFollower { ticket_id, user_id } => {
                Self::decide_add_follower(state, actor, ticket_id, user_id, now)
            },
            TicketCommand::RemoveFollower { ticket_id, user_id } => {
                Self::decide_remove_follower(state, actor, ticket_id, user_id, now)
            },
            TicketCommand::AddTag { ticket_id, tag } => {
                Self::decide_add_tag(state, actor, ticket_id, &tag, now)
            },
            TicketCommand::RemoveTag { ticket_id, tag } => {
                Self::decide_remove_tag(state, actor, ticket_id, &tag, now)
            },
            TicketCommand::BatchUpdate { ticket_ids, patch } => {
                Self::decide_batch(state, actor, &ticket_ids, &patch, now)
            },
        }
    }

    // ========== Replies ==========

    fn resolve_reply(state: &TicketState, reply: Reply) -> Option<Outcome> {
        let ticket = |id: TicketId| state.tickets.get(&id).cloned();

        match reply {
            Reply::Ticket(id) => ticket(id).map(Outcome::Ticket),
            Reply::Comment(ticket_id, comment_id) => state
                .comment(ticket_id, comment_id)
                .cloned()
                .map(Outcome::Comment),
            Reply::Attachment(ticket_id, attachment_id) => state
                .attachment(ticket_id, attachment_id)
                .cloned()
                .map(Outcome::Attachment),
            Reply::AttachmentRemoved(attachment) => Some(Outcome::AttachmentRemoved(attachment)),
            Reply::TicketDeleted(attachments) => Some(Outcome::TicketDeleted { attachments }),
            Reply::Removed => Some(Outcome::Removed),
            Reply::FollowerAdded(id, newly_added) => {
                ticket(id).map(|ticket| Outcome::FollowerAdded {
                    ticket,
                    newly_added,
                })
            },
            Reply::Batch(results) => {
                let results: Vec<BatchItemResult> = results
                    .into_iter()
                    .map(|(ticket_id, error)| BatchItemResult {
                        ticket_id,
                        success: error.is_none(),
                        ticket: if error.is_none() { ticket(ticket_id) } else { None },
                        error: error.map(|e| e.to_string()),
                    })
                    .collect();
                let succeeded = results.iter().filter(|r| r.success).count();
                Some(Outcome::Batch(BatchReport {
                    succeeded,
                    failed: results.len() - succeeded,
                    results,
                }))
            },
        }
    }

    fn reject(request_id: Uuid, error: TicketError) -> SmallVec<[Effect<TicketAction>; 4]> {
        smallvec![Effect::send(TicketAction::Rejected { request_id, error })]
    }

    /// Apply the decision and describe persistence plus reply.
    fn commit(
        state: &mut TicketState,
        request_id: Uuid,
        actor: &Actor,
        decision: Decision,
        env: &TicketEnvironment,
    ) -> SmallVec<[Effect<TicketAction>; 4]> {
        let records = match decision
            .events
            .iter()
            .map(TicketEvent::to_record)
            .collect::<Result<Vec<JournalRecord>, _>>()
        {
            Ok(records) => records,
            Err(error) => {
                tracing::error!(error = %error, "Failed to encode ticket events");
                return Self::reject(request_id, TicketError::Persistence(error.to_string()));
            },
        };

        for event in &decision.events {
            state.apply(event);
        }

        let Some(outcome) = Self::resolve_reply(state, decision.reply) else {
            return Self::reject(
                request_id,
                TicketError::Persistence("record vanished while applying events".to_string()),
            );
        };

        let reply = Effect::send(TicketAction::Completed {
            request_id,
            outcome: Box::new(outcome),
        });

        if records.is_empty() {
            return smallvec![reply];
        }

        metrics::counter!("tickets.events.recorded").increment(records.len() as u64);

        let mut effects: SmallVec<[Effect<TicketAction>; 4]> = smallvec![Effect::chain(vec![
            Effect::Append {
                journal: Arc::clone(&env.journal),
                records,
            },
            reply,
        ])];

        for event in &decision.events {
            if let TicketEventKind::Escalated { to, reason, .. } = &event.kind {
                tracing::info!(ticket_id = %event.ticket_id, level = to, "Ticket escalated");
                effects.push(Effect::send(TicketAction::EscalationRaised {
                    ticket_id: event.ticket_id,
                    organization_id: actor.organization_id,
                    level: *to,
                    reason: reason.clone(),
                }));
            }
        }

        effects
    }
}

impl Reducer for TicketReducer {
    type State = TicketState;
    type Action = TicketAction;
    type Environment = TicketEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TicketAction::Command {
                request_id,
                actor,
                command,
            } => {
                let name = command.name();
                let now = env.clock.now();

                match Self::decide(state, &actor, command, env, now) {
                    Ok(decision) => {
                        tracing::debug!(
                            command = name,
                            events = decision.events.len(),
                            "Command accepted"
                        );
                        Self::commit(state, request_id, &actor, decision, env)
                    },
                    Err(error) => {
                        tracing::debug!(command = name, error = %error, "Command rejected");
                        metrics::counter!(
                            "tickets.commands.rejected",
                            "command" => name,
                            "reason" => error.kind()
                        )
                        .increment(1);
                        Self::reject(request_id, error)
                    },
                }
            },

            // Replies and notifications are for observers only
            TicketAction::Completed { .. }
            | TicketAction::Rejected { .. }
            | TicketAction::EscalationRaised { .. } => SmallVec::new(),
        }
    }
}
