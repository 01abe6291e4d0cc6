//! Domain events.
//!
//! Every accepted command is recorded as one or more [`TicketEvent`]s. They
//! are applied to [`TicketState`](crate::state::TicketState) by the reducer
//! and appended to the event journal; replaying the journal rebuilds the
//! same state, history entries included.

use crate::types::{
    Attachment, AttachmentId, Comment, CommentId, Ticket, TicketCategory, TicketId,
    TicketPriority, TicketStatus, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supportdesk_core::journal::{JournalError, JournalRecord};

/// Something that happened to a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEvent {
    /// Ticket the event belongs to
    pub ticket_id: TicketId,
    /// Who caused it
    pub actor: UserId,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
    /// What happened
    pub kind: TicketEventKind,
}

/// Editable ticket details, recorded in full whenever any of them changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    /// Subject
    pub subject: String,
    /// Description
    pub description: Option<String>,
    /// Category
    pub category: TicketCategory,
    /// Requester name
    pub requester_name: Option<String>,
    /// Requester email
    pub requester_email: Option<String>,
    /// Due date
    pub due_date: Option<DateTime<Utc>>,
}

impl TicketDetails {
    /// Current details of `ticket`
    #[must_use]
    pub fn of(ticket: &Ticket) -> Self {
        Self {
            subject: ticket.subject.clone(),
            description: ticket.description.clone(),
            category: ticket.category,
            requester_name: ticket.requester_name.clone(),
            requester_email: ticket.requester_email.clone(),
            due_date: ticket.due_date,
        }
    }
}

/// Event payloads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketEventKind {
    /// Ticket was created
    Created {
        /// The new ticket
        ticket: Box<Ticket>,
        /// Per-organization counter value behind `ticket_number`
        number_sequence: u64,
    },

    /// Subject, description, category, requester or due date changed
    DetailsUpdated {
        /// Details after the change
        details: TicketDetails,
    },

    /// Status moved along the workflow
    StatusChanged {
        /// Previous status
        from: TicketStatus,
        /// New status
        to: TicketStatus,
        /// Resolution or reopen reason
        note: Option<String>,
    },

    /// Priority changed
    PriorityChanged {
        /// Previous priority
        from: TicketPriority,
        /// New priority
        to: TicketPriority,
    },

    /// Assignee changed
    Assigned {
        /// Previous assignee
        from: Option<UserId>,
        /// New assignee
        to: UserId,
    },

    /// Escalation level raised
    Escalated {
        /// Previous level
        from: u8,
        /// New level
        to: u8,
        /// Why
        reason: String,
    },

    /// Comment added
    CommentAdded {
        /// The comment
        comment: Comment,
    },

    /// Comment edited
    CommentEdited {
        /// Comment
        comment_id: CommentId,
        /// Body after the edit
        content: String,
        /// Visibility after the edit
        is_internal: bool,
    },

    /// Comment deleted
    CommentDeleted {
        /// Comment
        comment_id: CommentId,
    },

    /// File attached
    AttachmentAdded {
        /// The attachment
        attachment: Attachment,
    },

    /// Attachment removed
    AttachmentRemoved {
        /// Attachment
        attachment_id: AttachmentId,
        /// Its file name, kept for the audit log
        file_name: String,
    },

    /// User started following
    FollowerAdded {
        /// Follower
        user_id: UserId,
    },

    /// User stopped following
    FollowerRemoved {
        /// Follower
        user_id: UserId,
    },

    /// Tag added
    TagAdded {
        /// Normalized tag
        tag: String,
    },

    /// Tag removed
    TagRemoved {
        /// Normalized tag
        tag: String,
    },

    /// Ticket and everything it owns deleted
    Deleted,
}

impl TicketEventKind {
    /// Stable name stored as the journal event type
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "ticket_created",
            Self::DetailsUpdated { .. } => "ticket_details_updated",
            Self::StatusChanged { .. } => "ticket_status_changed",
            Self::PriorityChanged { .. } => "ticket_priority_changed",
            Self::Assigned { .. } => "ticket_assigned",
            Self::Escalated { .. } => "ticket_escalated",
            Self::CommentAdded { .. } => "comment_added",
            Self::CommentEdited { .. } => "comment_edited",
            Self::CommentDeleted { .. } => "comment_deleted",
            Self::AttachmentAdded { .. } => "attachment_added",
            Self::AttachmentRemoved { .. } => "attachment_removed",
            Self::FollowerAdded { .. } => "follower_added",
            Self::FollowerRemoved { .. } => "follower_removed",
            Self::TagAdded { .. } => "tag_added",
            Self::TagRemoved { .. } => "tag_removed",
            Self::Deleted => "ticket_deleted",
        }
    }
}

impl TicketEvent {
    /// Create an event
    #[must_use]
    pub const fn new(
        ticket_id: TicketId,
        actor: UserId,
        occurred_at: DateTime<Utc>,
        kind: TicketEventKind,
    ) -> Self {
        Self {
            ticket_id,
            actor,
            occurred_at,
            kind,
        }
    }

    /// Serialize for the journal, streamed per ticket.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Serialization`] if encoding fails.
    pub fn to_record(&self) -> Result<JournalRecord, JournalError> {
        JournalRecord::encode(
            self.ticket_id.to_string(),
            self.kind.name(),
            self,
            self.occurred_at,
        )
    }

    /// Deserialize a journal record.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Serialization`] if the payload is not a ticket event.
    pub fn from_record(record: &JournalRecord) -> Result<Self, JournalError> {
        record.decode()
    }
}
