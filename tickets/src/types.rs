//! Domain types for the support ticket workflow.
//!
//! Value objects, entities and the error type shared by the reducer, the
//! read-side queries and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Wrap an existing `Uuid` as a `", stringify!($name), "`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a ticket
    TicketId
);
uuid_id!(
    /// Tenant a ticket belongs to
    OrganizationId
);
uuid_id!(
    /// A user: agent, requester or follower
    UserId
);
uuid_id!(
    /// Unique identifier for a comment
    CommentId
);
uuid_id!(
    /// Unique identifier for an attachment
    AttachmentId
);

/// Who is performing a command.
///
/// Attached by the API layer from the verified bearer token; the workflow
/// trusts it as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user
    pub user_id: UserId,
    /// Organization the user acts for
    pub organization_id: OrganizationId,
}

impl Actor {
    /// Create an actor
    #[must_use]
    pub const fn new(user_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Lifecycle status of a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Newly created, nobody working on it
    Open,
    /// An agent is working on it
    InProgress,
    /// Blocked on the requester
    WaitingOnCustomer,
    /// Blocked on an external party
    WaitingOnThirdParty,
    /// Fixed, awaiting closure
    Resolved,
    /// Finished; only `reopen` leaves this state
    Closed,
    /// Closed and then reopened; behaves like `Open`
    Reopened,
}

impl TicketStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::InProgress,
        Self::WaitingOnCustomer,
        Self::WaitingOnThirdParty,
        Self::Resolved,
        Self::Closed,
        Self::Reopened,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::WaitingOnCustomer => "waiting_on_customer",
            Self::WaitingOnThirdParty => "waiting_on_third_party",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
        }
    }

    /// Still needs work (neither resolved nor closed)
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Resolved | Self::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket priority, ordered from least to most urgent
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    /// Low
    Low,
    /// Medium (default)
    #[default]
    Medium,
    /// High
    High,
    /// Urgent
    Urgent,
    /// Critical
    Critical,
}

impl TicketPriority {
    /// Every priority, least urgent first
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Urgent,
        Self::Critical,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a ticket is about
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    /// General question (default)
    #[default]
    General,
    /// Technical problem
    Technical,
    /// Billing question
    Billing,
    /// Sales enquiry
    Sales,
    /// Feature request
    FeatureRequest,
    /// Bug report
    BugReport,
    /// Anything else
    Other,
}

impl TicketCategory {
    /// Every category
    pub const ALL: [Self; 7] = [
        Self::General,
        Self::Technical,
        Self::Billing,
        Self::Sales,
        Self::FeatureRequest,
        Self::BugReport,
        Self::Other,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Technical => "technical",
            Self::Billing => "billing",
            Self::Sales => "sales",
            Self::FeatureRequest => "feature_request",
            Self::BugReport => "bug_report",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A support ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Owning organization; never changes
    pub organization_id: OrganizationId,
    /// Human-readable number, unique per organization; never changes
    pub ticket_number: String,
    /// Short summary
    pub subject: String,
    /// Longer description
    pub description: Option<String>,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Priority
    pub priority: TicketPriority,
    /// Category
    pub category: TicketCategory,
    /// Name of the person who raised the ticket
    pub requester_name: Option<String>,
    /// Email of the person who raised the ticket
    pub requester_email: Option<String>,
    /// Assigned agent
    pub assigned_to_id: Option<UserId>,
    /// User who created the ticket
    pub created_by: UserId,
    /// 0 when not escalated
    pub escalation_level: u8,
    /// Resolution deadline
    pub due_date: Option<DateTime<Utc>>,
    /// First public (non-internal) comment
    pub first_response_at: Option<DateTime<Utc>>,
    /// When the ticket was resolved; cleared when work resumes
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the ticket was closed; cleared on reopen
    pub closed_at: Option<DateTime<Utc>>,
    /// Resolution text recorded on close or by a resolution comment
    pub resolution_notes: Option<String>,
    /// Normalized tags
    pub tags: BTreeSet<String>,
    /// Users following the ticket
    pub followers: BTreeSet<UserId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification of the ticket or its sub-records
    pub updated_at: DateTime<Utc>,
}

/// A comment on a ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment ID
    pub id: CommentId,
    /// Parent ticket
    pub ticket_id: TicketId,
    /// Author
    pub author_id: UserId,
    /// Body, never blank
    pub content: String,
    /// Only visible to agents
    pub is_internal: bool,
    /// Carries the ticket's resolution
    pub is_resolution: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit
    pub updated_at: DateTime<Utc>,
}

/// Metadata of an uploaded file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment ID
    pub id: AttachmentId,
    /// Parent ticket
    pub ticket_id: TicketId,
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub content_type: String,
    /// Size of the stored bytes
    pub size_bytes: u64,
    /// Key of the bytes in the attachment store
    pub storage_key: String,
    /// Optional description
    pub description: Option<String>,
    /// Uploader
    pub uploaded_by: UserId,
    /// Upload time
    pub created_at: DateTime<Utc>,
}

/// Field tracked by the audit log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryField {
    /// Status transitions
    Status,
    /// Priority changes
    Priority,
    /// Assignment changes
    AssignedToId,
    /// Escalations
    EscalationLevel,
    /// Attachment uploads and removals
    Attachment,
}

/// One field-level change in a ticket's audit log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Global, strictly increasing sequence
    pub id: u64,
    /// Ticket the change belongs to
    pub ticket_id: TicketId,
    /// Changed field
    pub field: HistoryField,
    /// Value before the change
    pub old_value: Option<String>,
    /// Value after the change
    pub new_value: Option<String>,
    /// Reason or resolution text, where one was given
    pub note: Option<String>,
    /// Who made the change
    pub changed_by: UserId,
    /// When the change happened
    pub changed_at: DateTime<Utc>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by ticket commands and queries
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TicketError {
    /// The ticket or sub-record does not exist in the caller's organization
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record
        resource: String,
        /// Requested identifier
        id: String,
    },

    /// Input is malformed or the operation is not allowed in the current state
    #[error("{0}")]
    Validation(String),

    /// The request conflicts with existing data (e.g. a duplicate tag)
    #[error("{0}")]
    Conflict(String),

    /// The request itself is unusable (e.g. an empty batch)
    #[error("{0}")]
    InvalidRequest(String),

    /// Events could not be prepared for the journal
    #[error("Could not record events: {0}")]
    Persistence(String),
}

impl TicketError {
    /// `NotFound` for `resource` with `id`
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    /// `Validation` with `message`
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short label for metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Persistence(_) => "persistence",
        }
    }
}
