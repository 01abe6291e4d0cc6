//! Workflow rules: the status transition table, SLA targets and field
//! validation.
//!
//! ```text
//!            ┌──────────── assign / status ────────────┐
//!            │                                         ▼
//!  open ──► in_progress ◄──► waiting_on_customer ◄──► waiting_on_third_party
//!   │            │                  │                          │
//!   └────────────┴──────────► resolved ◄───────────────────────┘
//!                                │  ▲
//!                      close     │  └── in_progress
//!                                ▼
//!                             closed ──reopen──► reopened (behaves like open)
//! ```

use crate::types::{TicketError, TicketPriority, TicketStatus};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Longest accepted subject, in characters
pub const MAX_SUBJECT_CHARS: usize = 255;

/// Longest accepted tag, in characters
pub const MAX_TAG_CHARS: usize = 50;

/// Statuses reachable from `from` through a direct status update.
///
/// `closed` and `reopened` never appear: they are only reachable through the
/// close and reopen operations.
#[must_use]
pub const fn allowed_targets(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::{InProgress, Resolved, WaitingOnCustomer, WaitingOnThirdParty};

    match from {
        TicketStatus::Open | TicketStatus::Reopened => &[
            InProgress,
            WaitingOnCustomer,
            WaitingOnThirdParty,
            Resolved,
        ],
        TicketStatus::InProgress => &[WaitingOnCustomer, WaitingOnThirdParty, Resolved],
        TicketStatus::WaitingOnCustomer => &[InProgress, WaitingOnThirdParty, Resolved],
        TicketStatus::WaitingOnThirdParty => &[InProgress, WaitingOnCustomer, Resolved],
        TicketStatus::Resolved => &[InProgress],
        TicketStatus::Closed => &[],
    }
}

/// Whether a direct status update may move `from` to `to`.
#[must_use]
pub fn can_transition(from: TicketStatus, to: TicketStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Check a direct status update.
///
/// # Errors
///
/// Returns [`TicketError::Validation`] naming the allowed targets when the
/// edge is not in the table.
pub fn check_transition(from: TicketStatus, to: TicketStatus) -> Result<(), TicketError> {
    if can_transition(from, to) {
        return Ok(());
    }

    let hint = match to {
        TicketStatus::Closed => " (use the close operation)".to_string(),
        TicketStatus::Reopened => " (use the reopen operation)".to_string(),
        _ => {
            let allowed: Vec<&str> = allowed_targets(from)
                .iter()
                .map(|s| s.as_str())
                .collect();
            if allowed.is_empty() {
                String::new()
            } else {
                format!(" (allowed: {})", allowed.join(", "))
            }
        },
    };

    Err(TicketError::validation(format!(
        "Cannot change status from {from} to {to}{hint}"
    )))
}

/// Statuses from which a ticket may be closed.
#[must_use]
pub const fn can_close(from: TicketStatus) -> bool {
    matches!(from, TicketStatus::Resolved | TicketStatus::InProgress)
}

/// Assigning a ticket in one of these statuses moves it to `in_progress`.
#[must_use]
pub const fn assignment_starts_work(status: TicketStatus) -> bool {
    matches!(status, TicketStatus::Open | TicketStatus::Reopened)
}

/// Resolution targets per priority, in hours.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// Hours for `low`
    pub low_hours: u32,
    /// Hours for `medium`
    pub medium_hours: u32,
    /// Hours for `high`
    pub high_hours: u32,
    /// Hours for `urgent`
    pub urgent_hours: u32,
    /// Hours for `critical`
    pub critical_hours: u32,
}

impl SlaPolicy {
    /// Resolution target for `priority`
    #[must_use]
    pub fn resolution_time(&self, priority: TicketPriority) -> Duration {
        let hours = match priority {
            TicketPriority::Low => self.low_hours,
            TicketPriority::Medium => self.medium_hours,
            TicketPriority::High => self.high_hours,
            TicketPriority::Urgent => self.urgent_hours,
            TicketPriority::Critical => self.critical_hours,
        };
        Duration::hours(i64::from(hours))
    }
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            low_hours: 120,
            medium_hours: 72,
            high_hours: 24,
            urgent_hours: 8,
            critical_hours: 4,
        }
    }
}

/// Tunable workflow rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Prefix of generated ticket numbers (`TKT` gives `TKT-000001`)
    pub ticket_number_prefix: String,
    /// Highest escalation level
    pub max_escalation_level: u8,
    /// Default due dates
    pub sla: SlaPolicy,
}

impl WorkflowPolicy {
    /// Format the `sequence`-th ticket number.
    #[must_use]
    pub fn ticket_number(&self, sequence: u64) -> String {
        format!("{}-{sequence:06}", self.ticket_number_prefix)
    }
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            ticket_number_prefix: "TKT".to_string(),
            max_escalation_level: 3,
            sla: SlaPolicy::default(),
        }
    }
}

// ============================================================================
// Field validation
// ============================================================================

/// Trim and check a subject.
///
/// # Errors
///
/// Returns [`TicketError::Validation`] if the subject is blank or too long.
pub fn validate_subject(subject: &str) -> Result<String, TicketError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(TicketError::validation("Subject cannot be empty"));
    }
    let chars = subject.chars().count();
    if chars > MAX_SUBJECT_CHARS {
        return Err(TicketError::validation(format!(
            "Subject too long: {chars} characters (max {MAX_SUBJECT_CHARS})"
        )));
    }
    Ok(subject.to_string())
}

/// Trim and check an email address of the form `local@domain.tld`.
///
/// # Errors
///
/// Returns [`TicketError::Validation`] for anything else.
pub fn validate_email(email: &str) -> Result<String, TicketError> {
    let email = email.trim();
    let invalid = || TicketError::validation(format!("Invalid email address: {email}"));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .rsplit_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());

    if well_formed {
        Ok(email.to_string())
    } else {
        Err(invalid())
    }
}

/// Normalize a tag: trimmed, lower-cased, 1..=50 characters.
///
/// # Errors
///
/// Returns [`TicketError::Validation`] for blank or oversized tags.
pub fn normalize_tag(tag: &str) -> Result<String, TicketError> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return Err(TicketError::validation("Tag cannot be empty"));
    }
    if tag.chars().count() > MAX_TAG_CHARS {
        return Err(TicketError::validation(format!(
            "Tag too long (max {MAX_TAG_CHARS} characters)"
        )));
    }
    Ok(tag)
}

/// Trim text that must not be blank, such as a close resolution or a reopen reason.
///
/// # Errors
///
/// Returns [`TicketError::Validation`] mentioning `what` when blank.
pub fn required_text(value: &str, what: &str) -> Result<String, TicketError> {
    let value = value.trim();
    if value.is_empty() {
        Err(TicketError::validation(format!("{what} cannot be empty")))
    } else {
        Ok(value.to_string())
    }
}

/// Trim optional free text, mapping blank to `None`.
#[must_use]
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn closed_and_reopened_are_never_direct_targets() {
        for from in TicketStatus::ALL {
            assert!(!can_transition(from, TicketStatus::Closed));
            assert!(!can_transition(from, TicketStatus::Reopened));
        }
    }

    #[test]
    fn closed_is_terminal_for_status_updates() {
        assert!(allowed_targets(TicketStatus::Closed).is_empty());
        let err = check_transition(TicketStatus::Closed, TicketStatus::InProgress).unwrap_err();
        assert!(matches!(err, TicketError::Validation(_)));
    }

    #[test]
    fn reopened_behaves_like_open() {
        assert_eq!(
            allowed_targets(TicketStatus::Reopened),
            allowed_targets(TicketStatus::Open)
        );
        assert!(assignment_starts_work(TicketStatus::Reopened));
    }

    #[test]
    fn error_points_at_dedicated_operations() {
        let err = check_transition(TicketStatus::Resolved, TicketStatus::Closed).unwrap_err();
        assert!(err.to_string().contains("close operation"));
    }

    #[test]
    fn close_requires_resolved_or_in_progress() {
        assert!(can_close(TicketStatus::Resolved));
        assert!(can_close(TicketStatus::InProgress));
        assert!(!can_close(TicketStatus::Open));
        assert!(!can_close(TicketStatus::Closed));
    }

    #[test]
    fn ticket_numbers_are_zero_padded() {
        let policy = WorkflowPolicy::default();
        assert_eq!(policy.ticket_number(1), "TKT-000001");
        assert_eq!(policy.ticket_number(1_234_567), "TKT-1234567");
    }

    #[test]
    fn sla_targets_shrink_with_priority() {
        let sla = SlaPolicy::default();
        assert_eq!(sla.resolution_time(TicketPriority::High), Duration::hours(24));
        assert!(
            sla.resolution_time(TicketPriority::Critical)
                < sla.resolution_time(TicketPriority::Low)
        );
    }

    #[test]
    fn subject_rules() {
        assert_eq!(validate_subject("  Login Issue ").unwrap(), "Login Issue");
        assert!(validate_subject("   ").is_err());
        assert!(validate_subject(&"x".repeat(256)).is_err());
        assert!(validate_subject(&"x".repeat(255)).is_ok());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("jane@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jane doe@example.com").is_err());
        assert!(validate_email("jane@@example.com").is_err());
    }

    #[test]
    fn tags_are_normalized() {
        assert_eq!(normalize_tag("  VPN ").unwrap(), "vpn");
        assert!(normalize_tag("").is_err());
        assert!(normalize_tag(&"a".repeat(51)).is_err());
    }
}
