//! In-memory ticket state and event application.
//!
//! [`TicketState::apply`] is the only place that mutates tickets and their
//! sub-records. History entries are derived here from status, priority,
//! assignment, escalation and attachment events, so a change and its audit
//! record are always applied together.

use crate::events::{TicketEvent, TicketEventKind};
use crate::types::{
    Attachment, AttachmentId, Comment, CommentId, HistoryEntry, HistoryField, OrganizationId,
    Ticket, TicketError, TicketId, TicketStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use supportdesk_core::journal::{JournalError, StoredRecord};

/// State owned by the ticket store.
#[derive(Clone, Debug, Default)]
pub struct TicketState {
    /// Tickets by ID
    pub tickets: HashMap<TicketId, Ticket>,
    /// Comments per ticket, oldest first
    pub comments: HashMap<TicketId, Vec<Comment>>,
    /// Attachments per ticket, oldest first
    pub attachments: HashMap<TicketId, Vec<Attachment>>,
    /// Audit log per ticket, in `(changed_at, id)` order
    pub history: HashMap<TicketId, Vec<HistoryEntry>>,
    /// Last ticket-number counter value per organization
    pub number_sequences: HashMap<OrganizationId, u64>,
    /// Last history entry ID
    pub history_sequence: u64,
}

impl TicketState {
    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from journal records.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Serialization`] if a record is not a ticket event.
    pub fn replay(records: &[StoredRecord]) -> Result<Self, JournalError> {
        let mut state = Self::new();
        for stored in records {
            let event = TicketEvent::from_record(&stored.record)?;
            state.apply(&event);
        }
        Ok(state)
    }

    /// Ticket `id` if it belongs to `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::NotFound`] otherwise, so tickets of other
    /// organizations are indistinguishable from missing ones.
    pub fn ticket(
        &self,
        organization_id: OrganizationId,
        id: TicketId,
    ) -> Result<&Ticket, TicketError> {
        self.tickets
            .get(&id)
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| TicketError::not_found("Ticket", id))
    }

    /// Next ticket-number counter value for `organization_id`
    #[must_use]
    pub fn next_number_sequence(&self, organization_id: OrganizationId) -> u64 {
        self.number_sequences
            .get(&organization_id)
            .copied()
            .unwrap_or(0)
            + 1
    }

    /// Comments of `ticket_id`, oldest first
    #[must_use]
    pub fn comments_of(&self, ticket_id: TicketId) -> &[Comment] {
        self.comments.get(&ticket_id).map_or(&[], Vec::as_slice)
    }

    /// Comment `comment_id` of `ticket_id`
    #[must_use]
    pub fn comment(&self, ticket_id: TicketId, comment_id: CommentId) -> Option<&Comment> {
        self.comments_of(ticket_id)
            .iter()
            .find(|c| c.id == comment_id)
    }

    /// Attachments of `ticket_id`, oldest first
    #[must_use]
    pub fn attachments_of(&self, ticket_id: TicketId) -> &[Attachment] {
        self.attachments.get(&ticket_id).map_or(&[], Vec::as_slice)
    }

    /// Attachment `attachment_id` of `ticket_id`
    #[must_use]
    pub fn attachment(
        &self,
        ticket_id: TicketId,
        attachment_id: AttachmentId,
    ) -> Option<&Attachment> {
        self.attachments_of(ticket_id)
            .iter()
            .find(|a| a.id == attachment_id)
    }

    /// Audit log of `ticket_id`
    #[must_use]
    pub fn history_of(&self, ticket_id: TicketId) -> &[HistoryEntry] {
        self.history.get(&ticket_id).map_or(&[], Vec::as_slice)
    }

    /// Apply one event.
    ///
    /// Events for unknown tickets (other than `Created`) are ignored.
    pub fn apply(&mut self, event: &TicketEvent) {
        let at = event.occurred_at;
        let ticket_id = event.ticket_id;

        match &event.kind {
            TicketEventKind::Created {
                ticket,
                number_sequence,
            } => {
                let counter = self
                    .number_sequences
                    .entry(ticket.organization_id)
                    .or_insert(0);
                *counter = (*counter).max(*number_sequence);
                self.tickets.insert(ticket_id, (**ticket).clone());
            },

            TicketEventKind::Deleted => {
                self.tickets.remove(&ticket_id);
                self.comments.remove(&ticket_id);
                self.attachments.remove(&ticket_id);
                self.history.remove(&ticket_id);
            },

            kind => {
                let Some(ticket) = self.tickets.get_mut(&ticket_id) else {
                    tracing::warn!(%ticket_id, event = kind.name(), "Event for unknown ticket");
                    return;
                };
                ticket.updated_at = at;

                let change = Self::apply_to_ticket(ticket, kind, at);
                self.apply_to_children(ticket_id, kind, at);

                if let Some((field, old_value, new_value, note)) = change {
                    self.record_history(event, field, old_value, new_value, note);
                }
            },
        }
    }

    /// Mutate the ticket itself; returns the audit record to write, if any.
    #[allow(clippy::type_complexity)]
    fn apply_to_ticket(
        ticket: &mut Ticket,
        kind: &TicketEventKind,
        at: DateTime<Utc>,
    ) -> Option<(HistoryField, Option<String>, Option<String>, Option<String>)> {
        match kind {
            TicketEventKind::DetailsUpdated { details } => {
                ticket.subject.clone_from(&details.subject);
                ticket.description.clone_from(&details.description);
                ticket.category = details.category;
                ticket.requester_name.clone_from(&details.requester_name);
                ticket.requester_email.clone_from(&details.requester_email);
                ticket.due_date = details.due_date;
                None
            },

            TicketEventKind::StatusChanged { from, to, note } => {
                ticket.status = *to;
                match to {
                    TicketStatus::Resolved => {
                        ticket.resolved_at = Some(at);
                        if note.is_some() {
                            ticket.resolution_notes.clone_from(note);
                        }
                    },
                    TicketStatus::Closed => {
                        ticket.closed_at = Some(at);
                        ticket.resolved_at.get_or_insert(at);
                        if note.is_some() {
                            ticket.resolution_notes.clone_from(note);
                        }
                    },
                    TicketStatus::Reopened => {
                        ticket.resolved_at = None;
                        ticket.closed_at = None;
                    },
                    _ => {
                        ticket.resolved_at = None;
                    },
                }
                Some((
                    HistoryField::Status,
                    Some(from.as_str().to_string()),
                    Some(to.as_str().to_string()),
                    note.clone(),
                ))
            },

            TicketEventKind::PriorityChanged { from, to } => {
                ticket.priority = *to;
                Some((
                    HistoryField::Priority,
                    Some(from.as_str().to_string()),
                    Some(to.as_str().to_string()),
                    None,
                ))
            },

            TicketEventKind::Assigned { from, to } => {
                ticket.assigned_to_id = Some(*to);
                Some((
                    HistoryField::AssignedToId,
                    from.map(|id| id.to_string()),
                    Some(to.to_string()),
                    None,
                ))
            },

            TicketEventKind::Escalated { from, to, reason } => {
                ticket.escalation_level = *to;
                Some((
                    HistoryField::EscalationLevel,
                    Some(from.to_string()),
                    Some(to.to_string()),
                    Some(reason.clone()),
                ))
            },

            TicketEventKind::CommentAdded { comment } => {
                if !comment.is_internal && ticket.first_response_at.is_none() {
                    ticket.first_response_at = Some(comment.created_at);
                }
                if comment.is_resolution {
                    ticket.resolution_notes = Some(comment.content.clone());
                }
                None
            },

            TicketEventKind::AttachmentAdded { attachment } => Some((
                HistoryField::Attachment,
                None,
                Some(attachment.file_name.clone()),
                None,
            )),

            TicketEventKind::AttachmentRemoved { file_name, .. } => Some((
                HistoryField::Attachment,
                Some(file_name.clone()),
                None,
                None,
            )),

            TicketEventKind::FollowerAdded { user_id } => {
                ticket.followers.insert(*user_id);
                None
            },

            TicketEventKind::FollowerRemoved { user_id } => {
                ticket.followers.remove(user_id);
                None
            },

            TicketEventKind::TagAdded { tag } => {
                ticket.tags.insert(tag.clone());
                None
            },

            TicketEventKind::TagRemoved { tag } => {
                ticket.tags.remove(tag);
                None
            },

            TicketEventKind::CommentEdited { .. }
            | TicketEventKind::CommentDeleted { .. }
            | TicketEventKind::Created { .. }
            | TicketEventKind::Deleted => None,
        }
    }

    fn apply_to_children(&mut self, ticket_id: TicketId, kind: &TicketEventKind, at: DateTime<Utc>) {
        match kind {
            TicketEventKind::CommentAdded { comment } => {
                self.comments
                    .entry(ticket_id)
                    .or_default()
                    .push(comment.clone());
            },
            TicketEventKind::CommentEdited {
                comment_id,
                content,
                is_internal,
            } => {
                if let Some(comment) = self
                    .comments
                    .get_mut(&ticket_id)
                    .and_then(|list| list.iter_mut().find(|c| c.id == *comment_id))
                {
                    comment.content.clone_from(content);
                    comment.is_internal = *is_internal;
                    comment.updated_at = at;
                }
            },
            TicketEventKind::CommentDeleted { comment_id } => {
                if let Some(list) = self.comments.get_mut(&ticket_id) {
                    list.retain(|c| c.id != *comment_id);
                }
            },
            TicketEventKind::AttachmentAdded { attachment } => {
                self.attachments
                    .entry(ticket_id)
                    .or_default()
                    .push(attachment.clone());
            },
            TicketEventKind::AttachmentRemoved { attachment_id, .. } => {
                if let Some(list) = self.attachments.get_mut(&ticket_id) {
                    list.retain(|a| a.id != *attachment_id);
                }
            },
            _ => {},
        }
    }

    fn record_history(
        &mut self,
        event: &TicketEvent,
        field: HistoryField,
        old_value: Option<String>,
        new_value: Option<String>,
        note: Option<String>,
    ) {
        self.history_sequence += 1;
        let entry = HistoryEntry {
            id: self.history_sequence,
            ticket_id: event.ticket_id,
            field,
            old_value,
            new_value,
            note,
            changed_by: event.actor,
            changed_at: event.occurred_at,
        };

        let log = self.history.entry(event.ticket_id).or_default();
        // Keep (changed_at, id) order even if a clock steps backwards.
        let position = log.partition_point(|e| (e.changed_at, e.id) <= (entry.changed_at, entry.id));
        log.insert(position, entry);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{TicketCategory, TicketPriority, UserId};
    use chrono::Duration;
    use std::collections::BTreeSet;
    use supportdesk_core::journal::JournalRecord;
    use uuid::Uuid;

    fn ticket(org: OrganizationId, number: &str, at: DateTime<Utc>) -> Ticket {
        Ticket {
            id: TicketId::from_uuid(Uuid::new_v4()),
            organization_id: org,
            ticket_number: number.to_string(),
            subject: "Printer on fire".to_string(),
            description: None,
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            category: TicketCategory::General,
            requester_name: None,
            requester_email: None,
            assigned_to_id: None,
            created_by: UserId::from_uuid(Uuid::new_v4()),
            escalation_level: 0,
            due_date: None,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            resolution_notes: None,
            tags: BTreeSet::new(),
            followers: BTreeSet::new(),
            created_at: at,
            updated_at: at,
        }
    }

    fn created(t: &Ticket, sequence: u64) -> TicketEvent {
        TicketEvent::new(
            t.id,
            t.created_by,
            t.created_at,
            TicketEventKind::Created {
                ticket: Box::new(t.clone()),
                number_sequence: sequence,
            },
        )
    }

    #[test]
    fn status_changes_write_history_and_timestamps() {
        let org = OrganizationId::from_uuid(Uuid::new_v4());
        let now = Utc::now();
        let t = ticket(org, "TKT-000001", now);
        let mut state = TicketState::new();
        state.apply(&created(&t, 1));

        let later = now + Duration::hours(1);
        state.apply(&TicketEvent::new(
            t.id,
            t.created_by,
            later,
            TicketEventKind::StatusChanged {
                from: TicketStatus::Open,
                to: TicketStatus::Resolved,
                note: None,
            },
        ));

        let stored = state.ticket(org, t.id).unwrap();
        assert_eq!(stored.status, TicketStatus::Resolved);
        assert_eq!(stored.resolved_at, Some(later));
        assert_eq!(stored.updated_at, later);

        let history = state.history_of(t.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_value.as_deref(), Some("open"));
        assert_eq!(history[0].new_value.as_deref(), Some("resolved"));
    }

    #[test]
    fn other_organizations_see_not_found() {
        let org = OrganizationId::from_uuid(Uuid::new_v4());
        let t = ticket(org, "TKT-000001", Utc::now());
        let mut state = TicketState::new();
        state.apply(&created(&t, 1));

        let other = OrganizationId::from_uuid(Uuid::new_v4());
        assert!(matches!(
            state.ticket(other, t.id),
            Err(TicketError::NotFound { .. })
        ));
    }

    #[test]
    fn deletion_cascades_but_keeps_number_counter() {
        let org = OrganizationId::from_uuid(Uuid::new_v4());
        let now = Utc::now();
        let t = ticket(org, "TKT-000007", now);
        let mut state = TicketState::new();
        state.apply(&created(&t, 7));
        state.apply(&TicketEvent::new(
            t.id,
            t.created_by,
            now,
            TicketEventKind::PriorityChanged {
                from: TicketPriority::Medium,
                to: TicketPriority::High,
            },
        ));
        state.apply(&TicketEvent::new(t.id, t.created_by, now, TicketEventKind::Deleted));

        assert!(state.tickets.is_empty());
        assert!(state.history_of(t.id).is_empty());
        assert_eq!(state.next_number_sequence(org), 8);
    }

    #[test]
    fn history_stays_ordered_by_time_then_sequence() {
        let org = OrganizationId::from_uuid(Uuid::new_v4());
        let now = Utc::now();
        let t = ticket(org, "TKT-000001", now);
        let mut state = TicketState::new();
        state.apply(&created(&t, 1));

        for (offset, to) in [(10, TicketPriority::High), (5, TicketPriority::Low)] {
            state.apply(&TicketEvent::new(
                t.id,
                t.created_by,
                now + Duration::seconds(offset),
                TicketEventKind::PriorityChanged {
                    from: TicketPriority::Medium,
                    to,
                },
            ));
        }

        let history = state.history_of(t.id);
        assert_eq!(history[0].new_value.as_deref(), Some("low"));
        assert_eq!(history[0].id, 2);
        assert_eq!(history[1].id, 1);
    }

    #[test]
    fn replay_rebuilds_counters_and_history() {
        let org = OrganizationId::from_uuid(Uuid::new_v4());
        let now = Utc::now();
        let t = ticket(org, "TKT-000003", now);
        let events = [
            created(&t, 3),
            TicketEvent::new(
                t.id,
                t.created_by,
                now,
                TicketEventKind::Escalated {
                    from: 0,
                    to: 2,
                    reason: "VIP customer".to_string(),
                },
            ),
        ];
        let records: Vec<StoredRecord> = events
            .iter()
            .enumerate()
            .map(|(i, e)| StoredRecord {
                sequence: i64::try_from(i).unwrap() + 1,
                record: e.to_record().unwrap(),
            })
            .collect();

        let state = TicketState::replay(&records).unwrap();
        assert_eq!(state.next_number_sequence(org), 4);
        assert_eq!(state.ticket(org, t.id).unwrap().escalation_level, 2);
        assert_eq!(state.history_of(t.id)[0].note.as_deref(), Some("VIP customer"));
        assert_eq!(state.history_sequence, 1);
    }

    #[test]
    fn replay_rejects_foreign_records() {
        let records = vec![StoredRecord {
            sequence: 1,
            record: JournalRecord {
                stream_id: "x".to_string(),
                event_type: "unknown".to_string(),
                payload: serde_json::json!({"nope": true}),
                recorded_at: Utc::now(),
            },
        }];
        assert!(TicketState::replay(&records).is_err());
    }
}
