//! Read side: filtering, sorting and pagination over [`TicketState`].
//!
//! Queries run against a read lock on the store's state and never touch the
//! journal.

use crate::state::TicketState;
use crate::types::{
    Attachment, Comment, HistoryEntry, OrganizationId, Ticket, TicketCategory, TicketError,
    TicketId, TicketPriority, TicketStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// Largest page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size when none is requested
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const fn default_page() -> u32 {
    1
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// 1-based page request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    /// Page number, starting at 1
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page, 1..=100
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PageParams {
    /// Check bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Validation`] for page 0 or a page size outside 1..=100.
    pub fn validate(self) -> Result<Self, TicketError> {
        if self.page == 0 {
            return Err(TicketError::validation("page must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(TicketError::validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(self)
    }

    fn offset(self) -> usize {
        (self.page as usize - 1).saturating_mul(self.page_size as usize)
    }
}

/// One page of results
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Items across all pages
    pub total: usize,
    /// This page
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Number of pages (0 when there are no items)
    pub pages: u32,
    /// Whether a later page exists
    pub has_next: bool,
    /// Whether an earlier page exists
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Cut `params`'s page out of `items`.
    #[must_use]
    pub fn paginate(items: Vec<T>, params: PageParams) -> Self {
        let total = items.len();
        let pages = u32::try_from(total.div_ceil(params.page_size as usize)).unwrap_or(u32::MAX);
        let items: Vec<T> = items
            .into_iter()
            .skip(params.offset())
            .take(params.page_size as usize)
            .collect();

        Self {
            items,
            total,
            page: params.page,
            page_size: params.page_size,
            pages,
            has_next: params.page < pages,
            has_prev: params.page > 1,
        }
    }
}

/// Ticket list filters; all optional, combined with AND
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    /// Exact status
    #[serde(default)]
    pub status: Option<TicketStatus>,
    /// Exact priority
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    /// Exact category
    #[serde(default)]
    pub category: Option<TicketCategory>,
    /// Exact assignee
    #[serde(default)]
    pub assigned_to_id: Option<UserId>,
    /// Case-insensitive substring of subject, description or ticket number
    #[serde(default)]
    pub search: Option<String>,
}

impl TicketFilter {
    fn matches(&self, ticket: &Ticket, needle: Option<&str>) -> bool {
        self.status.is_none_or(|s| ticket.status == s)
            && self.priority.is_none_or(|p| ticket.priority == p)
            && self.category.is_none_or(|c| ticket.category == c)
            && self
                .assigned_to_id
                .is_none_or(|a| ticket.assigned_to_id == Some(a))
            && needle.is_none_or(|needle| {
                ticket.subject.to_lowercase().contains(needle)
                    || ticket.ticket_number.to_lowercase().contains(needle)
                    || ticket
                        .description
                        .as_ref()
                        .is_some_and(|d| d.to_lowercase().contains(needle))
            })
    }
}

/// Newest first; ticket number breaks ties
fn newest_first(a: &Ticket, b: &Ticket) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.ticket_number.cmp(&a.ticket_number))
}

/// Tickets of `organization_id` matching `filter`, newest first.
#[must_use]
pub fn list_tickets(
    state: &TicketState,
    organization_id: OrganizationId,
    filter: &TicketFilter,
    params: PageParams,
) -> Page<Ticket> {
    let needle = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut tickets: Vec<Ticket> = state
        .tickets
        .values()
        .filter(|t| t.organization_id == organization_id)
        .filter(|t| filter.matches(t, needle.as_deref()))
        .cloned()
        .collect();
    tickets.sort_by(newest_first);

    Page::paginate(tickets, params)
}

/// A single ticket.
///
/// # Errors
///
/// Returns [`TicketError::NotFound`] if it does not exist in the organization.
pub fn get_ticket(
    state: &TicketState,
    organization_id: OrganizationId,
    ticket_id: TicketId,
) -> Result<Ticket, TicketError> {
    state.ticket(organization_id, ticket_id).cloned()
}

/// Comments on a ticket, oldest first.
///
/// # Errors
///
/// Returns [`TicketError::NotFound`] if the ticket does not exist in the organization.
pub fn list_comments(
    state: &TicketState,
    organization_id: OrganizationId,
    ticket_id: TicketId,
    include_internal: bool,
    params: PageParams,
) -> Result<Page<Comment>, TicketError> {
    state.ticket(organization_id, ticket_id)?;
    let comments: Vec<Comment> = state
        .comments_of(ticket_id)
        .iter()
        .filter(|c| include_internal || !c.is_internal)
        .cloned()
        .collect();
    Ok(Page::paginate(comments, params))
}

/// Attachments of a ticket, in upload order.
///
/// # Errors
///
/// Returns [`TicketError::NotFound`] if the ticket does not exist in the organization.
pub fn list_attachments(
    state: &TicketState,
    organization_id: OrganizationId,
    ticket_id: TicketId,
) -> Result<Vec<Attachment>, TicketError> {
    state.ticket(organization_id, ticket_id)?;
    Ok(state.attachments_of(ticket_id).to_vec())
}

/// Audit log of a ticket, oldest change first.
///
/// # Errors
///
/// Returns [`TicketError::NotFound`] if the ticket does not exist in the organization.
pub fn ticket_history(
    state: &TicketState,
    organization_id: OrganizationId,
    ticket_id: TicketId,
) -> Result<Vec<HistoryEntry>, TicketError> {
    state.ticket(organization_id, ticket_id)?;
    Ok(state.history_of(ticket_id).to_vec())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn org() -> OrganizationId {
        OrganizationId::from_uuid(Uuid::from_u128(1))
    }

    fn ticket(n: u64, subject: &str, status: TicketStatus) -> Ticket {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + Duration::minutes(i64::try_from(n).unwrap());
        Ticket {
            id: TicketId::from_uuid(Uuid::from_u128(u128::from(n))),
            organization_id: org(),
            ticket_number: format!("TKT-{n:06}"),
            subject: subject.to_string(),
            description: None,
            status,
            priority: TicketPriority::Medium,
            category: TicketCategory::General,
            requester_name: None,
            requester_email: None,
            assigned_to_id: None,
            created_by: UserId::from_uuid(Uuid::from_u128(9)),
            escalation_level: 0,
            due_date: None,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            resolution_notes: None,
            tags: BTreeSet::new(),
            followers: BTreeSet::new(),
            created_at: created,
            updated_at: created,
        }
    }

    fn state_with(tickets: Vec<Ticket>) -> TicketState {
        let mut state = TicketState::new();
        for t in tickets {
            state.tickets.insert(t.id, t);
        }
        state
    }

    #[test]
    fn page_bounds_are_validated() {
        assert!(PageParams { page: 0, page_size: 20 }.validate().is_err());
        assert!(PageParams { page: 1, page_size: 0 }.validate().is_err());
        assert!(PageParams { page: 1, page_size: 101 }.validate().is_err());
        assert!(PageParams { page: 3, page_size: 100 }.validate().is_ok());
    }

    #[test]
    fn pagination_metadata() {
        let page = Page::paginate((1..=45).collect::<Vec<_>>(), PageParams {
            page: 3,
            page_size: 20,
        });
        assert_eq!(page.items, (41..=45).collect::<Vec<_>>());
        assert_eq!(page.total, 45);
        assert_eq!(page.pages, 3);
        assert!(!page.has_next);
        assert!(page.has_prev);

        let empty = Page::<u8>::paginate(Vec::new(), PageParams::default());
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }

    #[test]
    fn list_sorts_newest_first_and_filters() {
        let state = state_with(vec![
            ticket(1, "Login Issue", TicketStatus::Open),
            ticket(2, "Printer jam", TicketStatus::InProgress),
            ticket(3, "Cannot login on mobile", TicketStatus::Open),
        ]);

        let all = list_tickets(&state, org(), &TicketFilter::default(), PageParams::default());
        let numbers: Vec<_> = all.items.iter().map(|t| t.ticket_number.as_str()).collect();
        assert_eq!(numbers, vec!["TKT-000003", "TKT-000002", "TKT-000001"]);

        let filter = TicketFilter {
            search: Some("LOGIN".to_string()),
            status: Some(TicketStatus::Open),
            ..TicketFilter::default()
        };
        let found = list_tickets(&state, org(), &filter, PageParams::default());
        assert_eq!(found.total, 2);

        let by_number = TicketFilter {
            search: Some("tkt-000002".to_string()),
            ..TicketFilter::default()
        };
        assert_eq!(
            list_tickets(&state, org(), &by_number, PageParams::default()).total,
            1
        );
    }

    #[test]
    fn other_organizations_are_invisible() {
        let state = state_with(vec![ticket(1, "x", TicketStatus::Open)]);
        let stranger = OrganizationId::from_uuid(Uuid::from_u128(2));
        assert_eq!(
            list_tickets(&state, stranger, &TicketFilter::default(), PageParams::default()).total,
            0
        );
        assert!(matches!(
            get_ticket(&state, stranger, TicketId::from_uuid(Uuid::from_u128(1))),
            Err(TicketError::NotFound { .. })
        ));
    }
}
