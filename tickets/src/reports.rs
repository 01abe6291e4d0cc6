//! Ticket metrics computed on demand from the current state.
//!
//! Nothing here is cached; each report walks the organization's tickets once.

use crate::state::TicketState;
use crate::types::{
    OrganizationId, Ticket, TicketCategory, TicketPriority, TicketStatus, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Counts across the whole ticket base
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    /// All tickets
    pub total: usize,
    /// Per status, every status present
    pub by_status: BTreeMap<String, usize>,
    /// Per priority, every priority present
    pub by_priority: BTreeMap<String, usize>,
    /// Per category, every category present
    pub by_category: BTreeMap<String, usize>,
    /// Tickets without an assignee
    pub unassigned: usize,
    /// Active tickets past their due date
    pub overdue: usize,
    /// Tickets with an escalation level above 0
    pub escalated: usize,
}

/// SLA compliance figures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaReport {
    /// Tickets carrying a due date
    pub tickets_with_due_date: usize,
    /// Resolved on or before the due date
    pub resolved_within_sla: usize,
    /// Resolved after the due date
    pub resolved_late: usize,
    /// Active and already past the due date
    pub open_breached: usize,
    /// `resolved_within_sla` over all resolved tickets with a due date, in percent
    pub sla_compliance_percent: Option<f64>,
    /// Mean of `resolved_at - created_at`
    pub average_resolution_hours: Option<f64>,
    /// Mean of `first_response_at - created_at`
    pub average_first_response_hours: Option<f64>,
}

/// Workload and throughput of one agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    /// Agent
    pub agent_id: UserId,
    /// Tickets currently assigned
    pub assigned: usize,
    /// Of those, still active
    pub open: usize,
    /// Of those, resolved or closed
    pub resolved: usize,
    /// Mean resolution time of the resolved ones
    pub average_resolution_hours: Option<f64>,
}

fn tickets_of(
    state: &TicketState,
    organization_id: OrganizationId,
) -> impl Iterator<Item = &Ticket> {
    state
        .tickets
        .values()
        .filter(move |t| t.organization_id == organization_id)
}

fn is_done(ticket: &Ticket) -> bool {
    matches!(ticket.status, TicketStatus::Resolved | TicketStatus::Closed)
}

fn is_breached(ticket: &Ticket, now: DateTime<Utc>) -> bool {
    ticket.status.is_active() && ticket.due_date.is_some_and(|due| due < now)
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

#[allow(clippy::cast_precision_loss)]
fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(round2(samples.iter().sum::<f64>() / samples.len() as f64))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn zeroed<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    keys.map(|k| (k.to_string(), 0)).collect()
}

/// Overview counts for an organization.
#[must_use]
pub fn overview(state: &TicketState, organization_id: OrganizationId, now: DateTime<Utc>) -> Overview {
    let mut report = Overview {
        total: 0,
        by_status: zeroed(TicketStatus::ALL.iter().map(|s| s.as_str())),
        by_priority: zeroed(TicketPriority::ALL.iter().map(|p| p.as_str())),
        by_category: zeroed(TicketCategory::ALL.iter().map(|c| c.as_str())),
        unassigned: 0,
        overdue: 0,
        escalated: 0,
    };

    for ticket in tickets_of(state, organization_id) {
        report.total += 1;
        *report
            .by_status
            .entry(ticket.status.as_str().to_string())
            .or_default() += 1;
        *report
            .by_priority
            .entry(ticket.priority.as_str().to_string())
            .or_default() += 1;
        *report
            .by_category
            .entry(ticket.category.as_str().to_string())
            .or_default() += 1;
        if ticket.assigned_to_id.is_none() {
            report.unassigned += 1;
        }
        if is_breached(ticket, now) {
            report.overdue += 1;
        }
        if ticket.escalation_level > 0 {
            report.escalated += 1;
        }
    }

    report
}

/// SLA figures for an organization.
#[must_use]
pub fn sla(state: &TicketState, organization_id: OrganizationId, now: DateTime<Utc>) -> SlaReport {
    let mut report = SlaReport {
        tickets_with_due_date: 0,
        resolved_within_sla: 0,
        resolved_late: 0,
        open_breached: 0,
        sla_compliance_percent: None,
        average_resolution_hours: None,
        average_first_response_hours: None,
    };
    let mut resolution = Vec::new();
    let mut first_response = Vec::new();

    for ticket in tickets_of(state, organization_id) {
        if let Some(resolved_at) = ticket.resolved_at {
            resolution.push(hours_between(ticket.created_at, resolved_at));
        }
        if let Some(responded_at) = ticket.first_response_at {
            first_response.push(hours_between(ticket.created_at, responded_at));
        }

        let Some(due) = ticket.due_date else {
            continue;
        };
        report.tickets_with_due_date += 1;
        match ticket.resolved_at {
            Some(resolved_at) if resolved_at <= due => report.resolved_within_sla += 1,
            Some(_) => report.resolved_late += 1,
            None if is_breached(ticket, now) => report.open_breached += 1,
            None => {},
        }
    }

    let resolved_with_due = report.resolved_within_sla + report.resolved_late;
    if resolved_with_due > 0 {
        #[allow(clippy::cast_precision_loss)]
        let percent = report.resolved_within_sla as f64 / resolved_with_due as f64 * 100.0;
        report.sla_compliance_percent = Some(round2(percent));
    }
    report.average_resolution_hours = mean(&resolution);
    report.average_first_response_hours = mean(&first_response);

    report
}

/// One row per assignee, most resolved first.
#[must_use]
pub fn agent_performance(
    state: &TicketState,
    organization_id: OrganizationId,
) -> Vec<AgentPerformance> {
    #[derive(Default)]
    struct Tally {
        assigned: usize,
        open: usize,
        resolved: usize,
        resolution_hours: Vec<f64>,
    }

    let mut tallies: HashMap<UserId, Tally> = HashMap::new();
    for ticket in tickets_of(state, organization_id) {
        let Some(agent) = ticket.assigned_to_id else {
            continue;
        };
        let tally = tallies.entry(agent).or_default();
        tally.assigned += 1;
        if ticket.status.is_active() {
            tally.open += 1;
        }
        if is_done(ticket) {
            tally.resolved += 1;
            if let Some(resolved_at) = ticket.resolved_at {
                tally
                    .resolution_hours
                    .push(hours_between(ticket.created_at, resolved_at));
            }
        }
    }

    let mut rows: Vec<AgentPerformance> = tallies
        .into_iter()
        .map(|(agent_id, tally)| AgentPerformance {
            agent_id,
            assigned: tally.assigned,
            open: tally.open,
            resolved: tally.resolved,
            average_resolution_hours: mean(&tally.resolution_hours),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.resolved
            .cmp(&a.resolved)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
    rows
}
