//! Property tests: random command sequences never break the workflow rules.

#![allow(clippy::unwrap_used, missing_docs)]

use proptest::prelude::*;
use std::sync::Arc;
use supportdesk_core::effect::Effect;
use supportdesk_core::journal::{JournalRecord, StoredRecord};
use supportdesk_core::reducer::Reducer;
use supportdesk_runtime::InMemoryJournal;
use supportdesk_testing::{test_clock, SequentialIds};
use supportdesk_tickets::aggregate::NewTicket;
use supportdesk_tickets::queries::{self, PageParams, TicketFilter};
use supportdesk_tickets::types::{Actor, HistoryField, OrganizationId, TicketId, UserId};
use supportdesk_tickets::workflow::{self, WorkflowPolicy};
use supportdesk_tickets::{
    TicketAction, TicketCommand, TicketEnvironment, TicketPriority, TicketReducer, TicketState,
    TicketStatus,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Status(TicketStatus),
    Close,
    Reopen,
    Assign,
    Escalate(u8),
    Priority(TicketPriority),
}

fn status() -> impl Strategy<Value = TicketStatus> {
    prop::sample::select(TicketStatus::ALL.to_vec())
}

fn priority() -> impl Strategy<Value = TicketPriority> {
    prop::sample::select(vec![
        TicketPriority::Low,
        TicketPriority::Medium,
        TicketPriority::High,
        TicketPriority::Urgent,
        TicketPriority::Critical,
    ])
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => status().prop_map(Op::Status),
        1 => Just(Op::Close),
        1 => Just(Op::Reopen),
        1 => Just(Op::Assign),
        1 => (0u8..8).prop_map(Op::Escalate),
        1 => priority().prop_map(Op::Priority),
    ]
}

fn env() -> TicketEnvironment {
    TicketEnvironment::new(
        Arc::new(test_clock()),
        Arc::new(SequentialIds::new()),
        Arc::new(InMemoryJournal::new()),
        WorkflowPolicy::default(),
    )
}

fn actor() -> Actor {
    Actor::new(
        UserId::from_uuid(Uuid::from_u128(7)),
        OrganizationId::from_uuid(Uuid::from_u128(9)),
    )
}

fn command(op: &Op, ticket_id: TicketId) -> TicketCommand {
    match op.clone() {
        Op::Status(status) => TicketCommand::ChangeStatus { ticket_id, status },
        Op::Close => TicketCommand::Close {
            ticket_id,
            resolution: "Done".to_string(),
        },
        Op::Reopen => TicketCommand::Reopen {
            ticket_id,
            reason: "Not done".to_string(),
        },
        Op::Assign => TicketCommand::Assign {
            ticket_id,
            assigned_to_id: UserId::from_uuid(Uuid::from_u128(42)),
        },
        Op::Escalate(level) => TicketCommand::Escalate {
            ticket_id,
            reason: "Customer waiting".to_string(),
            level,
        },
        Op::Priority(priority) => TicketCommand::SetPriority {
            ticket_id,
            priority,
        },
    }
}

fn collect_records(effects: &[Effect<TicketAction>], out: &mut Vec<JournalRecord>) {
    for effect in effects {
        match effect {
            Effect::Append { records, .. } => out.extend(records.iter().cloned()),
            Effect::Parallel(inner) | Effect::Sequential(inner) => collect_records(inner, out),
            Effect::None | Effect::Future(_) => {},
        }
    }
}

/// Run `command` and return the records it would journal (empty when rejected).
fn run(
    state: &mut TicketState,
    env: &TicketEnvironment,
    command: TicketCommand,
) -> Vec<JournalRecord> {
    let action = TicketAction::command(Uuid::new_v4(), actor(), command);
    let effects = TicketReducer.reduce(state, action, env);
    let mut records = Vec::new();
    collect_records(&effects, &mut records);
    records
}

proptest! {
    #[test]
    fn status_only_moves_along_allowed_edges(ops in prop::collection::vec(op(), 1..40)) {
        let env = env();
        let mut state = TicketState::new();
        let mut journal = run(
            &mut state,
            &env,
            TicketCommand::Create(NewTicket {
                subject: "Property".to_string(),
                ..NewTicket::default()
            }),
        );
        let ticket_id = *state.tickets.keys().next().unwrap();

        for op in &ops {
            let before = state.tickets[&ticket_id].clone();
            let history_before = state.history_of(ticket_id).len();
            let records = run(&mut state, &env, command(op, ticket_id));
            let after = &state.tickets[&ticket_id];

            if records.is_empty() {
                prop_assert_eq!(&before, after, "rejected {:?} changed the ticket", op);
                continue;
            }
            journal.extend(records);

            if before.status != after.status {
                let legal = match after.status {
                    TicketStatus::Closed => workflow::can_close(before.status),
                    TicketStatus::Reopened => before.status == TicketStatus::Closed,
                    TicketStatus::InProgress if matches!(op, Op::Assign) => {
                        before.status == TicketStatus::Open
                            || workflow::can_transition(before.status, after.status)
                    },
                    to => workflow::can_transition(before.status, to),
                };
                prop_assert!(legal, "{:?} -> {:?} via {:?}", before.status, after.status, op);
            }

            let status_entries: Vec<_> = state.history_of(ticket_id)[history_before..]
                .iter()
                .filter(|entry| entry.field == HistoryField::Status)
                .collect();
            if before.status == after.status {
                prop_assert!(status_entries.is_empty());
            } else {
                prop_assert_eq!(status_entries.len(), 1);
                prop_assert_eq!(status_entries[0].old_value.as_deref(), Some(before.status.as_str()));
                prop_assert_eq!(status_entries[0].new_value.as_deref(), Some(after.status.as_str()));
            }

            prop_assert!(after.escalation_level >= before.escalation_level);
            prop_assert!(after.escalation_level <= env.policy.max_escalation_level);
            prop_assert_eq!(after.closed_at.is_some(), after.status == TicketStatus::Closed);
            prop_assert_eq!(&after.ticket_number, &before.ticket_number);
        }

        let history = state.history_of(ticket_id);
        prop_assert!(history.windows(2).all(|pair| pair[0].id < pair[1].id));

        let stored: Vec<StoredRecord> = journal
            .into_iter()
            .zip(1..)
            .map(|(record, sequence)| StoredRecord { sequence, record })
            .collect();
        let replayed = TicketState::replay(&stored).unwrap();
        prop_assert_eq!(replayed.tickets, state.tickets);
        prop_assert_eq!(replayed.history, state.history);
    }

    #[test]
    fn ticket_numbers_are_unique_per_organization(count in 1usize..30) {
        let env = env();
        let mut state = TicketState::new();
        for n in 0..count {
            run(
                &mut state,
                &env,
                TicketCommand::Create(NewTicket {
                    subject: format!("Ticket {n}"),
                    ..NewTicket::default()
                }),
            );
        }

        let mut numbers: Vec<&str> = state
            .tickets
            .values()
            .map(|t| t.ticket_number.as_str())
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        prop_assert_eq!(numbers.len(), count);
        prop_assert!(numbers.contains(&env.policy.ticket_number(count as u64).as_str()));
    }

    #[test]
    fn pages_never_exceed_their_size(count in 0usize..60, page in 1u32..6, page_size in 1u32..25) {
        let env = env();
        let mut state = TicketState::new();
        for n in 0..count {
            run(
                &mut state,
                &env,
                TicketCommand::Create(NewTicket {
                    subject: format!("Ticket {n}"),
                    ..NewTicket::default()
                }),
            );
        }

        let result = queries::list_tickets(
            &state,
            actor().organization_id,
            &TicketFilter::default(),
            PageParams { page, page_size },
        );
        prop_assert!(result.items.len() <= page_size as usize);
        prop_assert_eq!(result.total, count);
        let skipped = (page as usize - 1) * page_size as usize;
        prop_assert_eq!(result.items.len(), count.saturating_sub(skipped).min(page_size as usize));
        prop_assert_eq!(result.has_prev, page > 1);
    }
}
