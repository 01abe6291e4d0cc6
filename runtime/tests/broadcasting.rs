//! Integration tests for Store action broadcasting
//!
//! The HTTP layer relies on these guarantees: a caller waiting for the reply
//! to its own request id gets exactly that reply, even when many requests are
//! in flight, and subscribers observe every action produced by effects.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use supportdesk_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use supportdesk_runtime::{Store, StoreConfig, StoreError};
use supportdesk_testing::FailingJournal;

#[derive(Debug, Clone, PartialEq)]
enum QueueAction {
    /// Triage a request in several asynchronous steps
    Triage { id: u64 },
    StepDone { id: u64, step: u32 },
    Triaged { id: u64 },
    /// Record an entry and persist it
    Record { id: u64 },
    Recorded { id: u64 },
}

#[derive(Debug, Default)]
struct QueueState {
    steps: Vec<(u64, u32)>,
    recorded: Vec<u64>,
}

struct QueueEnv {
    journal: Arc<FailingJournal>,
}

struct QueueReducer;

impl Reducer for QueueReducer {
    type State = QueueState;
    type Action = QueueAction;
    type Environment = QueueEnv;

    fn reduce(
        &self,
        state: &mut QueueState,
        action: QueueAction,
        env: &QueueEnv,
    ) -> SmallVec<[Effect<QueueAction>; 4]> {
        match action {
            QueueAction::Triage { id } => smallvec![Effect::Future(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some(QueueAction::StepDone { id, step: 1 })
            }))],
            QueueAction::StepDone { id, step } => {
                state.steps.push((id, step));
                if step < 3 {
                    smallvec![Effect::send(QueueAction::StepDone { id, step: step + 1 })]
                } else {
                    smallvec![Effect::send(QueueAction::Triaged { id })]
                }
            },
            QueueAction::Record { id } => {
                state.recorded.push(id);
                smallvec![Effect::chain(vec![
                    Effect::Append {
                        journal: env.journal.clone(),
                        records: Vec::new(),
                    },
                    Effect::send(QueueAction::Recorded { id }),
                ])]
            },
            QueueAction::Triaged { .. } | QueueAction::Recorded { .. } => smallvec![Effect::None],
        }
    }
}

fn new_store() -> Store<QueueState, QueueAction, QueueEnv, QueueReducer> {
    Store::with_config(
        QueueState::default(),
        QueueReducer,
        QueueEnv {
            journal: Arc::new(FailingJournal::new()),
        },
        StoreConfig::default().with_broadcast_capacity(256),
    )
}

#[tokio::test]
async fn waits_for_a_multi_step_flow() {
    let store = new_store();

    let reply = store
        .send_and_wait_for(
            QueueAction::Triage { id: 42 },
            |a| matches!(a, QueueAction::Triaged { id: 42 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(reply, QueueAction::Triaged { id: 42 });
    let steps = store.state(|s| s.steps.clone()).await;
    assert_eq!(steps, vec![(42, 1), (42, 2), (42, 3)]);
}

#[tokio::test]
async fn concurrent_callers_receive_their_own_reply() {
    let store = new_store();

    let mut handles = Vec::new();
    for id in 1..=20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .send_and_wait_for(
                    QueueAction::Record { id },
                    move |a| matches!(a, QueueAction::Recorded { id: got } if *got == id),
                    Duration::from_secs(2),
                )
                .await
        }));
    }

    for (index, handle) in handles.into_iter().enumerate() {
        let reply = handle.await.unwrap().unwrap();
        assert_eq!(reply, QueueAction::Recorded { id: index as u64 + 1 });
    }

    assert_eq!(store.state(|s| s.recorded.len()).await, 20);
}

#[tokio::test]
async fn subscribers_see_feedback_actions() {
    let store = new_store();
    let mut rx = store.subscribe_actions();

    store.send(QueueAction::Triage { id: 7 }).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 4 {
        let action = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(action);
    }

    assert_eq!(seen.last(), Some(&QueueAction::Triaged { id: 7 }));
}

#[tokio::test]
async fn empty_append_batches_never_reach_the_journal() {
    let store = new_store();

    store
        .send_and_wait_for(
            QueueAction::Record { id: 1 },
            |a| matches!(a, QueueAction::Recorded { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    // The failing journal would have parked the batch otherwise
    assert!(store.dlq().is_empty());
    let result = store
        .send_and_wait_for(
            QueueAction::Triage { id: 2 },
            |_| false,
            Duration::from_millis(30),
        )
        .await;
    assert!(matches!(result, Err(StoreError::Timeout)));
}
