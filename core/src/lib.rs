//! # Supportdesk Core
//!
//! Core traits and types for the Supportdesk reducer architecture.
//!
//! Business logic is written as reducers: pure functions that take the current
//! state, an action and an injected environment, mutate the state in place and
//! return *descriptions* of side effects. The runtime crate executes those
//! descriptions.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer (commands, events, replies)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Example
//!
//! ```ignore
//! use supportdesk_core::*;
//!
//! impl Reducer for TicketReducer {
//!     type State = TicketState;
//!     type Action = TicketAction;
//!     type Environment = TicketEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TicketState,
//!         action: TicketAction,
//!         env: &TicketEnvironment,
//!     ) -> SmallVec<[Effect<TicketAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

pub mod journal;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use crate::journal::{EventJournal, JournalRecord};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially, each one finishing before the next starts
        Sequential(Vec<Effect<Action>>),

        /// Durably append records to an event journal
        ///
        /// The runtime retries failed appends according to its retry policy and
        /// moves exhausted batches to the dead letter queue.
        Append {
            /// Journal that receives the records
            journal: Arc<dyn EventJournal>,
            /// Records to append, in order
            records: Vec<JournalRecord>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Append { records, .. } => f
                    .debug_struct("Effect::Append")
                    .field("records", &records.len())
                    .finish_non_exhaustive(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Feed an action straight back into the store
        #[must_use]
        pub fn send(action: Action) -> Effect<Action>
        where
            Action: Send + 'static,
        {
            Effect::Future(Box::pin(async move { Some(action) }))
        }

        /// Returns `true` if this effect (or any nested effect) appends to a journal
        #[must_use]
        pub fn appends_to_journal(&self) -> bool {
            match self {
                Effect::Append { .. } => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().any(Effect::appends_to_journal)
                },
                Effect::None | Effect::Future(_) => false,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All sources of non-determinism (time, identifiers) are abstracted behind
/// traits and injected via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of fresh identifiers for new records
    pub trait IdGenerator: Send + Sync {
        /// Produce a new, never-before-returned identifier
        fn next_id(&self) -> Uuid;
    }

    /// Random v4 identifiers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomIds;

    impl IdGenerator for RandomIds {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, IdGenerator, RandomIds, SystemClock};
    use super::journal::{EventJournal, JournalError, JournalRecord, StoredRecord};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    struct NullJournal;

    impl EventJournal for NullJournal {
        fn append(
            &self,
            records: Vec<JournalRecord>,
        ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>> {
            let count = i64::try_from(records.len()).unwrap_or(i64::MAX);
            Box::pin(async move { Ok(count) })
        }

        fn load_all(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>>
        {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[test]
    fn nested_append_is_detected() {
        let effect: Effect<()> = Effect::chain(vec![
            Effect::None,
            Effect::merge(vec![Effect::Append {
                journal: Arc::new(NullJournal),
                records: Vec::new(),
            }]),
        ]);
        assert!(effect.appends_to_journal());
        assert!(!Effect::<()>::None.appends_to_journal());
    }

    #[tokio::test]
    async fn send_effect_yields_action() {
        let Effect::Future(fut) = Effect::send(7_u32) else {
            unreachable!("send always builds a future effect");
        };
        assert_eq!(fut.await, Some(7));
    }

    #[test]
    fn debug_output_hides_futures() {
        let effect = Effect::send(1_u8);
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn random_ids_are_distinct() {
        let ids = RandomIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
