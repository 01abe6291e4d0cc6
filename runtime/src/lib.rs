//! # Supportdesk Runtime
//!
//! Runtime implementation for the Supportdesk reducer architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, serializes reducer calls and executes effects
//! - **Action broadcast**: Actions produced by effects are published to observers,
//!   which is how HTTP handlers wait for the reply to their command
//! - **Retry + dead letter queue**: Journal appends are retried with backoff and
//!   parked in a DLQ when they keep failing
//!
//! ## Example
//!
//! ```ignore
//! use supportdesk_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

pub mod journal;
pub mod retry;

pub use journal::InMemoryJournal;
pub use retry::RetryPolicy;
pub use store::{EffectHandle, Store};

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use supportdesk_core::journal::JournalRecord;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but experiencing issues (e.g., parked journal writes)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Metadata (e.g., queue sizes)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Dead letter queue entry
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    /// The failed operation payload
    pub payload: T,

    /// Number of attempts made before giving up
    pub attempts: u32,

    /// The error message from the last failure
    pub error_message: String,

    /// When the entry was parked
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

/// Dead Letter Queue for storing failed operations
///
/// Bounded and FIFO: when full, the oldest entry is dropped. Clones share the
/// same underlying queue.
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead letter queue with the given max size (minimum 1)
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    /// Push a failed operation onto the queue
    ///
    /// If the queue is full, the oldest entry is dropped.
    pub fn push(&self, payload: T, error_message: String, attempts: u32) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("dlq.dropped").increment(1);
            tracing::warn!(
                max_size = self.max_size,
                "DLQ at capacity, dropping oldest entry"
            );
        }

        queue.push_back(DeadLetter {
            payload,
            attempts,
            error_message,
            failed_at: chrono::Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dlq.size").set(queue.len() as f64);
        metrics::counter!("dlq.pushed").increment(1);

        tracing::warn!(
            attempts,
            queue_size = queue.len(),
            "Operation added to dead letter queue"
        );
    }

    /// Get the current queue size
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all entries from the queue
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();

        metrics::gauge!("dlq.size").set(0.0);
        metrics::counter!("dlq.drained").increment(entries.len() as u64);
        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// Get the maximum queue size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Journal batches that could not be written.
pub type JournalDeadLetters = DeadLetterQueue<Vec<JournalRecord>>;

/// Configuration for Store instances
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_dlq_max_size(5000)
///     .with_retry_policy(RetryPolicy::new().with_max_attempts(3));
///
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum size of the dead letter queue
    pub dlq_max_size: usize,
    /// Retry policy for journal appends
    pub retry_policy: RetryPolicy,
    /// Number of actions buffered for observers
    pub broadcast_capacity: usize,
}

impl StoreConfig {
    /// Set the DLQ maximum size
    #[must_use]
    pub const fn with_dlq_max_size(mut self, max_size: usize) -> Self {
        self.dlq_max_size = max_size;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the action broadcast capacity (minimum 1)
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dlq_max_size: 1000,
            retry_policy: RetryPolicy::default(),
            broadcast_capacity: 1024,
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, Duration, HealthCheck, JournalDeadLetters, StoreConfig, StoreError,
        retry::{self, RetryPolicy},
    };
    use futures::future::join_all;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use supportdesk_core::{
        effect::Effect,
        journal::{EventJournal, JournalRecord},
        reducer::Reducer,
    };
    use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
    use tokio::task::JoinHandle;

    /// Handle for the effects spawned by one [`Store::send`] call.
    ///
    /// Actions fed back by those effects are processed by their own `send`
    /// calls and are not covered by this handle.
    #[derive(Debug)]
    pub struct EffectHandle {
        task: Option<JoinHandle<()>>,
    }

    impl EffectHandle {
        /// Wait for all effects to complete
        pub async fn wait(self) {
            if let Some(task) = self.task {
                if let Err(error) = task.await {
                    tracing::error!(error = %error, "Effect task failed");
                }
            }
        }

        /// Wait for all effects to complete with a timeout
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if the effects are still running when
        /// the timeout elapses.
        pub async fn wait_with_timeout(self, timeout: Duration) -> Result<(), StoreError> {
            tokio::time::timeout(timeout, self.wait())
                .await
                .map_err(|_| StoreError::Timeout)
        }
    }

    /// Guard that decrements an atomic counter on drop (for shutdown tracking)
    struct PendingGuard(Arc<AtomicUsize>);

    impl Drop for PendingGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// One batch waiting for the journal writer.
    struct AppendJob {
        journal: Arc<dyn EventJournal>,
        records: Vec<JournalRecord>,
        done: oneshot::Sender<()>,
    }

    struct StoreInner<S, A, E, R> {
        state: RwLock<S>,
        reducer: R,
        environment: E,
        retry_policy: RetryPolicy,
        dlq: JournalDeadLetters,
        shutdown: AtomicBool,
        pending_effects: Arc<AtomicUsize>,
        action_broadcast: broadcast::Sender<A>,
        // Started on first use so a store can be built outside a runtime
        journal_writer: OnceLock<mpsc::UnboundedSender<AppendJob>>,
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a store is cheap; clones share the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        inner: Arc<StoreInner<S, A, E, R>>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Sync + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                inner: Arc::new(StoreInner {
                    state: RwLock::new(initial_state),
                    reducer,
                    environment,
                    retry_policy: config.retry_policy,
                    dlq: JournalDeadLetters::new(config.dlq_max_size),
                    shutdown: AtomicBool::new(false),
                    pending_effects: Arc::new(AtomicUsize::new(0)),
                    action_broadcast,
                    journal_writer: OnceLock::new(),
                }),
            }
        }

        /// Get access to the dead letter queue of failed journal writes
        #[must_use]
        pub fn dlq(&self) -> JournalDeadLetters {
            self.inner.dlq.clone()
        }

        /// Perform a health check on the Store
        ///
        /// - healthy: no parked journal writes
        /// - degraded: at least one batch is parked in the dead letter queue
        /// - unhealthy: the dead letter queue is full
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let dlq_size = self.inner.dlq.len();
            let dlq_capacity = self.inner.dlq.max_size();

            let check = if dlq_size >= dlq_capacity {
                HealthCheck::unhealthy("store", "Dead letter queue is full")
            } else if dlq_size > 0 {
                HealthCheck::degraded(
                    "store",
                    format!("{dlq_size} journal batch(es) could not be persisted"),
                )
            } else {
                HealthCheck::healthy("store")
            };

            check
                .with_metadata("dlq_size", dlq_size.to_string())
                .with_metadata("dlq_capacity", dlq_capacity.to_string())
                .with_metadata(
                    "pending_effects",
                    self.inner.pending_effects.load(Ordering::Acquire).to_string(),
                )
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions and waits for pending effects to complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.inner.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(20);

            loop {
                let pending = self.inner.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Queues the journal appends among the effects, still under the lock
        /// 4. Spawns execution of the returned effects
        ///
        /// Concurrent `send()` calls serialize at the reducer level, and the
        /// journal receives their records in the same order.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.inner.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.inner.state.write().await;

                let start = std::time::Instant::now();
                let effects =
                    self.inner
                        .reducer
                        .reduce(&mut *state, action, &self.inner.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                effects
                    .into_iter()
                    .filter(|effect| !matches!(effect, Effect::None))
                    .map(|effect| self.queue_appends(effect))
                    .collect::<Vec<Effect<A>>>()
            };

            if effects.is_empty() {
                return Ok(EffectHandle { task: None });
            }

            #[allow(clippy::cast_precision_loss)]
            metrics::histogram!("store.effects.count").record(effects.len() as f64);

            self.inner.pending_effects.fetch_add(1, Ordering::SeqCst);
            let guard = PendingGuard(Arc::clone(&self.inner.pending_effects));
            let execution = self.run_effect(Effect::Parallel(effects));

            let task = tokio::spawn(async move {
                let _guard = guard;
                execution.await;
            });

            Ok(EffectHandle { task: Some(task) })
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast *before* sending, so a reply
        /// produced immediately by an effect cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.inner.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.inner.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let open = store.state(|s| s.tickets.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.inner.state.read().await;
            f(&*state)
        }

        fn run_effect(&self, effect: Effect<A>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let store = self.clone();

            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                        if let Some(action) = fut.await {
                            // Observers first, then feedback into the reducer
                            let _ = store.inner.action_broadcast.send(action.clone());
                            if let Err(error) = store.send(action).await {
                                tracing::warn!(error = %error, "Dropped feedback action");
                            }
                        }
                    },
                    Effect::Parallel(effects) => {
                        join_all(effects.into_iter().map(|effect| store.run_effect(effect))).await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            store.run_effect(effect).await;
                        }
                    },
                    Effect::Append { journal, records } => {
                        if let Some(done) = store.queue_append(journal, records) {
                            let _ = done.await;
                        }
                    },
                }
            })
        }

        /// Replace every `Append` in `effect` with a wait on its queued write.
        ///
        /// Must run while the state write lock is held: queue order is journal
        /// order.
        fn queue_appends(&self, effect: Effect<A>) -> Effect<A> {
            match effect {
                Effect::Append { journal, records } => match self.queue_append(journal, records) {
                    Some(done) => Effect::Future(Box::pin(async move {
                        if done.await.is_err() {
                            tracing::warn!("Journal writer dropped a batch before finishing it");
                        }
                        None
                    })),
                    None => Effect::None,
                },
                Effect::Parallel(effects) => Effect::Parallel(
                    effects.into_iter().map(|effect| self.queue_appends(effect)).collect(),
                ),
                Effect::Sequential(effects) => Effect::Sequential(
                    effects.into_iter().map(|effect| self.queue_appends(effect)).collect(),
                ),
                other => other,
            }
        }

        fn queue_append(
            &self,
            journal: Arc<dyn EventJournal>,
            records: Vec<JournalRecord>,
        ) -> Option<oneshot::Receiver<()>> {
            if records.is_empty() {
                return None;
            }
            metrics::counter!("store.effects.executed", "type" => "append").increment(1);

            let writer = self.inner.journal_writer.get_or_init(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_journal_writer(
                    rx,
                    self.inner.retry_policy.clone(),
                    self.inner.dlq.clone(),
                ));
                tx
            });

            let (done, finished) = oneshot::channel();
            if let Err(mpsc::error::SendError(job)) = writer.send(AppendJob {
                journal,
                records,
                done,
            }) {
                tracing::error!(count = job.records.len(), "Journal writer is gone, parking batch");
                self.inner
                    .dlq
                    .push(job.records, "journal writer stopped".to_string(), 0);
                return None;
            }
            Some(finished)
        }
    }

    /// Drain queued batches one at a time, retrying each before the next.
    ///
    /// Ends once every store clone (and so every sender) is dropped.
    async fn run_journal_writer(
        mut jobs: mpsc::UnboundedReceiver<AppendJob>,
        policy: RetryPolicy,
        dlq: JournalDeadLetters,
    ) {
        while let Some(job) = jobs.recv().await {
            append_records(&policy, &dlq, job.journal, job.records).await;
            let _ = job.done.send(());
        }
        tracing::debug!("Journal writer stopped");
    }

    async fn append_records(
        policy: &RetryPolicy,
        dlq: &JournalDeadLetters,
        journal: Arc<dyn EventJournal>,
        records: Vec<JournalRecord>,
    ) {
        let result = retry::retry_with_backoff(policy, "journal_append", || {
            let journal = Arc::clone(&journal);
            let batch = records.clone();
            async move { journal.append(batch).await }
        })
        .await;

        match result {
            Ok(sequence) => {
                tracing::debug!(sequence, count = records.len(), "Journal append succeeded");
            },
            Err(exhausted) => {
                tracing::error!(
                    error = %exhausted.error,
                    attempts = exhausted.attempts,
                    count = records.len(),
                    "Journal append failed, parking batch in dead letter queue"
                );
                dlq.push(records, exhausted.error.to_string(), exhausted.attempts);
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use supportdesk_core::{
        SmallVec,
        effect::Effect,
        journal::{EventJournal, JournalError, StoredRecord},
        reducer::Reducer,
        smallvec,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum CounterAction {
        Add { request: u32, amount: i64 },
        Added { request: u32, total: i64 },
        Ignore,
    }

    struct CounterReducer;

    struct CounterEnv {
        journal: Arc<dyn EventJournal>,
    }

    impl Reducer for CounterReducer {
        type State = i64;
        type Action = CounterAction;
        type Environment = CounterEnv;

        fn reduce(
            &self,
            state: &mut i64,
            action: CounterAction,
            env: &CounterEnv,
        ) -> SmallVec<[Effect<CounterAction>; 4]> {
            match action {
                CounterAction::Add { request, amount } => {
                    *state += amount;
                    let record = JournalRecord {
                        stream_id: "counter".to_string(),
                        event_type: "added".to_string(),
                        payload: serde_json::json!({ "amount": amount }),
                        recorded_at: chrono::Utc::now(),
                    };
                    smallvec![Effect::chain(vec![
                        Effect::Append {
                            journal: Arc::clone(&env.journal),
                            records: vec![record],
                        },
                        Effect::send(CounterAction::Added {
                            request,
                            total: *state,
                        }),
                    ])]
                },
                CounterAction::Added { .. } | CounterAction::Ignore => smallvec![Effect::None],
            }
        }
    }

    struct BrokenJournal;

    impl EventJournal for BrokenJournal {
        fn append(
            &self,
            _records: Vec<JournalRecord>,
        ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>> {
            Box::pin(async { Err(JournalError::Unavailable("disk on fire".to_string())) })
        }

        fn load_all(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>>
        {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    /// Holds the first batch back so later batches would overtake it if allowed.
    struct SlowFirstJournal {
        inner: InMemoryJournal,
        delayed: std::sync::atomic::AtomicBool,
    }

    impl SlowFirstJournal {
        fn new() -> Self {
            Self {
                inner: InMemoryJournal::new(),
                delayed: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    impl EventJournal for SlowFirstJournal {
        fn append(
            &self,
            records: Vec<JournalRecord>,
        ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>> {
            Box::pin(async move {
                if !self.delayed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                }
                self.inner.append(records).await
            })
        }

        fn load_all(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>>
        {
            self.inner.load_all()
        }
    }

    fn store_with(
        journal: Arc<dyn EventJournal>,
    ) -> Store<i64, CounterAction, CounterEnv, CounterReducer> {
        let config = StoreConfig::default().with_retry_policy(
            RetryPolicy::new()
                .with_max_attempts(2)
                .with_initial_delay(Duration::from_millis(1)),
        );
        Store::with_config(0, CounterReducer, CounterEnv { journal }, config)
    }

    #[tokio::test]
    async fn reply_arrives_after_state_and_journal_are_updated() {
        let journal = Arc::new(InMemoryJournal::new());
        let store = store_with(journal.clone());

        let reply = store
            .send_and_wait_for(
                CounterAction::Add {
                    request: 1,
                    amount: 5,
                },
                |a| matches!(a, CounterAction::Added { request: 1, .. }),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(
            reply,
            CounterAction::Added {
                request: 1,
                total: 5
            }
        );
        assert_eq!(store.state(|s| *s).await, 5);
        assert_eq!(journal.len(), 1);
        assert!(store.health().status.is_healthy());
    }

    #[tokio::test]
    async fn journal_keeps_reduction_order_when_an_append_is_slow() {
        let journal = Arc::new(SlowFirstJournal::new());
        let store = store_with(journal.clone());

        let first = store
            .send(CounterAction::Add {
                request: 1,
                amount: 1,
            })
            .await
            .unwrap();
        store
            .send_and_wait_for(
                CounterAction::Add {
                    request: 2,
                    amount: 10,
                },
                |a| matches!(a, CounterAction::Added { request: 2, .. }),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        first.wait_with_timeout(Duration::from_secs(2)).await.unwrap();

        let amounts: Vec<i64> = journal
            .inner
            .snapshot()
            .iter()
            .map(|stored| stored.record.payload["amount"].as_i64().unwrap())
            .collect();
        assert_eq!(amounts, vec![1, 10]);
    }

    #[tokio::test]
    async fn failed_appends_are_parked_and_degrade_health() {
        let store = store_with(Arc::new(BrokenJournal));

        let handle = store
            .send(CounterAction::Add {
                request: 2,
                amount: 1,
            })
            .await
            .unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        let dlq = store.dlq();
        assert_eq!(dlq.len(), 1);
        assert_eq!(store.health().status, HealthStatus::Degraded);

        let parked = dlq.drain();
        assert_eq!(parked[0].attempts, 2);
        assert_eq!(parked[0].payload.len(), 1);
    }

    #[tokio::test]
    async fn waiting_times_out_without_a_reply() {
        let store = store_with(Arc::new(InMemoryJournal::new()));

        let result = store
            .send_and_wait_for(CounterAction::Ignore, |_| true, Duration::from_millis(20))
            .await;

        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store_with(Arc::new(InMemoryJournal::new()));
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(CounterAction::Ignore).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }

    #[test]
    fn dlq_drops_oldest_when_full() {
        let dlq = DeadLetterQueue::new(2);
        dlq.push(1, "a".to_string(), 1);
        dlq.push(2, "b".to_string(), 1);
        dlq.push(3, "c".to_string(), 1);

        let payloads: Vec<i32> = dlq.drain().into_iter().map(|d| d.payload).collect();
        assert_eq!(payloads, vec![2, 3]);
        assert!(dlq.is_empty());
    }

    #[test]
    fn full_dlq_is_unhealthy() {
        let store = store_with(Arc::new(InMemoryJournal::new()));
        let dlq = store.dlq();
        for _ in 0..dlq.max_size() {
            dlq.push(Vec::new(), "x".to_string(), 1);
        }
        assert!(store.health().status.is_unhealthy());
    }
}
