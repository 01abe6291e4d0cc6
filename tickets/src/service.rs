//! Command dispatch and reads on top of the store.
//!
//! [`TicketService`] is what the HTTP handlers talk to. Commands are sent to
//! the store and answered by the matching `Completed`/`Rejected` reply;
//! reads take a read lock on the state.

use crate::aggregate::{Outcome, TicketAction, TicketCommand, TicketEnvironment, TicketReducer};
use crate::state::TicketState;
use crate::types::{Actor, TicketError};
use std::time::Duration;
use supportdesk_runtime::{HealthCheck, Store, StoreError};
use supportdesk_web::AppError;
use uuid::Uuid;

/// The ticket store
pub type TicketStore = Store<TicketState, TicketAction, TicketEnvironment, TicketReducer>;

impl From<TicketError> for AppError {
    fn from(error: TicketError) -> Self {
        match error {
            TicketError::NotFound { resource, id } => Self::not_found(resource, id),
            TicketError::Validation(message) => Self::validation(message),
            TicketError::Conflict(message) => Self::conflict(message),
            TicketError::InvalidRequest(message) => Self::bad_request(message),
            TicketError::Persistence(message) => {
                Self::internal("Failed to record ticket changes")
                    .with_source(anyhow::anyhow!(message))
            },
        }
    }
}

/// Handle used by the API layer
#[derive(Clone)]
pub struct TicketService {
    store: TicketStore,
    timeout: Duration,
}

impl TicketService {
    /// Wrap `store`; commands wait at most `timeout` for their reply.
    #[must_use]
    pub const fn new(store: TicketStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Run `command` as `actor` and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`TicketError`] when the command is rejected, or a
    /// 5xx [`AppError`] when the store is unavailable or does not answer in time.
    /// After a timeout the outcome is unknown: the command has already been
    /// applied to the state if it was accepted, and only its journal write is late.
    pub async fn execute(&self, actor: Actor, command: TicketCommand) -> Result<Outcome, AppError> {
        let request_id = Uuid::new_v4();
        let name = command.name();

        let reply = self
            .store
            .send_and_wait_for(
                TicketAction::command(request_id, actor, command),
                |action| action.reply_to() == Some(request_id),
                self.timeout,
            )
            .await
            .map_err(|error: StoreError| {
                tracing::error!(command = name, %request_id, error = %error, "Command did not complete");
                AppError::from(error)
            })?;

        match reply {
            TicketAction::Completed { outcome, .. } => Ok(*outcome),
            TicketAction::Rejected { error, .. } => Err(error.into()),
            TicketAction::Command { .. } | TicketAction::EscalationRaised { .. } => Err(
                AppError::internal("Unexpected reply from the ticket store"),
            ),
        }
    }

    /// Read the current state.
    ///
    /// # Errors
    ///
    /// Propagates the mapped error returned by `f`.
    pub async fn read<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&TicketState) -> Result<T, TicketError>,
    {
        self.store.state(f).await.map_err(AppError::from)
    }

    /// Read the current state with an infallible query.
    pub async fn view<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&TicketState) -> T,
    {
        self.store.state(f).await
    }

    /// Store health for `/ready`
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        self.store.health()
    }

    /// Stop accepting commands and wait for pending effects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}
