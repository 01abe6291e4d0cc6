//! Support ticket workflow engine.
//!
//! Tickets move through a fixed lifecycle (`open → in_progress → resolved →
//! closed`, with `waiting_on_customer` and `reopened` on the side) and carry
//! comments, attachments, followers, tags and an audit history. Everything is
//! scoped to the caller's organization.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum)  ──►  TicketService  ──►  Store<TicketState, TicketAction, ..>
//!                        ▲                     │
//!                        │ Completed/Rejected  │ TicketReducer (pure)
//!                        └─────────────────────┤
//!                                              ▼
//!                                      EventJournal (append)
//! ```
//!
//! Every accepted command is recorded as [`events::TicketEvent`]s. On startup
//! the state is rebuilt by replaying the journal ([`state::TicketState::replay`]).
//!
//! # Modules
//!
//! - [`types`]: domain entities, ids and errors
//! - [`workflow`]: transition table, SLA and escalation rules
//! - [`events`]: journaled events
//! - [`state`]: in-memory state and event application
//! - [`aggregate`]: commands and the reducer
//! - [`queries`]: filtering and pagination
//! - [`reports`]: overview, SLA and agent metrics
//! - [`storage`]: attachment byte storage
//! - [`service`]: command dispatch used by the API
//! - [`api`], [`server`]: HTTP surface
//! - [`config`]: environment configuration

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod api;
pub mod config;
pub mod events;
pub mod queries;
pub mod reports;
pub mod server;
pub mod service;
pub mod state;
pub mod storage;
pub mod types;
pub mod workflow;

pub use aggregate::{TicketAction, TicketCommand, TicketEnvironment, TicketReducer};
pub use config::Config;
pub use server::{build_router, AppState};
pub use service::{TicketService, TicketStore};
pub use state::TicketState;
pub use types::{Ticket, TicketError, TicketPriority, TicketStatus};
