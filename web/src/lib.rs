//! Axum integration for Supportdesk.
//!
//! This crate is the imperative shell around the reducer core: it turns
//! requests into actions and store replies into HTTP responses.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← HTTP, JSON, bearer tokens
//! │  - Request parsing                      │  ← Correlation ids
//! │  - Response serialization               │  ← Logging
//! ├─────────────────────────────────────────┤
//! │         Functional Core                 │
//! │  - Pure business logic (reducers)       │  ← Testable at memory speed
//! │  - State transformations                │  ← No I/O
//! │  - Effect descriptions (values)         │  ← Journal appends, replies
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **Authenticate** the caller ([`Principal`])
//! 2. **Extract** path, query and body ([`ApiPath`], [`ApiQuery`], [`ApiJson`])
//! 3. **Build** an action and send it through the `Store`
//! 4. **Wait** for the matching reply action
//! 5. **Map** the reply to a response, or an [`AppError`]

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use auth::{AuthError, Claims, JwtVerifier, Principal, ACCESS_TOKEN_TYPE};
pub use error::AppError;
pub use extractors::{ApiJson, ApiPath, ApiQuery, CorrelationId};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
