//! Bearer-token authentication.
//!
//! Requests carry an HS256 access token in `Authorization: Bearer <jwt>`.
//! [`Principal`] is an Axum extractor that verifies the token against the
//! [`JwtVerifier`] found in the router state and exposes who is calling and
//! what they may do.
//!
//! Permissions are strings of the form `resource:action`. A grant matches
//! exactly (`ticket:update`), by resource wildcard (`ticket:*`) or globally
//! (`*`).
//!
//! # Example
//!
//! ```ignore
//! async fn close_ticket(principal: Principal, ...) -> Result<Json<Ticket>, AppError> {
//!     principal.require("ticket:update")?;
//!     let org = principal.organization()?;
//!     ...
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Value of the `type` claim on access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Organization the user acts for.
    #[serde(default)]
    pub org_id: Option<Uuid>,
    /// Role name, informational only.
    #[serde(default)]
    pub role: Option<String>,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Token type; only `access` tokens are accepted.
    #[serde(rename = "type")]
    pub token_type: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Authentication failures. All of them map to `401 Unauthorized`.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("Missing bearer token")]
    MissingToken,

    /// The header is not `Bearer <token>`.
    #[error("Malformed authorization header")]
    MalformedHeader,

    /// The token is past its expiry.
    #[error("Token has expired")]
    Expired,

    /// Signature, format or claim validation failed.
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// A refresh or other non-access token was presented.
    #[error("Unexpected token type: {0}")]
    WrongTokenType(String),

    /// Signing a token failed.
    #[error("Could not sign token: {0}")]
    Signing(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(_) => Self::internal("Could not sign token"),
            other => Self::unauthorized(other.to_string()),
        }
    }
}

/// Verifies (and, for tooling and tests, signs) HS256 access tokens.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    ///
    /// `leeway_secs` is the allowed clock skew when checking `exp`.
    #[must_use]
    pub fn new(secret: &[u8], leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Expired`] for expired tokens,
    /// [`AuthError::WrongTokenType`] for non-access tokens and
    /// [`AuthError::Invalid`] for anything else that fails validation.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm => AuthError::Invalid(e.to_string()),
                _ => AuthError::Invalid(format!("token validation failed: {e}")),
            })?;

        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType(data.claims.token_type));
        }

        Ok(data.claims)
    }

    /// Sign `claims` with this verifier's secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token.trim())
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Calling user.
    pub user_id: Uuid,
    /// Organization scope, if the token carries one.
    pub organization_id: Option<Uuid>,
    /// Role name.
    pub role: Option<String>,
    /// Granted permissions.
    pub permissions: Vec<String>,
}

impl Principal {
    /// Whether any grant covers `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        let resource = permission.split_once(':').map(|(r, _)| r);

        self.permissions.iter().any(|grant| {
            grant == "*"
                || grant == permission
                || match (grant.split_once(':'), resource) {
                    (Some((granted, "*")), Some(resource)) => granted == resource,
                    _ => false,
                }
        })
    }

    /// Fail with 403 unless `permission` is granted.
    ///
    /// # Errors
    ///
    /// Returns a `403 Forbidden` [`AppError`] naming the missing permission.
    pub fn require(&self, permission: &str) -> Result<(), AppError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, permission, "Permission denied");
            Err(AppError::forbidden(format!(
                "Missing permission: {permission}"
            )))
        }
    }

    /// The organization the caller acts for.
    ///
    /// # Errors
    ///
    /// Returns a `403 Forbidden` [`AppError`] when the token has no organization.
    pub fn organization(&self) -> Result<Uuid, AppError> {
        self.organization_id
            .ok_or_else(|| AppError::forbidden("Token is not bound to an organization"))
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            organization_id: claims.org_id,
            role: claims.role,
            permissions: claims.permissions,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    Arc<JwtVerifier>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);

        let claims = bearer_token(&parts.headers)
            .and_then(|token| verifier.verify(token))
            .map_err(|error| {
                tracing::debug!(error = %error, "Rejected credentials");
                AppError::from(error)
            })?;

        Ok(Self::from(claims))
    }
}
