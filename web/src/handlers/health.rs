//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use supportdesk_runtime::{HealthCheck, HealthStatus};

/// Liveness endpoint.
///
/// Returns 200 while the process is serving requests. It does NOT check
/// dependencies.
///
/// ```text
/// GET /health
/// {"status": "ok"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Map a readiness check to a response.
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// ```json
/// {
///   "component": "store",
///   "status": "degraded",
///   "message": "2 journal batch(es) could not be persisted",
///   "metadata": [["dlq_size", "2"], ["dlq_capacity", "1000"]]
/// }
/// ```
#[must_use]
pub fn readiness_response(health: HealthCheck) -> (StatusCode, Json<HealthCheck>) {
    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn degraded_is_still_ready() {
        let (status, Json(health)) =
            readiness_response(HealthCheck::degraded("store", "1 batch parked"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[test]
    fn unhealthy_is_unavailable() {
        let (status, _) = readiness_response(HealthCheck::unhealthy("store", "DLQ full"));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
