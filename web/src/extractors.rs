//! Custom Axum extractors.
//!
//! [`ApiJson`], [`ApiPath`] and [`ApiQuery`] wrap the stock Axum extractors so
//! that malformed input is answered with the usual [`AppError`] JSON body
//! instead of Axum's plain-text rejection.

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use uuid::Uuid;

/// Correlation ID for the current request.
///
/// Prefers the id stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates a fresh one as a last resort.
///
/// ```ignore
/// async fn handler(CorrelationId(id): CorrelationId) -> String {
///     format!("Request ID: {id}")
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(id))
    }
}

/// JSON body extractor rejecting with a 422 [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path extractor rejecting with a 400 [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Query-string extractor rejecting with a 422 [`AppError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: u32,
    }

    fn app() -> Router {
        Router::new()
            .route(
                "/named",
                post(|ApiJson(body): ApiJson<Named>| async move { body.name }),
            )
            .route(
                "/items/:id",
                get(|ApiPath(id): ApiPath<Uuid>| async move { id.to_string() }),
            )
            .route(
                "/paged",
                get(|ApiQuery(q): ApiQuery<Paging>| async move { q.page.to_string() }),
            )
    }

    async fn error_code(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn correlation_id_falls_back_to_header() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(CORRELATION_ID_HEADER, id.to_string())
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();

        let CorrelationId(extracted) = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(extracted, id);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let response = app()
            .oneshot(
                Request::post("/named")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name": 42}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn non_uuid_path_is_a_bad_request() {
        let response = app()
            .oneshot(Request::get("/items/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "BAD_REQUEST");
    }

    #[tokio::test]
    async fn bad_query_is_a_validation_error() {
        let response = app()
            .oneshot(Request::get("/paged?page=zero").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
