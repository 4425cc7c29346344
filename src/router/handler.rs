//! Handler contract shared by routes and instrumentation wrappers

use crate::error::AppResult;
use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri, request::Parts};
use axum::response::Response;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What every handler returns: a response, or an error rendered as 500
pub type HandlerResult = AppResult<Response>;

/// A matched request as seen by a handler
///
/// Carries the request head plus the placeholder values bound from the
/// route's path template.
#[derive(Debug)]
pub struct RouteRequest {
    template: Arc<str>,
    parts: Parts,
    params: HashMap<String, String>,
}

impl RouteRequest {
    pub fn new(template: Arc<str>, parts: Parts, params: HashMap<String, String>) -> Self {
        Self {
            template,
            parts,
            params,
        }
    }

    /// Value bound to a template placeholder, e.g. `param("name")` for `/greeting/{name}`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// The matched route template (not the resolved path)
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }
}

/// An async request handler
///
/// Implemented by plain async closures `Fn(RouteRequest) -> impl Future<Output = HandlerResult>`
/// and by the wrappers in [`crate::instrument`], which is what lets wrappers nest.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, request: RouteRequest) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, request: RouteRequest) -> HandlerResult {
        (self)(request).await
    }
}

/// Type-erased handler stored in the route table
pub type BoxedHandler = Arc<dyn Handler>;

#[cfg(test)]
pub(crate) fn test_request(template: &str, path: &str, params: &[(&str, &str)]) -> RouteRequest {
    let (parts, _body) = axum::http::Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(())
        .expect("valid test request")
        .into_parts();
    RouteRequest::new(
        Arc::from(template),
        parts,
        params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = |request: RouteRequest| async move {
            let name = request.param("name").unwrap_or("nobody").to_string();
            Ok::<_, AppError>(name.into_response())
        };

        let request = test_request("/greeting/{name}", "/greeting/alice", &[("name", "alice")]);
        let response = Handler::call(&handler, request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"alice");
    }

    #[test]
    fn test_route_request_accessors() {
        let request = test_request("/birthday/{name}", "/birthday/bob?x=1", &[("name", "bob")]);
        assert_eq!(request.template(), "/birthday/{name}");
        assert_eq!(request.uri().path(), "/birthday/bob");
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.param("name"), Some("bob"));
        assert_eq!(request.param("missing"), None);
        assert!(request.headers().is_empty());
    }

    #[tokio::test]
    async fn test_boxed_handler_dispatches() {
        let boxed: BoxedHandler = Arc::new(|_request: RouteRequest| async move {
            Ok::<_, AppError>("ok".into_response())
        });
        let response = boxed.call(test_request("/", "/", &[])).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
