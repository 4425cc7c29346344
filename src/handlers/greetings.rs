//! Greeting endpoints
//!
//! The birthday and greeting handlers sleep before answering to simulate slow
//! work; the delays come from `[greetings]` in the configuration.

use crate::error::AppError;
use crate::router::{Handler, HandlerResult, RouteRequest};
use axum::response::IntoResponse;
use std::time::Duration;

/// `GET /`
pub async fn welcome(_request: RouteRequest) -> HandlerResult {
    Ok("Welcome!".into_response())
}

/// `GET /birthday/{name}`
pub async fn birthday(request: RouteRequest, delay: Duration) -> HandlerResult {
    let name = name_param(&request)?;
    tokio::time::sleep(delay).await;
    Ok(format!("Happy Birthday {} :)", name).into_response())
}

/// `GET /greeting/{name}`
pub async fn greeting(request: RouteRequest, delay: Duration) -> HandlerResult {
    let name = name_param(&request)?;
    tokio::time::sleep(delay).await;
    Ok(format!("Greetings {} :)", name).into_response())
}

/// [`birthday`] with its delay bound
pub fn birthday_handler(delay: Duration) -> impl Handler {
    move |request: RouteRequest| birthday(request, delay)
}

/// [`greeting`] with its delay bound
pub fn greeting_handler(delay: Duration) -> impl Handler {
    move |request: RouteRequest| greeting(request, delay)
}

fn name_param(request: &RouteRequest) -> Result<String, AppError> {
    request
        .param("name")
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Internal(format!(
                "route {} does not bind a 'name' placeholder",
                request.template()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::handler::test_request;
    use axum::response::Response;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_welcome() {
        let response = welcome(test_request("/", "/", &[])).await.unwrap();
        assert_eq!(body_string(response).await, "Welcome!");
    }

    #[tokio::test]
    async fn test_birthday_includes_name() {
        let request = test_request("/birthday/{name}", "/birthday/alice", &[("name", "alice")]);
        let response = birthday(request, Duration::ZERO).await.unwrap();
        assert_eq!(body_string(response).await, "Happy Birthday alice :)");
    }

    #[tokio::test]
    async fn test_greeting_includes_name() {
        let handler = greeting_handler(Duration::ZERO);
        let request = test_request("/greeting/{name}", "/greeting/bob", &[("name", "bob")]);
        let response = handler.call(request).await.unwrap();
        assert_eq!(body_string(response).await, "Greetings bob :)");
    }

    #[tokio::test]
    async fn test_missing_name_is_an_error() {
        let result = greeting(test_request("/greeting", "/greeting", &[]), Duration::ZERO).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_birthday_waits_for_delay() {
        let handler = birthday_handler(Duration::from_secs(20));
        let request = test_request("/birthday/{name}", "/birthday/carol", &[("name", "carol")]);

        let started = tokio::time::Instant::now();
        handler.call(request).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(20));
    }
}
