//! HTTP routes
//!
//! A small user directory that exercises the error model end to end.

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use kernel::error::{AppError, AppResult, OptionExt};
use platform::request_id::{RequestId, RequestIdLayer};
use platform::request_logger::RequestLoggerLayer;
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;

const USERS: [(u64, &str); 2] = [(1, "alice"), (2, "bob")];

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
}

/// Build the application router.
///
/// Layer order, outermost first: panic → 500, request id, request logger.
pub fn router(request_logger: RequestLoggerLayer) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/users", post(create_user))
        .route("/users/{id}", get(get_user))
        .layer(request_logger)
        .layer(RequestIdLayer::new())
        .layer(CatchPanicLayer::new())
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

/// GET /users/{id}
async fn get_user(Path(id): Path<String>) -> AppResult<Json<UserResponse>> {
    let id: u64 = id.parse()?;

    let (id, name) = USERS
        .iter()
        .find(|(user_id, _)| *user_id == id)
        .ok_or_not_found("User not found")?;

    Ok(Json(UserResponse {
        id: *id,
        name: name.to_string(),
    }))
}

/// POST /users
async fn create_user(
    request_id: RequestId,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let Json(payload) = payload?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("missing field 'name'"));
    }

    tracing::info!(request_id = %request_id, name = %name, "User created");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: USERS.len() as u64 + 1,
            name: name.to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use platform::logging::{LogConfig, Logger};
    use tower::ServiceExt;

    fn app() -> Router {
        let logger = Logger::with_primary(&LogConfig::default(), std::io::sink);
        router(RequestLoggerLayer::new(logger))
    }

    async fn call(request: Request<Body>) -> (StatusCode, String) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post_json(body: &'static str) -> Request<Body> {
        Request::post("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_user_found() {
        let (status, body) = call(Request::get("/users/2").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"id":2,"name":"bob"}"#);
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let (status, body) = call(Request::get("/users/99").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"message":"User not found"}"#);
    }

    #[tokio::test]
    async fn test_get_user_invalid_id() {
        let (status, body) = call(Request::get("/users/abc").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"message":"Invalid integer format"}"#);
    }

    #[tokio::test]
    async fn test_create_user_missing_name() {
        let (status, body) = call(post_json("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"message":"missing field 'name'"}"#);
    }

    #[tokio::test]
    async fn test_create_user_malformed_json_keeps_rejection_status() {
        let (status, body) = call(post_json("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(value["message"].is_string());
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_user() {
        let (status, body) = call(post_json(r#"{"name":"carol"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, r#"{"id":3,"name":"carol"}"#);
    }
}
