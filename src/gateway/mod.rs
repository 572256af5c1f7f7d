//! Axum HTTP gateway exposing the credential validation API.
//!
//! Routes:
//! - `GET /` — health check, `{"status":"ok"}`
//! - `POST /api/validate` — validate a username/password pair
//!
//! Validation is read-only: it never triggers the cleanup sweep, so an
//! expired auto-generated record keeps answering 401 until the next slash
//! command sweeps it. HTTP-only callers cannot force eviction — that
//! eventual-consistency window is part of the contract.

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::store::CredentialStore;

/// Maximum request body size (16KB) — credential payloads are tiny.
pub const MAX_BODY_SIZE: usize = 16_384;
/// Request timeout (10s).
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
}

/// Concrete return type for handlers (avoids `impl IntoResponse` inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Request body for `POST /api/validate`.
///
/// Fields are optional so an incomplete body maps to the documented 400
/// response instead of an axum deserialization rejection.
#[derive(Deserialize)]
pub struct ValidateBody {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    // The validation API is consumed cross-origin by a third-party login page.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(handle_health))
        .route("/api/validate", post(handle_validate))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until the process exits.
pub async fn run_gateway(host: &str, port: u16, store: Arc<CredentialStore>) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual = listener.local_addr()?;

    tracing::info!("🌐 Validation API listening on http://{actual}");

    let app = router(AppState { store });
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET / — health check.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /api/validate — check a submitted username/password pair.
async fn handle_validate(
    State(state): State<AppState>,
    body: Result<Json<ValidateBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let Ok(Json(body)) = body else {
        return missing_credentials();
    };

    let (Some(username), Some(password)) = (body.username, body.password) else {
        return missing_credentials();
    };
    if username.is_empty() || password.is_empty() {
        return missing_credentials();
    }

    match state.store.validate(&username, &password) {
        Ok(valid) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "valid": true,
                "expiry": valid.expires_at,
                "isManuallyRegistered": valid.manually_registered,
            })),
        ),
        Err(reason) => {
            tracing::debug!(username = %username, ?reason, "Validation rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "valid": false,
                    "message": "Invalid credentials",
                })),
            )
        }
    }
}

fn missing_credentials() -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "valid": false,
            "message": "Missing credentials",
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState {
            store: Arc::new(CredentialStore::new("gateway_test_salt")),
        }
    }

    fn body(username: Option<&str>, password: Option<&str>) -> ValidateBody {
        ValidateBody {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(value) = handle_health().await;
        assert_eq!(value, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn validate_generated_pair_succeeds() {
        let state = test_state();
        let issued = state.store.generate();

        let (status, Json(value)) = handle_validate(
            State(state),
            Ok(Json(body(Some(&issued.username), Some(&issued.password)))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["valid"], serde_json::json!(true));
        assert_eq!(value["isManuallyRegistered"], serde_json::json!(false));
        assert_eq!(value["expiry"].as_u64(), Some(issued.expires_at));
    }

    #[tokio::test]
    async fn validate_manual_pair_reports_flag() {
        let state = test_state();
        state.store.register("alice", "s3cret-pass");

        let (status, Json(value)) = handle_validate(
            State(state),
            Ok(Json(body(Some("alice"), Some("s3cret-pass")))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["isManuallyRegistered"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn validate_wrong_password_is_401() {
        let state = test_state();
        let issued = state.store.generate();

        let (status, Json(value)) = handle_validate(
            State(state),
            Ok(Json(body(Some(&issued.username), Some("wrong_password")))),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(value["valid"], serde_json::json!(false));
        assert_eq!(value["message"], serde_json::json!("Invalid credentials"));
    }

    #[tokio::test]
    async fn validate_unknown_user_is_401() {
        let (status, Json(value)) = handle_validate(
            State(test_state()),
            Ok(Json(body(Some("nobody"), Some("anything")))),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(value["valid"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn validate_missing_fields_is_400() {
        for (u, p) in [
            (None, None),
            (Some("user"), None),
            (None, Some("password")),
            (Some(""), Some("password")),
            (Some("user"), Some("")),
        ] {
            let (status, Json(value)) =
                handle_validate(State(test_state()), Ok(Json(body(u, p)))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(value["valid"], serde_json::json!(false));
            assert_eq!(value["message"], serde_json::json!("Missing credentials"));
        }
    }
}
