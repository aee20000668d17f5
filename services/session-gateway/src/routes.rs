//! Page handlers
//!
//! Each incoming request gets its own `CookieJar` parsed from the `Cookie`
//! header and its own server-context `SessionClient`, so refresh state is
//! never shared between unrelated requests. Whatever the client writes to
//! the jar (a refreshed token pair, a cleared session) is returned to the
//! browser as `Set-Cookie` headers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use session_client::{ClientConfig, Error, SessionClient, SignInCredentials};
use session_store::{ACCESS_TOKEN_COOKIE, CookieJar, CredentialStore};
use tracing::{info, instrument, warn};

use crate::metrics;

/// Shared state for the page handlers
#[derive(Clone)]
pub struct PageState {
    /// Connection pool shared by every per-request client
    pub http: reqwest::Client,
    pub client_config: ClientConfig,
    pub requests_total: Arc<AtomicU64>,
}

impl PageState {
    fn jar(&self, headers: &HeaderMap) -> Arc<CookieJar> {
        Arc::new(CookieJar::from_headers(
            headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        ))
    }

    fn client(&self, jar: &Arc<CookieJar>) -> SessionClient {
        SessionClient::server(self.http.clone(), self.client_config.clone(), jar.clone())
    }

    /// Count and record a finished request.
    fn finish(&self, route: &'static str, started: Instant, response: Response) -> Response {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::record_request(
            route,
            response.status().as_u16(),
            started.elapsed().as_secs_f64(),
        );
        response
    }
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (status, [(CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

/// Append a `Set-Cookie` header for every change recorded in `jar`.
fn with_cookies(mut response: Response, jar: &CookieJar) -> Response {
    for cookie in jar.set_cookie_headers() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "skipping unencodable cookie"),
        }
    }
    response
}

/// `GET /`: guests see the sign-in hint, signed-in users go to the dashboard.
pub async fn home(State(state): State<PageState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let jar = state.jar(&headers);
    let response = if jar.contains(ACCESS_TOKEN_COOKIE) {
        Redirect::to(&state.client_config.home_path).into_response()
    } else {
        Json(serde_json::json!({"authenticated": false, "sign_in": "/sign-in"})).into_response()
    };
    state.finish("home", started, response)
}

/// `POST /sign-in`
#[instrument(skip_all, fields(request_id))]
pub async fn sign_in(
    State(state): State<PageState>,
    Json(credentials): Json<SignInCredentials>,
) -> Response {
    let started = Instant::now();
    let request_id = request_id();
    tracing::Span::current().record("request_id", request_id.as_str());

    let jar = Arc::new(CookieJar::new());
    let client = state.client(&jar);
    let response = match client.sign_in(&credentials).await {
        Ok(_user) => with_cookies(
            Redirect::to(&state.client_config.home_path).into_response(),
            &jar,
        ),
        Err(Error::Status { status, .. }) if status < 500 => {
            info!(backend_status = status, "sign-in rejected");
            error_response(
                StatusCode::UNAUTHORIZED,
                "sign_in_failed",
                "invalid email or password",
                &request_id,
            )
        }
        Err(e) => {
            warn!(error = %e, "sign-in failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                "backend_error",
                &e.to_string(),
                &request_id,
            )
        }
    };
    state.finish("sign_in", started, response)
}

/// `GET /dashboard`: the signed-in user, or a redirect to sign in.
#[instrument(skip_all, fields(request_id))]
pub async fn dashboard(State(state): State<PageState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = request_id();
    tracing::Span::current().record("request_id", request_id.as_str());

    let jar = state.jar(&headers);
    if !jar.contains(ACCESS_TOKEN_COOKIE) {
        let response = Redirect::to(&state.client_config.sign_in_path).into_response();
        return state.finish("dashboard", started, response);
    }

    let client = state.client(&jar);
    let response = match client.fetch_current_user().await {
        Ok(user) => with_cookies(Json(user).into_response(), &jar),
        Err(e) if e.requires_sign_in() => {
            info!(reason = %e, "session unusable, redirecting to sign-in");
            if let Err(e) = jar.clear_session().await {
                warn!(error = %e, "failed to clear session cookies");
            }
            with_cookies(
                Redirect::to(&state.client_config.sign_in_path).into_response(),
                &jar,
            )
        }
        Err(e) => {
            warn!(error = %e, "failed to load current user");
            with_cookies(
                error_response(
                    StatusCode::BAD_GATEWAY,
                    "backend_error",
                    &e.to_string(),
                    &request_id,
                ),
                &jar,
            )
        }
    };
    state.finish("dashboard", started, response)
}

/// `GET /sign-out`
pub async fn sign_out(State(state): State<PageState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let jar = state.jar(&headers);
    let client = state.client(&jar);
    if let Err(e) = client.sign_out().await {
        warn!(error = %e, "failed to clear session cookies");
    }
    let response = with_cookies(
        Redirect::to(&state.client_config.sign_in_path).into_response(),
        &jar,
    );
    state.finish("sign_out", started, response)
}
