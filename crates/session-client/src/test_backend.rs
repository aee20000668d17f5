//! In-process fake of the backend session service for tests
//!
//! Issues tokens `at_<n>` / `rt_<n>`. Only the most recently issued access
//! token is accepted; any older `at_` token answers 401 `token.expired`, any
//! other bearer value 401 `token.invalid`. `RefreshMode` makes the refresh
//! endpoint misbehave in the ways the client has to survive.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use session_store::store::StoreFuture;
use session_store::{CookieJar, CookieOptions, CredentialStore, Session};

use crate::config::ClientConfig;
use crate::context::Navigator;

pub(crate) const EMAIL: &str = "ana@example.com";
pub(crate) const PASSWORD: &str = "correct-horse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshMode {
    /// Issue a fresh, accepted token pair
    Succeed,
    /// Issue a pair whose access token is already expired
    SucceedExpired,
    /// Issue a pair whose access token the API rejects as `token.invalid`
    SucceedRevoked,
    /// 401 `token.invalid`
    Reject,
    /// 500
    ServerError,
}

struct Tokens {
    generation: usize,
    valid_access: Option<String>,
    valid_refresh: Option<String>,
}

struct BackendState {
    tokens: Mutex<Tokens>,
    refresh_mode: Mutex<RefreshMode>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
    authorizations: Mutex<Vec<Option<String>>>,
}

pub(crate) struct Backend {
    state: Arc<BackendState>,
    pub base_url: String,
}

impl Backend {
    pub(crate) async fn start() -> Self {
        let state = Arc::new(BackendState {
            tokens: Mutex::new(Tokens {
                generation: 0,
                valid_access: None,
                valid_refresh: None,
            }),
            refresh_mode: Mutex::new(RefreshMode::Succeed),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            authorizations: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/me", get(me))
            .route("/echo", post(echo))
            .route("/status/{code}", get(status))
            .route("/sessions", post(sessions))
            .route("/refresh", post(refresh))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{addr}"),
        }
    }

    pub(crate) fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone())
    }

    /// Issue a new accepted token pair, as a sign-in would.
    pub(crate) fn issue(&self) -> Session {
        issue(&self.state, true)
    }

    /// Expire the current access token; the refresh token stays valid.
    pub(crate) fn expire_access(&self) {
        self.state.tokens.lock().unwrap().valid_access = None;
    }

    pub(crate) fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.state.refresh_mode.lock().unwrap() = mode;
    }

    pub(crate) fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` headers seen by protected endpoints, in arrival order.
    pub(crate) fn authorizations(&self) -> Vec<Option<String>> {
        self.state.authorizations.lock().unwrap().clone()
    }
}

fn issue(state: &BackendState, accepted: bool) -> Session {
    let mut tokens = state.tokens.lock().unwrap();
    tokens.generation += 1;
    let access = format!("at_{}", tokens.generation);
    let refresh = format!("rt_{}", tokens.generation);
    tokens.valid_access = accepted.then(|| access.clone());
    tokens.valid_refresh = Some(refresh.clone());
    Session::new(access, refresh)
}

fn reject(code: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": true, "code": code})),
    )
        .into_response()
}

/// Check the bearer token; `Err` carries the 401 response.
fn authorize(state: &BackendState, headers: &HeaderMap) -> Result<(), Response> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.authorizations.lock().unwrap().push(header.clone());

    let Some(token) = header.as_deref().and_then(|h| h.strip_prefix("Bearer ")) else {
        return Err(reject("token.missing"));
    };
    let tokens = state.tokens.lock().unwrap();
    if tokens.valid_access.as_deref() == Some(token) {
        Ok(())
    } else if token.starts_with("at_") {
        Err(reject("token.expired"))
    } else {
        Err(reject("token.invalid"))
    }
}

async fn me(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    Json(json!({
        "email": EMAIL,
        "permissions": ["metrics.list"],
        "roles": ["editor"],
    }))
    .into_response()
}

async fn echo(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    Json(body).into_response()
}

async fn status(
    State(state): State<Arc<BackendState>>,
    Path(code): Path<u16>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let status = StatusCode::from_u16(code).unwrap();
    (status, Json(json!({"error": true, "code": "forced"}))).into_response()
}

async fn sessions(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return reject("credentials.invalid");
    }
    let session = issue(&state, true);
    Json(json!({
        "token": session.access_token(),
        "refreshToken": session.refresh_token(),
        "permissions": ["metrics.list"],
        "roles": ["editor"],
    }))
    .into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mode = *state.refresh_mode.lock().unwrap();
    match mode {
        RefreshMode::Reject => return reject("token.invalid"),
        RefreshMode::ServerError => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "backend down").into_response();
        }
        RefreshMode::Succeed | RefreshMode::SucceedExpired | RefreshMode::SucceedRevoked => {}
    }

    let presented = body["refreshToken"].as_str().unwrap_or_default().to_string();
    let known = state.tokens.lock().unwrap().valid_refresh.clone();
    if known.as_deref() != Some(presented.as_str()) {
        return reject("token.invalid");
    }

    let mut session = issue(&state, mode == RefreshMode::Succeed);
    if mode == RefreshMode::SucceedRevoked {
        session = Session::new(
            session.access_token().replacen("at_", "revoked_", 1),
            session.refresh_token(),
        );
    }
    Json(json!({
        "token": session.access_token(),
        "refreshToken": session.refresh_token(),
    }))
    .into_response()
}

/// Navigator that records every destination.
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_string());
    }
}

/// Cookie jar whose session writes fail, as a full disk would.
pub(crate) struct UnwritableStore {
    pub(crate) jar: CookieJar,
}

impl CredentialStore for UnwritableStore {
    fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        self.jar.get(name)
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()> {
        self.jar.set(name, value, options)
    }

    fn destroy<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        self.jar.destroy(name)
    }

    fn set_session<'a>(
        &'a self,
        _session: &'a Session,
        _options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(session_store::Error::Io("no space left on device".into())) })
    }

    fn session(&self) -> Pin<Box<dyn Future<Output = Option<Session>> + Send + '_>> {
        self.jar.session()
    }
}
