//! HTTP transport to the backend session service
//!
//! Every attempt reads the access token from the credential store at send
//! time and attaches it as a bearer credential. Failed responses are
//! classified; expired tokens go through the client's `RefreshCoordinator`,
//! unusable sessions end in sign-out (browser) or `AuthTokenError` (server).

use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_store::{ACCESS_TOKEN_COOKIE, CredentialStore, REFRESH_TOKEN_COOKIE, Session};
use tracing::{debug, info, instrument, warn};

use crate::api::{
    CreateSessionRequest, CreateSessionResponse, ME_PATH, REFRESH_PATH, RefreshRequest,
    RefreshResponse, SESSIONS_PATH, SignInCredentials, User,
};
use crate::classify::{Failure, FailureKind};
use crate::config::ClientConfig;
use crate::context::{ExecutionContext, Navigator};
use crate::coordinator::{Admission, PendingRequest, RefreshCoordinator};
use crate::error::{AuthTokenError, Error, Result};
use crate::metrics;

/// A request as the caller describes it, before any credential is attached.
///
/// Kept whole so it can be replayed after a refresh with the same method,
/// path, headers and body.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the backend base URL
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| Error::Encode(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A successful (2xx) backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }
}

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    context: ExecutionContext,
    coordinator: RefreshCoordinator,
}

/// Backend client bound to one credential store and one execution context.
///
/// Cheap to clone; clones share the same refresh coordinator. Build one per
/// request context: two independent clients never share refresh state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    /// Client for a long-lived process with ambient credential storage and a
    /// page to navigate.
    pub fn browser(
        http: reqwest::Client,
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_context(http, config, store, ExecutionContext::Browser(navigator))
    }

    /// Client for one incoming server request; `store` is that request's
    /// cookie jar.
    pub fn server(
        http: reqwest::Client,
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::with_context(http, config, store, ExecutionContext::Server)
    }

    fn with_context(
        http: reqwest::Client,
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                store,
                context,
                coordinator: RefreshCoordinator::new(),
            }),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    /// Send a request with the current session.
    ///
    /// An expired token is refreshed transparently and the request replayed
    /// once. In the browser context an unusable session signs out and the
    /// returned future never completes.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path, context = self.inner.context.label()))]
    pub async fn send(&self, request: RequestSpec) -> Result<ApiResponse> {
        let token = self.bearer_token().await;
        match self.attempt(&request, token.as_deref()).await? {
            Ok(response) => Ok(response),
            Err(failure) => self.handle_failure(request, token, failure).await,
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(RequestSpec::get(path)).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.send(RequestSpec::post(path).json(body)?).await
    }

    /// `GET /me`
    pub async fn fetch_current_user(&self) -> Result<User> {
        self.get(ME_PATH).await?.json()
    }

    /// Exchange email and password for a session.
    ///
    /// Failures are returned as-is; they never trigger refresh or sign-out.
    pub async fn sign_in(&self, credentials: &SignInCredentials) -> Result<User> {
        let request = CreateSessionRequest {
            email: &credentials.email,
            password: credentials.password.expose(),
        };
        let body = self.post_without_session(SESSIONS_PATH, &request).await?;
        let response: CreateSessionResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))?;

        self.inner
            .store
            .set_session(&response.session(), &self.inner.config.cookie)
            .await?;
        self.inner.coordinator.reset_default_token();
        info!(context = self.inner.context.label(), "signed in");

        if let ExecutionContext::Browser(navigator) = &self.inner.context {
            navigator.navigate(&self.inner.config.home_path);
        }

        Ok(User {
            email: credentials.email.clone(),
            permissions: response.permissions,
            roles: response.roles,
        })
    }

    /// Destroy both tokens and, in the browser context, return to the
    /// sign-in page. Succeeds when no session exists.
    pub async fn sign_out(&self) -> Result<()> {
        self.end_session("requested").await
    }

    /// Both stored tokens, if present.
    pub async fn current_session(&self) -> Option<Session> {
        self.inner.store.session().await
    }

    async fn bearer_token(&self) -> Option<String> {
        match self.inner.store.get(ACCESS_TOKEN_COOKIE).await {
            Some(token) => Some(token),
            None => self.inner.coordinator.default_token(),
        }
    }

    /// One HTTP round trip. The outer error is a transport failure; the inner
    /// one a non-2xx response.
    async fn attempt(
        &self,
        request: &RequestSpec,
        token: Option<&str>,
    ) -> Result<std::result::Result<ApiResponse, Failure>> {
        let mut headers = request.headers.clone();
        headers.remove(AUTHORIZATION);
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Encode(format!("invalid bearer token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), self.inner.config.url(&request.path))
            .headers(headers);
        if let Some(timeout) = self.inner.config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if status.is_success() {
            Ok(Ok(ApiResponse {
                status: status.as_u16(),
                headers,
                body,
            }))
        } else {
            Ok(Err(Failure::new(status.as_u16(), &body)))
        }
    }

    /// Send `request` once more with `token`.
    ///
    /// A replay never refreshes again: any 401, `token.expired` included,
    /// means the session is unusable.
    pub(crate) async fn replay(&self, request: RequestSpec, token: &str) -> Result<ApiResponse> {
        debug!(method = %request.method, path = %request.path, "replaying request");
        match self.attempt(&request, Some(token)).await? {
            Ok(response) => Ok(response),
            Err(failure) => match failure.kind() {
                FailureKind::NonAuth => Err(failure.into_error()),
                FailureKind::TokenExpired | FailureKind::Unauthenticated => {
                    self.unauthenticated(failure).await
                }
            },
        }
    }

    async fn handle_failure(
        &self,
        request: RequestSpec,
        sent_with: Option<String>,
        failure: Failure,
    ) -> Result<ApiResponse> {
        match failure.kind() {
            FailureKind::NonAuth => Err(failure.into_error()),
            FailureKind::TokenExpired => self.join_refresh(request, sent_with.as_deref()).await,
            FailureKind::Unauthenticated => self.unauthenticated(failure).await,
        }
    }

    async fn unauthenticated(&self, failure: Failure) -> Result<ApiResponse> {
        match &self.inner.context {
            ExecutionContext::Browser(_) => {
                warn!(code = ?failure.code, "session rejected, signing out");
                if let Err(e) = self.end_session("unauthenticated").await {
                    warn!(error = %e, "failed to clear credentials");
                }
                // Navigation restarts the flow; this request never settles
                std::future::pending().await
            }
            ExecutionContext::Server => {
                debug!(code = ?failure.code, "session rejected");
                Err(AuthTokenError::Unauthenticated { code: failure.code }.into())
            }
        }
    }

    async fn join_refresh(&self, request: RequestSpec, sent_with: Option<&str>) -> Result<ApiResponse> {
        let current = self.bearer_token().await;
        let (pending, rx) = PendingRequest::new(request);
        match self
            .inner
            .coordinator
            .admit(pending, sent_with, current.as_deref())
        {
            Admission::Leader => {
                // Spawned so the refresh settles even if this caller is dropped
                let client = self.clone();
                tokio::spawn(async move { client.drive_refresh().await });
            }
            Admission::Queued => {}
            Admission::Superseded { pending, token } => pending.on_refreshed(self, &token),
        }
        rx.await
            .unwrap_or_else(|_| Err(Error::Internal("refresh settled without a reply".into())))
    }

    /// Run the single refresh call for the current attempt and settle every
    /// queued request with its outcome.
    async fn drive_refresh(&self) {
        let outcome = match self.inner.config.refresh_timeout {
            Some(limit) => tokio::time::timeout(limit, self.refresh())
                .await
                .unwrap_or(Err(Error::RefreshTimeout(limit))),
            None => self.refresh().await,
        };

        match outcome {
            Ok(session) => {
                let token = session.access_token();
                let queue = self.inner.coordinator.settle_success(token);
                metrics::record_refresh("success");
                info!(replaying = queue.len(), "session refreshed");
                for pending in queue {
                    pending.on_refreshed(self, token);
                }
            }
            Err(cause) => {
                metrics::record_refresh("failure");
                warn!(error = %cause, context = self.inner.context.label(), "session refresh failed");
                let error = match &self.inner.context {
                    ExecutionContext::Browser(_) => {
                        // Cleared before waiters wake so none of them sees the old session
                        if let Err(e) = self.end_session("refresh_failed").await {
                            warn!(error = %e, "failed to clear credentials");
                        }
                        Error::RefreshFailed(Box::new(cause))
                    }
                    ExecutionContext::Server => {
                        AuthTokenError::RefreshFailed(cause.to_string()).into()
                    }
                };
                for pending in self.inner.coordinator.settle_failure() {
                    pending.on_refresh_failed(error.clone());
                }
            }
        }
    }

    /// `POST /refresh` with the stored refresh token, then store the new pair.
    async fn refresh(&self) -> Result<Session> {
        let refresh_token = self
            .inner
            .store
            .get(REFRESH_TOKEN_COOKIE)
            .await
            .ok_or(Error::MissingRefreshToken)?;
        let request = RefreshRequest {
            refresh_token: &refresh_token,
        };
        let body = self.post_without_session(REFRESH_PATH, &request).await?;
        let response: RefreshResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))?;
        let session = response.session();
        // The presented refresh token is rotated; an unsaved pair fails the refresh
        self.inner
            .store
            .set_session(&session, &self.inner.config.cookie)
            .await?;
        Ok(session)
    }

    /// POST outside the coordinator, with no bearer credential.
    async fn post_without_session<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Bytes> {
        let mut builder = self
            .inner
            .http
            .post(self.inner.config.url(path))
            .json(body);
        if let Some(timeout) = self.inner.config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Failure::new(status.as_u16(), &body).into_error());
        }
        Ok(body)
    }

    async fn end_session(&self, reason: &'static str) -> Result<()> {
        let cleared = self.inner.store.clear_session().await;
        self.inner.coordinator.reset_default_token();
        if let ExecutionContext::Browser(navigator) = &self.inner.context {
            navigator.navigate(&self.inner.config.sign_in_path);
        }
        metrics::record_sign_out(reason);
        info!(reason, context = self.inner.context.label(), "signed out");
        cleared.map_err(Error::from)
    }
}
