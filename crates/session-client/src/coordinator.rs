//! Single-flight refresh state and the queue of requests waiting on it
//!
//! The coordinator holds no I/O. `SessionClient` asks it to admit a request
//! that failed with an expired token; the answer says whether that request
//! leads a new refresh, waits behind the one in flight, or can be replayed
//! straight away because a newer token already exists. The refresh driver
//! then settles the attempt, which drains the queue and returns to `Idle` in
//! one critical section.
//!
//! State lives in a `std::sync::Mutex` that is never held across an await,
//! so "check `Idle`, set `Refreshing`, enqueue" is atomic even with parallel
//! runtime workers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics;
use crate::transport::{ApiResponse, RequestSpec, SessionClient};

/// A request that failed with an expired token, parked until the refresh it
/// belongs to settles.
pub(crate) struct PendingRequest {
    request: RequestSpec,
    reply: oneshot::Sender<Result<ApiResponse>>,
}

impl PendingRequest {
    pub(crate) fn new(request: RequestSpec) -> (Self, oneshot::Receiver<Result<ApiResponse>>) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }

    /// Replay the original request with `token` and deliver its outcome.
    ///
    /// Each replay runs as its own task; a dropped caller only discards the
    /// result.
    pub(crate) fn on_refreshed(self, client: &SessionClient, token: &str) {
        let client = client.clone();
        let token = token.to_string();
        tokio::spawn(async move {
            let result = client.replay(self.request, &token).await;
            metrics::record_replay(if result.is_ok() { "ok" } else { "error" });
            // Receiver gone means the caller stopped waiting
            let _ = self.reply.send(result);
        });
    }

    /// Fail the request with the refresh attempt's error.
    pub(crate) fn on_refresh_failed(self, error: Error) {
        let _ = self.reply.send(Err(error));
    }
}

/// Outcome of admitting an expired-token failure.
pub(crate) enum Admission {
    /// Coordinator moved to `Refreshing`; the caller must start the refresh.
    Leader,
    /// A refresh is in flight; the request was queued behind it.
    Queued,
    /// The request was sent with a token other than the current one. Replay
    /// it with `token` instead of refreshing again.
    Superseded {
        pending: PendingRequest,
        token: String,
    },
}

enum RefreshState {
    Idle,
    Refreshing { queue: Vec<PendingRequest> },
}

struct Inner {
    state: RefreshState,
    /// Token issued by the most recent successful refresh
    last_issued: Option<String>,
}

/// Per-client refresh state machine. One instance is shared by all clones
/// of a `SessionClient`; distinct clients never share one.
pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                last_issued: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No critical section can leave the state half updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a request whose response was 401 `token.expired`.
    ///
    /// `sent_with` is the bearer token the failed attempt carried; `current`
    /// is the token a request would be sent with now (the store's, else the
    /// last one this coordinator issued). While `Idle`, a request whose token
    /// differs from `current` is replayed with `current` instead of refreshing.
    pub(crate) fn admit(
        &self,
        pending: PendingRequest,
        sent_with: Option<&str>,
        current: Option<&str>,
    ) -> Admission {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if let (RefreshState::Idle, Some(current)) = (&inner.state, current) {
            if sent_with != Some(current) {
                debug!("request carried a superseded token, replaying without refresh");
                return Admission::Superseded {
                    pending,
                    token: current.to_string(),
                };
            }
        }

        metrics::record_queued();
        if let RefreshState::Refreshing { queue } = &mut inner.state {
            queue.push(pending);
            debug!(queued = queue.len(), "request queued behind in-flight refresh");
            return Admission::Queued;
        }
        inner.state = RefreshState::Refreshing {
            queue: vec![pending],
        };
        Admission::Leader
    }

    /// Record `token` as the latest issued credential, return to `Idle`, and
    /// hand back the queue in enqueue order.
    pub(crate) fn settle_success(&self, token: &str) -> Vec<PendingRequest> {
        let mut inner = self.lock();
        inner.last_issued = Some(token.to_string());
        Self::drain(&mut inner)
    }

    /// Return to `Idle` and hand back the queue in enqueue order.
    pub(crate) fn settle_failure(&self) -> Vec<PendingRequest> {
        let mut inner = self.lock();
        Self::drain(&mut inner)
    }

    fn drain(inner: &mut Inner) -> Vec<PendingRequest> {
        match std::mem::replace(&mut inner.state, RefreshState::Idle) {
            RefreshState::Refreshing { queue } => queue,
            RefreshState::Idle => Vec::new(),
        }
    }

    /// Whether a refresh attempt is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(self.lock().state, RefreshState::Refreshing { .. })
    }

    /// Number of requests waiting on the in-flight refresh.
    pub fn queued(&self) -> usize {
        match &self.lock().state {
            RefreshState::Refreshing { queue } => queue.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Token issued by the most recent successful refresh. Used as the
    /// bearer credential when the store holds no access token.
    pub fn default_token(&self) -> Option<String> {
        self.lock().last_issued.clone()
    }

    /// Forget the last issued token (sign-in and sign-out).
    pub fn reset_default_token(&self) {
        self.lock().last_issued = None;
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
