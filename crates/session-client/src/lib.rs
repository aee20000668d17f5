//! Session transport with single-flight token refresh
//!
//! `SessionClient` sends requests to the backend session service with the
//! current access token as a bearer credential. When a response says the
//! token expired, the per-client `RefreshCoordinator` makes sure exactly one
//! refresh call is in flight, queues every other failing request behind it,
//! and replays the queue with the new token once the refresh settles.
//!
//! Request flow:
//! 1. `SessionClient::send()` attaches `Authorization: Bearer <token>` read
//!    from the credential store at send time
//! 2. A non-2xx response is classified (`classify::classify`)
//! 3. Non-401 failures propagate unchanged
//! 4. 401 `token.expired` joins (or starts) the refresh attempt
//! 5. Any other 401 signs out (browser) or returns `AuthTokenError` (server)
//! 6. A settled refresh replays or fails every queued request exactly once;
//!    a replay that is answered 401 is treated like step 5

pub mod api;
pub mod classify;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod transport;

#[cfg(test)]
mod test_backend;

pub use api::{SignInCredentials, User};
pub use classify::{Failure, FailureKind, classify};
pub use config::ClientConfig;
pub use context::{ExecutionContext, Navigator};
pub use coordinator::RefreshCoordinator;
pub use error::{AuthTokenError, Error, Result};
pub use transport::{ApiResponse, RequestSpec, SessionClient};
