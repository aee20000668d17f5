//! Error types for session client operations

use std::time::Duration;

/// Signal to a server-rendered caller that the request context has no usable
/// session. The caller answers its own request with a redirect to sign-in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthTokenError {
    #[error("request is not authenticated")]
    Unauthenticated { code: Option<String> },

    #[error("session refresh failed: {0}")]
    RefreshFailed(String),
}

/// Errors from session client operations.
///
/// `Clone` so a single refresh failure can be delivered unchanged to every
/// request queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("backend returned status {status}")]
    Status {
        status: u16,
        code: Option<String>,
        body: String,
    },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request body: {0}")]
    Encode(String),

    #[error("credential store error: {0}")]
    Store(String),

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("session refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    #[error("session refresh failed: {0}")]
    RefreshFailed(Box<Error>),

    #[error(transparent)]
    AuthToken(#[from] AuthTokenError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure means the session is gone and the user has to sign
    /// in again (as opposed to a failure of this one request).
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Error::AuthToken(_) | Error::RefreshFailed(_))
    }

    /// HTTP status of a backend failure, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<session_store::Error> for Error {
    fn from(err: session_store::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result alias for session client operations.
pub type Result<T> = std::result::Result<T, Error>;
