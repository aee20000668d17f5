//! Failure classification for backend responses
//!
//! The backend marks an expired access token with a 401 whose JSON body
//! carries `"code": "token.expired"`. Any other 401 means the session is not
//! usable at all. Everything else is an ordinary request failure.

use serde::Deserialize;

/// Error code the backend uses for an expired access token.
pub const TOKEN_EXPIRED_CODE: &str = "token.expired";

/// How the transport reacts to a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Not an auth failure; propagated to the caller untouched
    NonAuth,
    /// Access token expired; joins the single-flight refresh
    TokenExpired,
    /// 401 with any other or no code; sign-out or `AuthTokenError`
    Unauthenticated,
}

/// A non-2xx backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: u16,
    pub code: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

impl Failure {
    /// Build a failure from a response status and raw body. An unparseable
    /// body yields an absent code.
    pub fn new(status: u16, body: &[u8]) -> Self {
        let code = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.code);
        Self {
            status,
            code,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        classify(self.status, self.code.as_deref())
    }

    /// The error returned to a caller when this failure is terminal.
    pub fn into_error(self) -> crate::Error {
        crate::Error::Status {
            status: self.status,
            code: self.code,
            body: self.body,
        }
    }
}

/// Classify a failed response by status and backend error code.
pub fn classify(status: u16, code: Option<&str>) -> FailureKind {
    match (status, code) {
        (401, Some(TOKEN_EXPIRED_CODE)) => FailureKind::TokenExpired,
        (401, _) => FailureKind::Unauthenticated,
        _ => FailureKind::NonAuth,
    }
}
