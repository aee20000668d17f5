//! Session value and cookie settings

use std::time::Duration;

use common::Secret;

/// Credential name holding the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "session.token";

/// Credential name holding the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "session.refreshToken";

/// Default lifetime of stored credentials (30 days).
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default cookie path.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// An access/refresh token pair.
///
/// Immutable: a refresh produces a new `Session` that replaces the old one
/// through `CredentialStore::set_session`, never a partial update.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: Secret<String>,
    refresh_token: Secret<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose()
    }
}

/// Lifetime and scope applied when a credential is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub max_age: Duration,
    pub path: String,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_COOKIE_MAX_AGE,
            path: DEFAULT_COOKIE_PATH.to_string(),
        }
    }
}
