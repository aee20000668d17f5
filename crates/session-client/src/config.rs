//! Client configuration

use std::time::Duration;

use session_store::CookieOptions;

/// Settings shared by every request a `SessionClient` sends.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend session service
    pub base_url: String,
    /// Per-request timeout; `None` leaves reqwest's default (no timeout)
    pub request_timeout: Option<Duration>,
    /// Upper bound on the refresh call. `None` waits indefinitely for the
    /// single in-flight refresh; queued requests wait with it.
    pub refresh_timeout: Option<Duration>,
    /// Lifetime and path of stored tokens
    pub cookie: CookieOptions,
    /// Sign-in entry point navigated to on sign-out (browser context)
    pub sign_in_path: String,
    /// Page navigated to after a successful sign-in (browser context)
    pub home_path: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Join the base URL and a request path.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3333".to_string(),
            request_timeout: None,
            refresh_timeout: None,
            cookie: CookieOptions::default(),
            sign_in_path: "/".to_string(),
            home_path: "/dashboard".to_string(),
        }
    }
}
