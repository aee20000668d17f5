//! Execution context: browser-like client vs server-rendered request
//!
//! The only behavioral difference between the two is what happens when the
//! session is unusable. A browser context clears credentials and navigates to
//! the sign-in page; a server context returns `AuthTokenError` so the request
//! handler can answer with a redirect.

use std::fmt;
use std::sync::Arc;

/// Moves the application to another page (the browser context's side effect
/// on sign-in and sign-out).
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Where a `SessionClient` runs.
#[derive(Clone)]
pub enum ExecutionContext {
    /// Ambient client storage, navigation available
    Browser(Arc<dyn Navigator>),
    /// One incoming server request, no page to navigate
    Server,
}

impl ExecutionContext {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionContext::Browser(_) => "browser",
            ExecutionContext::Server => "server",
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
