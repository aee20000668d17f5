//! Per-request cookie jar
//!
//! A `CookieJar` is built from the `Cookie` header of one incoming request.
//! Writes update the jar's view immediately (so a refreshed token is visible
//! to the next send within the same request) and are recorded so the handler
//! can emit matching `Set-Cookie` headers on its response.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, Result};
use crate::session::{
    ACCESS_TOKEN_COOKIE, CookieOptions, DEFAULT_COOKIE_PATH, REFRESH_TOKEN_COOKIE, Session,
};
use crate::store::{CredentialStore, StoreFuture};

#[derive(Debug, Clone)]
enum CookieChange {
    Set {
        name: String,
        value: String,
        options: CookieOptions,
    },
    Remove {
        name: String,
    },
}

impl CookieChange {
    fn name(&self) -> &str {
        match self {
            CookieChange::Set { name, .. } | CookieChange::Remove { name } => name,
        }
    }

    fn to_header_value(&self) -> String {
        match self {
            CookieChange::Set {
                name,
                value,
                options,
            } => format!(
                "{name}={value}; Max-Age={}; Path={}",
                options.max_age.as_secs(),
                options.path
            ),
            CookieChange::Remove { name } => {
                format!("{name}=; Max-Age=0; Path={DEFAULT_COOKIE_PATH}")
            }
        }
    }
}

#[derive(Debug, Default)]
struct JarState {
    values: HashMap<String, String>,
    changes: Vec<CookieChange>,
}

/// Credential store bound to a single server-side request.
///
/// Uses a std `Mutex`: no lock is ever held across an await point.
#[derive(Debug, Default)]
pub struct CookieJar {
    state: Mutex<JarState>,
}

impl CookieJar {
    /// An empty jar (a request that carried no cookies).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one or more `Cookie` header values (`a=1; b=2`).
    ///
    /// Malformed pairs are skipped. When a name repeats, the first occurrence
    /// wins, matching how browsers order the most specific cookie first.
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut values = HashMap::new();
        for header in headers {
            for pair in header.split(';') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                values
                    .entry(name.to_string())
                    .or_insert_with(|| value.trim().trim_matches('"').to_string());
            }
        }
        debug!(cookies = values.len(), "parsed request cookies");
        Self {
            state: Mutex::new(JarState {
                values,
                changes: Vec::new(),
            }),
        }
    }

    /// Whether the jar currently holds a credential with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().values.contains_key(name)
    }

    /// `Set-Cookie` header values for every credential written or removed
    /// through this jar. The last change per name wins; output follows the
    /// order of those last changes.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        let state = self.lock();
        let mut latest: Vec<&CookieChange> = Vec::new();
        for change in &state.changes {
            latest.retain(|c| c.name() != change.name());
            latest.push(change);
        }
        latest.into_iter().map(CookieChange::to_header_value).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JarState> {
        // A poisoned jar still holds consistent maps: every mutation is a
        // single insert/remove plus push.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, name: &str, value: &str, options: &CookieOptions) -> Result<()> {
        validate(name, value)?;
        let mut state = self.lock();
        state.values.insert(name.to_string(), value.to_string());
        state.changes.push(CookieChange::Set {
            name: name.to_string(),
            value: value.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    fn remove(&self, name: &str) {
        let mut state = self.lock();
        state.values.remove(name);
        state.changes.push(CookieChange::Remove {
            name: name.to_string(),
        });
    }
}

fn validate(name: &str, value: &str) -> Result<()> {
    let bad_name = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "=;,\"".contains(c));
    if bad_name {
        return Err(Error::InvalidCookie(format!("invalid cookie name {name:?}")));
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || ";,\"\\".contains(c))
    {
        return Err(Error::InvalidCookie(format!(
            "value for {name} contains characters not allowed in a cookie"
        )));
    }
    Ok(())
}

impl CredentialStore for CookieJar {
    fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let value = self.lock().values.get(name).cloned();
        Box::pin(async move { value })
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()> {
        let result = self.write(name, value, options);
        Box::pin(async move { result })
    }

    fn destroy<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        self.remove(name);
        Box::pin(async { Ok(()) })
    }

    fn set_session<'a>(
        &'a self,
        session: &'a Session,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()> {
        let result = validate(ACCESS_TOKEN_COOKIE, session.access_token())
            .and_then(|_| validate(REFRESH_TOKEN_COOKIE, session.refresh_token()))
            .map(|_| {
                let mut state = self.lock();
                for (name, value) in [
                    (ACCESS_TOKEN_COOKIE, session.access_token()),
                    (REFRESH_TOKEN_COOKIE, session.refresh_token()),
                ] {
                    state.values.insert(name.to_string(), value.to_string());
                    state.changes.push(CookieChange::Set {
                        name: name.to_string(),
                        value: value.to_string(),
                        options: options.clone(),
                    });
                }
            });
        Box::pin(async move { result })
    }

    fn session(&self) -> Pin<Box<dyn Future<Output = Option<Session>> + Send + '_>> {
        let session = {
            let state = self.lock();
            match (
                state.values.get(ACCESS_TOKEN_COOKIE),
                state.values.get(REFRESH_TOKEN_COOKIE),
            ) {
                (Some(access), Some(refresh)) => Some(Session::new(access, refresh)),
                _ => None,
            }
        };
        Box::pin(async move { session })
    }
}
