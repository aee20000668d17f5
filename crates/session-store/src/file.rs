//! File-backed ambient credential store
//!
//! Persists credentials as a JSON object mapping credential name to value,
//! path and absolute expiry. All writes use atomic temp-file + rename and a
//! tokio Mutex serializes them, so a refresh writing a new session and a
//! concurrent sign-out never interleave on disk.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::session::{ACCESS_TOKEN_COOKIE, CookieOptions, REFRESH_TOKEN_COOKIE, Session};
use crate::store::{CredentialStore, StoreFuture};

/// A persisted credential.
///
/// `expires_at` is a unix timestamp in milliseconds, computed at write time
/// from `CookieOptions::max_age`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub value: String,
    pub path: String,
    pub expires_at: u64,
}

impl StoredCredential {
    fn new(value: &str, options: &CookieOptions, now: u64) -> Self {
        Self {
            value: value.to_string(),
            path: options.path.clone(),
            expires_at: now.saturating_add(options.max_age.as_millis() as u64),
        }
    }

    fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// Ambient credential store for a long-lived client process.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, StoredCredential>>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (signed-out cold start).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: HashMap<String, StoredCredential> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), credentials = credentials.len(), "loaded credentials");
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            let store = HashMap::new();
            write_atomic(&path, &store).await?;
            store
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let now = now_millis();
            let state = self.state.lock().await;
            state
                .get(name)
                .filter(|c| c.is_live(now))
                .map(|c| c.value.clone())
        })
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.insert(
                name.to_string(),
                StoredCredential::new(value, options, now_millis()),
            );
            debug!(name, "stored credential");
            write_atomic(&self.path, &state).await
        })
    }

    fn destroy<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(name).is_some() {
                debug!(name, "destroyed credential");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }

    fn set_session<'a>(
        &'a self,
        session: &'a Session,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let now = now_millis();
            let mut state = self.state.lock().await;
            state.insert(
                ACCESS_TOKEN_COOKIE.to_string(),
                StoredCredential::new(session.access_token(), options, now),
            );
            state.insert(
                REFRESH_TOKEN_COOKIE.to_string(),
                StoredCredential::new(session.refresh_token(), options, now),
            );
            debug!("stored session");
            write_atomic(&self.path, &state).await
        })
    }

    fn session(&self) -> Pin<Box<dyn Future<Output = Option<Session>> + Send + '_>> {
        Box::pin(async move {
            let now = now_millis();
            let state = self.state.lock().await;
            let access = state.get(ACCESS_TOKEN_COOKIE).filter(|c| c.is_live(now))?;
            let refresh = state.get(REFRESH_TOKEN_COOKIE).filter(|c| c.is_live(now))?;
            Some(Session::new(&access.value, &refresh.value))
        })
    }

    fn clear_session(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let removed_access = state.remove(ACCESS_TOKEN_COOKIE).is_some();
            let removed_refresh = state.remove(REFRESH_TOKEN_COOKIE).is_some();
            if removed_access || removed_refresh {
                debug!("cleared session");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Write credentials to a file atomically.
///
/// Expired entries are dropped on every write. The temp file is named after
/// the target, lives in the same directory and is renamed over it; permissions are 0600
/// (unix) since the file contains tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, StoredCredential>) -> Result<()> {
    let now = now_millis();
    let live: HashMap<&String, &StoredCredential> =
        data.iter().filter(|(_, c)| c.is_live(now)).collect();
    let json = serde_json::to_string_pretty(&live)
        .map_err(|e| Error::Parse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?;
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
