//! Backend session service endpoints and wire types
//!
//! - `GET /me` returns the signed-in user
//! - `POST /sessions` exchanges email/password for a token pair
//! - `POST /refresh` exchanges a refresh token for a new token pair

use common::Secret;
use serde::{Deserialize, Serialize};
use session_store::Session;

pub const ME_PATH: &str = "/me";
pub const SESSIONS_PATH: &str = "/sessions";
pub const REFRESH_PATH: &str = "/refresh";

/// The signed-in user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Email/password pair submitted at sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInCredentials {
    pub email: String,
    pub password: Secret<String>,
}

impl SignInCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSessionResponse {
    pub token: Secret<String>,
    pub refresh_token: Secret<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CreateSessionResponse {
    pub fn session(&self) -> Session {
        Session::new(self.token.expose().as_str(), self.refresh_token.expose().as_str())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub token: Secret<String>,
    pub refresh_token: Secret<String>,
}

impl RefreshResponse {
    pub fn session(&self) -> Session {
        Session::new(self.token.expose().as_str(), self.refresh_token.expose().as_str())
    }
}
