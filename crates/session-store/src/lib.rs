//! Credential storage for session tokens
//!
//! Defines the `CredentialStore` contract the session client reads and writes
//! tokens through, plus the two adapters a deployment needs:
//!
//! - `CookieJar`: bound to one incoming server request. Reads the request's
//!   `Cookie` header and collects `Set-Cookie` values for the response.
//! - `FileCredentialStore`: ambient storage for a long-lived client process,
//!   persisted as a JSON file with atomic writes.
//!
//! Which execution context a client runs in is decided by which store instance
//! it is constructed with; the contract itself takes no context argument.

pub mod error;
pub mod file;
pub mod jar;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use file::FileCredentialStore;
pub use jar::CookieJar;
pub use session::{
    ACCESS_TOKEN_COOKIE, CookieOptions, DEFAULT_COOKIE_MAX_AGE, DEFAULT_COOKIE_PATH,
    REFRESH_TOKEN_COOKIE, Session,
};
pub use store::CredentialStore;
