//! The credential store contract
//!
//! Uses `Pin<Box<dyn Future>>` return types so stores can be shared as
//! `Arc<dyn CredentialStore>`.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::session::{ACCESS_TOKEN_COOKIE, CookieOptions, REFRESH_TOKEN_COOKIE, Session};

/// Boxed future returned by fallible store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Get/set/destroy access to named credentials within one execution context.
///
/// Every call observes a consistent snapshot: adapters never expose a state
/// where a concurrent write is half applied.
pub trait CredentialStore: Send + Sync {
    /// Current value of a credential, or `None` if absent or expired.
    fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

    /// Write a single credential.
    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()>;

    /// Remove a credential. Removing an absent credential succeeds.
    fn destroy<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()>;

    /// Replace both tokens as one update.
    fn set_session<'a>(
        &'a self,
        session: &'a Session,
        options: &'a CookieOptions,
    ) -> StoreFuture<'a, ()>;

    /// Both tokens read under one lock, or `None` unless both are present.
    fn session(&self) -> Pin<Box<dyn Future<Output = Option<Session>> + Send + '_>>;

    /// Destroy both tokens.
    fn clear_session(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.destroy(ACCESS_TOKEN_COOKIE).await?;
            self.destroy(REFRESH_TOKEN_COOKIE).await
        })
    }
}
