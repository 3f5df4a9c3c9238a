//! Session cookie propagation
//!
//! Once the backend is serving, the embedded view must present the session
//! secret on every request. The orchestrator hands a [`SessionCookie`] to a
//! [`CookieStore`], which the windowing layer implements for its views.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::CookieError;
use crate::session::Session;

/// Name of the cookie carrying the session secret
pub const SESSION_COOKIE_NAME: &str = "_php_native";

/// A cookie to install in the embedded content's cookie store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
    /// Origin the cookie applies to
    pub url: String,
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
}

impl SessionCookie {
    /// The cookie for a backend bound on `port`
    #[must_use]
    pub fn for_backend(session: &Session, port: u16) -> Self {
        Self {
            url: format!("http://localhost:{port}"),
            name: SESSION_COOKIE_NAME.to_string(),
            value: session.secret().to_hex(),
        }
    }
}

/// The embedded content's cookie store
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Install or replace a cookie
    async fn set(&self, cookie: SessionCookie) -> Result<(), CookieError>;
}

/// In-memory cookie store, used where no embedded view exists
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<SessionCookie>>,
}

impl CookieJar {
    /// Create an empty jar
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cookie by origin and name
    #[must_use]
    pub fn get(&self, url: &str, name: &str) -> Option<SessionCookie> {
        self.cookies
            .read()
            .iter()
            .find(|c| c.url == url && c.name == name)
            .cloned()
    }

    /// Number of stored cookies
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    /// Whether the jar is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }
}

#[async_trait]
impl CookieStore for CookieJar {
    async fn set(&self, cookie: SessionCookie) -> Result<(), CookieError> {
        let mut cookies = self.cookies.write();
        cookies.retain(|c| !(c.url == cookie.url && c.name == cookie.name));
        cookies.push(cookie);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BackendSettings;

    #[tokio::test]
    async fn test_jar_replaces_same_origin_and_name() {
        let session = Session::new(4000, BackendSettings::new());
        let jar = CookieJar::new();

        jar.set(SessionCookie::for_backend(&session, 8100)).await.unwrap();
        jar.set(SessionCookie::for_backend(&session, 8100)).await.unwrap();
        jar.set(SessionCookie::for_backend(&session, 8101)).await.unwrap();
        assert_eq!(jar.len(), 2);

        let cookie = jar.get("http://localhost:8100", SESSION_COOKIE_NAME).unwrap();
        assert_eq!(cookie.value, session.secret().to_hex());
        assert!(jar.get("http://localhost:9999", SESSION_COOKIE_NAME).is_none());
    }
}
