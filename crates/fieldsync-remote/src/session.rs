//! Remote session state.
//!
//! The engine never acquires credentials itself; the host hands it a bearer
//! token through this handle. Invalidating the session makes every later
//! remote call fail fast with `Unauthorized` instead of retrying a doomed
//! request, until the host installs a fresh token.

use std::sync::{PoisonError, RwLock};

/// Shared holder for the current bearer token.
#[derive(Debug, Default)]
pub struct AuthSession {
    token: RwLock<Option<String>>,
}

impl AuthSession {
    /// Create a session with no token (signed out).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that starts out authenticated.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Install a fresh token after (re)authentication.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Drop the current token. Called when the remote rejects credentials.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current token, if any.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a token is currently installed.
    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = AuthSession::new();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());

        session.set_token("tok-1");
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("tok-1"));

        session.set_token("tok-2");
        assert_eq!(session.token().as_deref(), Some("tok-2"));

        session.clear();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_with_token() {
        let session = AuthSession::with_token("abc");
        assert!(session.is_authenticated());
    }
}
