//! Caller identities a budget is charged to.

use quill_config::LimitScope;
use std::fmt;

/// The caller a window belongs to, such as `ip:1.2.3.4` or `user:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Identity of an unauthenticated caller.
    #[must_use]
    pub fn ip(addr: impl fmt::Display) -> Self {
        Self(format!("ip:{}", addr))
    }

    /// Identity of an authenticated user.
    #[must_use]
    pub fn user(id: impl fmt::Display) -> Self {
        Self(format!("user:{}", id))
    }

    /// Picks the identity for a scope.
    ///
    /// User scope falls back to the address when the caller is anonymous.
    #[must_use]
    pub fn resolve(scope: LimitScope, addr: &str, user_id: Option<&str>) -> Self {
        match (scope, user_id) {
            (LimitScope::User, Some(id)) => Self::user(id),
            _ => Self::ip(addr),
        }
    }

    /// The identity as used in window keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
