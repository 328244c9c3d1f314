//! Admin access control.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// User name recorded for callers authenticated by the admin token.
pub const ADMIN_USER: &str = "admin";

/// The authenticated caller, inserted into request extensions by the
/// host's authentication layer. Absent for anonymous requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Marks the authenticated caller as an administrator.
///
/// Inserted next to [`AuthenticatedUser`] by whichever layer decides roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminAccess;

/// The configured admin bearer token, kept only as a SHA-256 digest.
#[derive(Clone)]
pub struct AdminToken {
    digest: Arc<[u8]>,
}

impl AdminToken {
    pub fn new(token: &str) -> Self {
        Self {
            digest: Arc::from(Sha256::digest(token.as_bytes()).as_slice()),
        }
    }

    /// Compares digests so the check does not short-circuit on the token
    /// prefix.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        Sha256::digest(presented.as_bytes()).as_slice() == &*self.digest
    }
}

/// Grants admin access to requests carrying the configured bearer token.
///
/// Requests without a matching token pass through untouched; the
/// [`require_admin`] guard decides what happens to them.
pub async fn admin_token_middleware(
    State(token): State<AdminToken>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    if let Some(presented) = presented {
        if token.matches(presented.trim()) {
            debug!("Admin token accepted");
            let extensions = request.extensions_mut();
            extensions.insert(AuthenticatedUser(ADMIN_USER.to_string()));
            extensions.insert(AdminAccess);
        } else {
            debug!("Admin token rejected");
        }
    }

    next.run(request).await
}

/// Requires an administrator.
///
/// Returns 401 for anonymous callers and 403 for authenticated callers
/// without [`AdminAccess`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let extensions = request.extensions();
    if extensions.get::<AuthenticatedUser>().is_none() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if extensions.get::<AdminAccess>().is_none() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
