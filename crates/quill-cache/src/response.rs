//! Cached HTTP responses.

use serde::{Deserialize, Serialize};

/// A response captured for the page cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name and value pairs, in original order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: String,
}

impl CachedResponse {
    /// Headers that describe one specific transfer and must not be replayed.
    const HOP_HEADERS: &'static [&'static str] = &[
        "connection",
        "content-length",
        "date",
        "set-cookie",
        "transfer-encoding",
    ];

    /// Captures a response if it may be cached.
    ///
    /// Only `200 OK` responses with a UTF-8 body are kept.
    #[must_use]
    pub fn capture(status: u16, headers: Vec<(String, String)>, body: &[u8]) -> Option<Self> {
        if !Self::is_cacheable(status) {
            return None;
        }
        let body = std::str::from_utf8(body).ok()?.to_string();
        let headers = headers
            .into_iter()
            .filter(|(name, _)| !Self::HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()))
            .collect();
        Some(Self { status, headers, body })
    }

    /// Whether a response with `status` may be cached.
    #[must_use]
    pub const fn is_cacheable(status: u16) -> bool {
        status == 200
    }

    /// Returns the first value of a header, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
