//! Invalidation requests issued by write operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

/// Keys and patterns a committed write has made stale.
///
/// Built when the write commits and applied before its response returns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvalidationRequest {
    /// Literal keys or glob patterns, relative to the cache namespace.
    pub patterns: BTreeSet<String>,
    /// The write operation that triggered the request.
    pub issued_by: String,
}

impl InvalidationRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new(issued_by: impl Into<String>) -> Self {
        Self {
            patterns: BTreeSet::new(),
            issued_by: issued_by.into(),
        }
    }

    /// Adds a key or pattern.
    #[must_use]
    pub fn with(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.insert(pattern.into());
        self
    }

    /// Adds every key or pattern from `patterns`.
    #[must_use]
    pub fn with_all<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Merges another request into this one.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.patterns.extend(other.patterns);
        self
    }

    /// Returns true if there is nothing to invalidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Invalidation requests for the blog's write operations.
pub struct Invalidation;

impl Invalidation {
    /// A user's record or profile changed.
    #[must_use]
    pub fn user(user_id: impl Display) -> InvalidationRequest {
        InvalidationRequest::new("user_updated")
            .with(format!("user:{}", user_id))
            .with(format!("profile:{}", user_id))
            .with(format!("user:{}:*", user_id))
    }

    /// A post was edited or deleted.
    #[must_use]
    pub fn post(
        post_id: impl Display,
        author_id: Option<u64>,
        category_id: Option<u64>,
    ) -> InvalidationRequest {
        let request = InvalidationRequest::new("post_updated")
            .with(format!("post:{}", post_id))
            .with(format!("post:{}:*", post_id))
            .merge(Self::posts_lists());
        Self::with_owners(request, author_id, category_id)
    }

    /// A post was created.
    #[must_use]
    pub fn post_created(author_id: u64, category_id: Option<u64>) -> InvalidationRequest {
        let request = InvalidationRequest::new("post_created")
            .with("posts:*")
            .with("trending:*");
        Self::with_owners(request, Some(author_id), category_id)
    }

    /// Any change that reorders or filters the public post lists.
    #[must_use]
    pub fn posts_lists() -> InvalidationRequest {
        InvalidationRequest::new("posts_lists_changed").with_all(["posts:*", "trending:*", "search:*"])
    }

    /// A category changed.
    #[must_use]
    pub fn category(category_id: impl Display) -> InvalidationRequest {
        InvalidationRequest::new("category_updated")
            .with(format!("category:{}:*", category_id))
            .with("posts:*")
    }

    /// Search results may be stale.
    #[must_use]
    pub fn search() -> InvalidationRequest {
        InvalidationRequest::new("search_changed").with("search:*")
    }

    /// A comment was added to or removed from a post.
    #[must_use]
    pub fn comments(post_id: impl Display) -> InvalidationRequest {
        InvalidationRequest::new("comments_changed")
            .with(format!("post:{}:comments:*", post_id))
            .with(format!("post:{}", post_id))
    }

    fn with_owners(
        mut request: InvalidationRequest,
        author_id: Option<u64>,
        category_id: Option<u64>,
    ) -> InvalidationRequest {
        if let Some(author_id) = author_id {
            request = request.with(format!("user:{}:posts:*", author_id));
        }
        if let Some(category_id) = category_id {
            request = request.with(format!("category:{}:*", category_id));
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(request: &InvalidationRequest) -> Vec<&str> {
        request.patterns.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_user() {
        let request = Invalidation::user(42);
        assert_eq!(request.issued_by, "user_updated");
        assert_eq!(patterns(&request), vec!["profile:42", "user:42", "user:42:*"]);
    }

    #[test]
    fn test_post_with_owners() {
        let request = Invalidation::post(7, Some(42), Some(3));
        assert_eq!(request.issued_by, "post_updated");
        assert_eq!(
            patterns(&request),
            vec![
                "category:3:*",
                "post:7",
                "post:7:*",
                "posts:*",
                "search:*",
                "trending:*",
                "user:42:posts:*",
            ]
        );
    }

    #[test]
    fn test_post_created() {
        let request = Invalidation::post_created(42, None);
        assert_eq!(patterns(&request), vec!["posts:*", "trending:*", "user:42:posts:*"]);
    }

    #[test]
    fn test_category_and_search() {
        assert_eq!(patterns(&Invalidation::category(3)), vec!["category:3:*", "posts:*"]);
        assert_eq!(patterns(&Invalidation::search()), vec!["search:*"]);
    }

    #[test]
    fn test_builder_dedupes() {
        let request = InvalidationRequest::new("test")
            .with("posts:*")
            .with_all(["posts:*", "user:1"]);
        assert_eq!(request.patterns.len(), 2);
        assert!(!request.is_empty());
        assert!(InvalidationRequest::new("noop").is_empty());
    }
}
