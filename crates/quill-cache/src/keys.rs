//! Cache key generation.
//!
//! Keys are colon-joined segments (`posts:page:2:per_page:10`). They are
//! relative to the cache namespace, which [`crate::CacheLayer`] prepends.

use crate::finite;
use quill_core::{QuillError, QuillResult};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::{Display, Write};

/// Builds keys from subjects and from function calls.
pub struct CacheKeyGenerator;

impl CacheKeyGenerator {
    /// Joins `kind`, `id` and any qualifiers with `:`.
    #[must_use]
    pub fn for_subject(kind: &str, id: impl Display, qualifiers: &[&dyn Display]) -> String {
        let mut key = format!("{}:{}", kind, id);
        for qualifier in qualifiers {
            let _ = write!(key, ":{}", qualifier);
        }
        key
    }

    /// Key for a call: the function identity plus a SHA-256 of the canonical
    /// JSON encoding of its positional and keyword arguments.
    ///
    /// Object keys are sorted before hashing, so argument maps that compare
    /// equal always produce the same key. NaN and infinite floats are
    /// rejected rather than collapsed into `null`.
    pub fn for_call<A, K>(function: &str, args: &A, kwargs: &K) -> QuillResult<String>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        finite::check(args)
            .and_then(|()| finite::check(kwargs))
            .map_err(|e| QuillError::KeyGeneration(format!("arguments of '{}': {}", function, e)))?;

        let args = serde_json::to_value(args)
            .map_err(|e| QuillError::KeyGeneration(format!("arguments of '{}': {}", function, e)))?;
        let kwargs = serde_json::to_value(kwargs)
            .map_err(|e| QuillError::KeyGeneration(format!("keyword arguments of '{}': {}", function, e)))?;

        let mut canonical = String::new();
        write_canonical(&Value::Array(vec![args, kwargs]), &mut canonical);

        let digest = Sha256::digest(canonical.as_bytes());
        Ok(format!("call:{}:{}", function, hex::encode(digest)))
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Incremental builder for colon-joined keys.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    key: String,
}

impl KeyBuilder {
    /// Starts a key with its leading segment.
    #[must_use]
    pub fn new(kind: impl Display) -> Self {
        Self { key: kind.to_string() }
    }

    /// Appends a segment.
    #[must_use]
    pub fn part(mut self, part: impl Display) -> Self {
        let _ = write!(self.key, ":{}", part);
        self
    }

    /// Appends `name:value`.
    #[must_use]
    pub fn pair(self, name: &str, value: impl Display) -> Self {
        self.part(name).part(value)
    }

    /// Appends `name:value` when a value is present.
    #[must_use]
    pub fn pair_opt<V: Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.pair(name, value),
            None => self,
        }
    }

    /// Finishes the key.
    #[must_use]
    pub fn build(self) -> String {
        self.key
    }
}

/// Whether a request key carries the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestUser<'a> {
    /// The response is the same for every caller.
    Shared,
    /// Per-user response for an anonymous caller.
    Anonymous,
    /// Per-user response for an authenticated caller.
    Authenticated(&'a str),
}

fn sorted_pairs<'a>(params: &'a [(&'a str, &'a str)]) -> Vec<&'a (&'a str, &'a str)> {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort();
    sorted
}

/// Key for a user by id.
#[must_use]
pub fn user(user_id: impl Display) -> String {
    CacheKeyGenerator::for_subject("user", user_id, &[])
}

/// Key for a post by id.
#[must_use]
pub fn post(post_id: impl Display) -> String {
    CacheKeyGenerator::for_subject("post", post_id, &[])
}

/// Key for a page of the posts list, with optional filters.
#[must_use]
pub fn posts_list(page: u32, per_page: u32, category_id: Option<u64>, user_id: Option<u64>) -> String {
    KeyBuilder::new("posts")
        .pair("page", page)
        .pair("per_page", per_page)
        .pair_opt("category", category_id)
        .pair_opt("user", user_id)
        .build()
}

/// Key for a page of one user's posts.
#[must_use]
pub fn user_posts(user_id: impl Display, page: u32, per_page: u32) -> String {
    KeyBuilder::new("user")
        .part(user_id)
        .part("posts")
        .pair("page", page)
        .pair("per_page", per_page)
        .build()
}

/// Key for a page of one category's posts.
#[must_use]
pub fn category_posts(category_id: impl Display, page: u32, per_page: u32) -> String {
    KeyBuilder::new("category")
        .part(category_id)
        .part("posts")
        .pair("page", page)
        .pair("per_page", per_page)
        .build()
}

/// Key for the trending posts list.
#[must_use]
pub fn trending_posts(limit: u32) -> String {
    KeyBuilder::new("trending").part("posts").pair("limit", limit).build()
}

/// Key for a user's public profile.
#[must_use]
pub fn user_profile(user_id: impl Display) -> String {
    CacheKeyGenerator::for_subject("profile", user_id, &[])
}

/// Key for a page of a post's comments.
#[must_use]
pub fn post_comments(post_id: impl Display, page: u32, per_page: u32) -> String {
    KeyBuilder::new("post")
        .part(post_id)
        .part("comments")
        .pair("page", page)
        .pair("per_page", per_page)
        .build()
}

/// Key for a page of search results. The query is hashed so arbitrary
/// user input never reaches the keyspace.
#[must_use]
pub fn search_results(query: &str, page: u32, per_page: u32) -> String {
    let digest = Sha256::digest(query.as_bytes());
    KeyBuilder::new("search")
        .part(&hex::encode(digest)[..32])
        .pair("page", page)
        .pair("per_page", per_page)
        .build()
}

/// Key for an API endpoint with its parameters in sorted order.
#[must_use]
pub fn api_endpoint(endpoint: &str, params: &[(&str, &str)]) -> String {
    sorted_pairs(params)
        .into_iter()
        .fold(KeyBuilder::new("api").part(endpoint), |key, (name, value)| key.pair(name, value))
        .build()
}

/// Key for a request: endpoint, sorted query arguments and optionally the caller.
#[must_use]
pub fn request(endpoint: &str, args: &[(&str, &str)], user: RequestUser<'_>) -> String {
    let mut key = KeyBuilder::new(endpoint);
    if !args.is_empty() {
        let joined = sorted_pairs(args)
            .into_iter()
            .map(|(name, value)| format!("{}:{}", name, value))
            .collect::<Vec<_>>()
            .join(":");
        key = key.pair("args", joined);
    }
    match user {
        RequestUser::Shared => {}
        RequestUser::Anonymous => key = key.pair("user", "anonymous"),
        RequestUser::Authenticated(id) => key = key.pair("user", id),
    }
    key.build()
}

/// Key for a cached page: prefix, path and sorted query arguments.
#[must_use]
pub fn page(prefix: &str, path: &str, args: &[(&str, &str)]) -> String {
    let query = sorted_pairs(args)
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&");
    KeyBuilder::new(prefix).part(path).part(query).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_for_subject() {
        assert_eq!(CacheKeyGenerator::for_subject("user", 42, &[]), "user:42");
        assert_eq!(
            CacheKeyGenerator::for_subject("posts", "page", &[&2, &"per_page", &10]),
            "posts:page:2:per_page:10"
        );
    }

    #[test]
    fn test_catalogue() {
        assert_eq!(user(42), "user:42");
        assert_eq!(post(7), "post:7");
        assert_eq!(posts_list(2, 10, None, None), "posts:page:2:per_page:10");
        assert_eq!(
            posts_list(2, 10, Some(5), Some(9)),
            "posts:page:2:per_page:10:category:5:user:9"
        );
        assert_eq!(user_posts(42, 1, 5), "user:42:posts:page:1:per_page:5");
        assert_eq!(category_posts(3, 1, 5), "category:3:posts:page:1:per_page:5");
        assert_eq!(trending_posts(10), "trending:posts:limit:10");
        assert_eq!(user_profile(42), "profile:42");
        assert_eq!(post_comments(7, 1, 10), "post:7:comments:page:1:per_page:10");
    }

    #[test]
    fn test_search_results_hashes_query() {
        let key = search_results("rust async", 1, 5);
        assert!(key.starts_with("search:"));
        assert!(key.ends_with(":page:1:per_page:5"));
        assert!(!key.contains("rust async"));
        assert_eq!(key, search_results("rust async", 1, 5));
        assert_ne!(key, search_results("rust sync", 1, 5));
    }

    #[test]
    fn test_api_endpoint_sorts_params() {
        assert_eq!(api_endpoint("posts", &[]), "api:posts");
        assert_eq!(
            api_endpoint("posts", &[("page", "2"), ("category", "5")]),
            "api:posts:category:5:page:2"
        );
    }

    #[test]
    fn test_request_key() {
        assert_eq!(request("blog.index", &[], RequestUser::Shared), "blog.index");
        assert_eq!(
            request("blog.index", &[("page", "2"), ("q", "rust")], RequestUser::Shared),
            "blog.index:args:page:2:q:rust"
        );
        assert_eq!(
            request("blog.index", &[], RequestUser::Anonymous),
            "blog.index:user:anonymous"
        );
        assert_eq!(
            request("blog.index", &[("page", "1")], RequestUser::Authenticated("42")),
            "blog.index:args:page:1:user:42"
        );
    }

    #[test]
    fn test_page_key() {
        assert_eq!(
            page("view", "/posts", &[("page", "2"), ("category", "5")]),
            "view:/posts:category=5&page=2"
        );
        assert_eq!(page("view", "/", &[]), "view:/:");
    }

    #[test]
    fn test_for_call_is_deterministic() {
        let a = CacheKeyGenerator::for_call("trending", &(10, "week"), &()).unwrap();
        let b = CacheKeyGenerator::for_call("trending", &(10, "week"), &()).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("call:trending:"));
        assert_eq!(a.len(), "call:trending:".len() + 64);
    }

    #[test]
    fn test_for_call_distinguishes_arguments() {
        let a = CacheKeyGenerator::for_call("trending", &(10,), &()).unwrap();
        let b = CacheKeyGenerator::for_call("trending", &(11,), &()).unwrap();
        let c = CacheKeyGenerator::for_call("popular", &(10,), &()).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_for_call_ignores_map_order() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for (k, v) in [("page", 1), ("per_page", 10), ("category", 5)] {
            first.insert(k, v);
        }
        for (k, v) in [("category", 5), ("per_page", 10), ("page", 1)] {
            second.insert(k, v);
        }
        let ordered: BTreeMap<_, _> = first.iter().map(|(k, v)| (*k, *v)).collect();

        let a = CacheKeyGenerator::for_call("list", &(), &first).unwrap();
        let b = CacheKeyGenerator::for_call("list", &(), &second).unwrap();
        let c = CacheKeyGenerator::for_call("list", &(), &ordered).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_for_call_rejects_non_finite_floats() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = CacheKeyGenerator::for_call("f", &(value,), &()).unwrap_err();
            assert!(matches!(err, QuillError::KeyGeneration(_)));
        }

        let mut kwargs = BTreeMap::new();
        kwargs.insert("ratio", f32::NAN);
        assert!(CacheKeyGenerator::for_call("f", &(), &kwargs).is_err());

        let none = CacheKeyGenerator::for_call("f", &(None::<f64>,), &()).unwrap();
        let zero = CacheKeyGenerator::for_call("f", &(Some(0.0_f64),), &()).unwrap();
        assert_ne!(none, zero);
    }

    #[test]
    fn test_for_call_rejects_unserializable_arguments() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys cannot become JSON object keys");
        let err = CacheKeyGenerator::for_call("f", &(), &bad).unwrap_err();
        assert!(matches!(err, QuillError::KeyGeneration(_)));

        struct Opaque;
        impl Serialize for Opaque {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("opaque handle"))
            }
        }
        let err = CacheKeyGenerator::for_call("f", &Opaque, &()).unwrap_err();
        assert!(err.to_string().contains("opaque handle"));
    }
}
