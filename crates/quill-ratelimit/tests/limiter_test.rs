//! End-to-end limiter behaviour on the in-memory store.

use quill_core::{Clock, ManualClock};
use quill_ratelimit::{Decision, Identity, RateLimitPolicy, RateLimiter};
use quill_store::MemoryStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    limiter: RateLimiter,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), clock.clone(), "quill:rl");
        Self {
            clock,
            store,
            limiter,
        }
    }
}

#[tokio::test]
async fn test_login_scenario() {
    let h = Harness::new();
    let window = Duration::from_secs(60);

    for expected in [4, 3, 2, 1, 0] {
        let decision = h
            .limiter
            .check_and_record("ip:1.2.3.4", "login", 5, window)
            .await
            .unwrap();
        assert!(decision.is_admitted());
        assert_eq!(decision.remaining(), expected);
    }

    let sixth = h
        .limiter
        .check_and_record("ip:1.2.3.4", "login", 5, window)
        .await
        .unwrap();
    assert_eq!(sixth.retry_after_secs(), Some(60));

    h.clock.advance(Duration::from_secs(61));
    let seventh = h
        .limiter
        .check_and_record("ip:1.2.3.4", "login", 5, window)
        .await
        .unwrap();
    assert_eq!(seventh.remaining(), 4);
}

#[tokio::test]
async fn test_no_trailing_window_exceeds_limit() {
    let h = Harness::new();
    let max_events = 4;
    let window = Duration::from_secs(10);
    let window_ms = 10_000;
    let mut admitted: VecDeque<i64> = VecDeque::new();

    // 1.7s steps walk the clock across several window boundaries.
    for _ in 0..60 {
        let decision = h
            .limiter
            .check_and_record("user:9", "comment", max_events, window)
            .await
            .unwrap();
        let now = h.clock.now_millis();
        if decision.is_admitted() {
            admitted.push_back(now);
        }
        while admitted.front().is_some_and(|&t| t <= now - window_ms) {
            admitted.pop_front();
        }
        assert!(admitted.len() <= max_events as usize);
        h.clock.advance(Duration::from_millis(1_700));
    }
}

#[tokio::test]
async fn test_rejected_retry_counts_down() {
    let h = Harness::new();
    let policy = RateLimitPolicy::new(1, Duration::from_secs(30));
    let identity = Identity::ip("10.0.0.1");

    h.limiter.check(&identity, "register", &policy).await.unwrap();
    h.clock.advance(Duration::from_secs(12));

    let decision = h.limiter.check(&identity, "register", &policy).await.unwrap();
    assert_eq!(
        decision,
        Decision::Rejected {
            retry_after: Duration::from_secs(18)
        }
    );
}

#[tokio::test]
async fn test_actions_and_identities_are_independent() {
    let h = Harness::new();
    let policy = RateLimitPolicy::new(1, Duration::from_secs(60));

    let alice = Identity::user("alice");
    let bob = Identity::user("bob");
    assert!(h.limiter.check(&alice, "login", &policy).await.unwrap().is_admitted());
    assert!(h.limiter.check(&alice, "api", &policy).await.unwrap().is_admitted());
    assert!(h.limiter.check(&bob, "login", &policy).await.unwrap().is_admitted());
    assert!(!h.limiter.check(&alice, "login", &policy).await.unwrap().is_admitted());

    assert_eq!(
        h.store.keys(),
        vec![
            "quill:rl:user:alice:api".to_string(),
            "quill:rl:user:alice:login".to_string(),
            "quill:rl:user:bob:login".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let h = Harness::new();
    h.store.set_available(false);

    for _ in 0..10 {
        let decision = h
            .limiter
            .check_and_record("ip:1.2.3.4", "login", 5, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(decision.is_admitted());
    }

    h.store.set_available(true);
    let decision = h
        .limiter
        .check_and_record("ip:1.2.3.4", "login", 5, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(decision.remaining(), 4);
}

#[tokio::test]
async fn test_windows_expire_from_store() {
    let h = Harness::new();
    h.limiter
        .check_and_record("ip:1.2.3.4", "login", 5, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(h.store.len(), 1);

    h.clock.advance(Duration::from_secs(61));
    assert!(h.store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_exceed_limit() {
    let h = Harness::new();
    // Two limiters over one store behave like two processes sharing Redis.
    let limiters = [
        Arc::new(h.limiter.clone()),
        Arc::new(RateLimiter::new(h.store.clone(), h.clock.clone(), "quill:rl")),
    ];

    let mut handles = Vec::new();
    for i in 0..200 {
        let limiter = limiters[i % 2].clone();
        handles.push(tokio::spawn(async move {
            limiter
                .check_and_record("ip:1.2.3.4", "login", 5, Duration::from_secs(60))
                .await
                .unwrap()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().is_admitted() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);

    let status = h
        .limiter
        .status("ip:1.2.3.4", "login", &RateLimitPolicy::new(5, Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(status.remaining, 0);
}
