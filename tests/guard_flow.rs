//! End-to-end flow through `Guard`: fingerprint, cache, throttle, retry.

use api_resilience::{CacheCategory, CancellationToken, Error, Guard, RemoteError, ResilienceConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Thread {
    title: String,
    comments: Vec<String>,
}

fn guard(max_requests: u32, window: Duration) -> Guard {
    assert_ok!(Guard::new(
        &ResilienceConfig::default()
            .with_limiter(max_requests, window)
            .with_retry(4, Duration::from_millis(10)),
    ))
}

#[tokio::test]
async fn test_throttled_fetch_recovers_and_is_cached() {
    let guard = guard(10, Duration::from_secs(1));
    let key = guard.fingerprint("thread", &json!({"url": "https://example.com/t/1", "depth": 2}));
    let calls = AtomicU32::new(0);

    let fetch = || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                return Err(Error::Remote(RemoteError::new(429, "Too Many Requests")));
            }
            Ok(Thread {
                title: "hello".into(),
                comments: vec!["first".into()],
            })
        }
    };

    let thread = assert_ok!(guard.fetch(CacheCategory::Details, &key, fetch).await);
    assert_eq!(thread.title, "hello");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Same fingerprint, different key order in the params.
    let again_key = guard.fingerprint("thread", &json!({"depth": 2, "url": "https://example.com/t/1"}));
    assert_eq!(again_key, key);
    let cached: Thread = assert_ok!(
        guard
            .fetch(CacheCategory::Details, &again_key, || async {
                Err(Error::Remote(RemoteError::new(500, "should not be called")))
            })
            .await
    );
    assert_eq!(cached, thread);

    let stats = guard.stats();
    assert_eq!(stats.limiter.request_count, 3);
    assert_eq!(stats.caches["details"].hits, 1);
    assert_eq!(stats.caches["details"].misses, 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_rate_limited() {
    let guard = guard(100, Duration::from_secs(1));
    let key = guard.fingerprint("search", &json!({"query": "rust"}));

    let err = assert_err!(
        guard
            .fetch::<Vec<String>, _, _>(CacheCategory::Queries, &key, || async {
                Err(Error::Remote(RemoteError::new(429, "rate limit")))
            })
            .await
    );
    assert!(err.is_rate_limited());
    match err {
        Error::RateLimited { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert!(!guard.caches().cache(CacheCategory::Queries).has(&key));
}

#[tokio::test]
async fn test_distinct_requests_share_the_limiter() {
    let guard = guard(3, Duration::from_millis(150));
    let start = Instant::now();

    let mut handles = Vec::new();
    for i in 0..6 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            let key = guard.fingerprint("info", &json!({ "name": format!("sub-{i}") }));
            guard
                .fetch(CacheCategory::Metadata, &key, || async move { Ok(i) })
                .await
        }));
    }
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    // Three tokens up front, the other three at one per 50ms.
    assert!(start.elapsed() >= Duration::from_millis(120), "took {:?}", start.elapsed());
    let stats = guard.stats();
    assert_eq!(stats.limiter.request_count, 6);
    assert_eq!(stats.caches["metadata"].size, 6);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let guard = assert_ok!(Guard::new(
        &ResilienceConfig::default()
            .with_limiter(100, Duration::from_secs(1))
            .with_retry(5, Duration::from_secs(10)),
    ));
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    let start = Instant::now();
    let key = guard.fingerprint("thread", &json!({"id": 1}));
    let err = assert_err!(
        guard
            .fetch_cancellable::<String, _, _>(
                CacheCategory::Details,
                &key,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Error::Remote(RemoteError::new(429, "slow down"))) }
                },
                &token,
            )
            .await
    );
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let guard = guard(2, Duration::from_secs(60));
    let key = guard.fingerprint("info", &json!({"name": "rust"}));
    assert_ok!(guard.fetch(CacheCategory::Metadata, &key, || async { Ok(1u8) }).await);
    assert_ok!(guard.call(|| async { Ok(()) }).await);
    assert!(!guard.limiter().try_acquire());

    guard.reset();
    let stats = guard.stats();
    assert_eq!(stats.limiter.tokens_available, 2);
    assert_eq!(stats.limiter.request_count, 0);
    assert!(stats.caches.values().all(|c| c.size == 0 && c.hits == 0 && c.misses == 0));
}
