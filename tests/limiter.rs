//! End-to-end behaviour of the rate limiter against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use floodgate::error::{FloodgateError, Result};
use floodgate::ratelimit::{RateLimiter, Store};
use floodgate::stores::MemoryStore;

const LOGIN_KEY: &str = "login-attempt-from-127.0.0.1";
const RESET_KEY: &str = "reset-password-attempt-from-127.0.0.1";

/// Wraps a memory store and can be switched into an outage.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(FloodgateError::StoreUnavailable("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()> {
        self.check()?;
        self.inner.init_with_ttl(key, ttl_secs).await
    }

    async fn get(&self, key: &str) -> Result<u64> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        self.check()?;
        self.inner.increment(key).await
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        self.check()?;
        self.inner.get_ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }
}

/// Memory store that yields to the scheduler before every call, so
/// concurrent callers interleave between store operations.
#[derive(Default)]
struct YieldingStore {
    inner: MemoryStore,
}

#[async_trait]
impl Store for YieldingStore {
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.init_with_ttl(key, ttl_secs).await
    }

    async fn get(&self, key: &str) -> Result<u64> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        tokio::task::yield_now().await;
        self.inner.increment(key).await
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        tokio::task::yield_now().await;
        self.inner.get_ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.delete(key).await
    }
}

/// Ten tasks each open a lock on `key` and record one hit.
async fn hit_concurrently(limiter: &RateLimiter, key: &'static str) {
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let lock = limiter.new_lock(key, 10, Duration::from_secs(60)).await.unwrap();
                assert!(lock.is_allowed().await, "expected to be allowed");
                lock.hit().await.unwrap();
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
}

fn limiter() -> RateLimiter {
    RateLimiter::with_store(MemoryStore::new())
}

#[tokio::test]
async fn test_five_attempts_within_ten_seconds() {
    let limiter = limiter();
    let allowed = 5u64;

    let lock = limiter
        .new_lock(LOGIN_KEY, allowed, Duration::from_secs(10))
        .await
        .unwrap();

    for i in 0..allowed * 100 {
        if lock.is_allowed().await {
            assert!(i < allowed, "event {} should have been denied", i);
        } else {
            assert!(i >= allowed, "event {} should have been allowed", i);
        }
        assert_ok!(lock.hit().await);
    }
}

#[tokio::test]
async fn test_same_key_stays_locked_across_new_locks() {
    let limiter = limiter();

    let lock = limiter.new_lock(LOGIN_KEY, 5, Duration::from_secs(10)).await.unwrap();
    for _ in 0..5 {
        lock.hit().await.unwrap();
    }

    for _ in 0..1000 {
        let lock = limiter.new_lock(LOGIN_KEY, 5, Duration::from_secs(10)).await.unwrap();
        assert!(!lock.is_allowed().await, "key should still be locked");
    }
}

#[tokio::test]
async fn test_unlimited_key_is_always_allowed() {
    let limiter = limiter();

    for _ in 0..100 {
        let lock = limiter.new_lock("unlimited", 0, Duration::from_secs(10)).await.unwrap();
        assert!(lock.is_allowed().await);
        lock.hit().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_are_all_recorded() {
    let limiter = limiter();
    limiter.remove_lock(RESET_KEY).await.unwrap();
    limiter.new_lock(RESET_KEY, 10, Duration::from_secs(60)).await.unwrap();

    hit_concurrently(&limiter, RESET_KEY).await;

    let lock = limiter.new_lock(RESET_KEY, 10, Duration::from_secs(60)).await.unwrap();
    assert_eq!(lock.hits().await.unwrap(), 10);
    assert!(!lock.is_allowed().await, "should not be allowed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_on_interleaving_store() {
    let limiter = RateLimiter::with_store(YieldingStore::default());

    for _ in 0..50 {
        limiter.remove_lock(RESET_KEY).await.unwrap();
        limiter.new_lock(RESET_KEY, 10, Duration::from_secs(60)).await.unwrap();

        hit_concurrently(&limiter, RESET_KEY).await;

        let lock = limiter.new_lock(RESET_KEY, 10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(lock.hits().await.unwrap(), 10);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_first_window_may_drop_hits() {
    let limiter = RateLimiter::with_store(YieldingStore::default());

    for _ in 0..50 {
        limiter.remove_lock(RESET_KEY).await.unwrap();

        // Every hit succeeds, but a late window start can reset the counter.
        hit_concurrently(&limiter, RESET_KEY).await;

        let lock = limiter.new_lock(RESET_KEY, 10, Duration::from_secs(60)).await.unwrap();
        let hits = lock.hits().await.unwrap();
        assert!((1..=10).contains(&hits), "recorded {} hits", hits);
    }
}

#[tokio::test]
async fn test_remove_lock_starts_fresh_window() {
    let limiter = limiter();

    for _ in 0..100 {
        limiter.remove_lock(RESET_KEY).await.unwrap();
        let lock = limiter.new_lock(RESET_KEY, 10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(lock.hits().await.unwrap(), 0);
        assert!(lock.is_allowed().await);
        assert_ok!(lock.hit().await);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fill_and_wait_for_window_to_expire() {
    let limiter = limiter();
    let block = Duration::from_secs(10);

    limiter.remove_lock(LOGIN_KEY).await.unwrap();
    for i in 0..100 {
        let lock = limiter.new_lock(LOGIN_KEY, 10, block).await.unwrap();
        if i >= 10 {
            assert!(!lock.is_allowed().await, "the limit has been hit");
        } else {
            assert!(lock.is_allowed().await);
        }
        lock.hit().await.unwrap();
    }

    let start = Instant::now();
    let lock = limiter.new_lock(LOGIN_KEY, 10, block).await.unwrap();

    while !lock.is_allowed().await {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let waited = start.elapsed();
    assert!(
        block.saturating_sub(waited) <= Duration::from_millis(100),
        "unblocked after {:?}, expected about {:?}",
        waited,
        block
    );
    assert!(waited <= block + Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_login_scenario() {
    let limiter = limiter();
    let key = "login:1.2.3.4";

    for _ in 0..5 {
        let lock = limiter.new_lock(key, 5, Duration::from_secs(10)).await.unwrap();
        assert!(lock.is_allowed().await);
        lock.hit().await.unwrap();
    }

    let lock = limiter.new_lock(key, 5, Duration::from_secs(10)).await.unwrap();
    assert!(!lock.is_allowed().await);

    tokio::time::advance(Duration::from_secs(11)).await;

    assert!(lock.is_allowed().await);
    let lock = limiter.new_lock(key, 5, Duration::from_secs(10)).await.unwrap();
    assert_eq!(lock.hits().await.unwrap(), 0);
    assert!(lock.is_allowed().await);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_reporting() {
    let limiter = limiter();

    let lock = limiter.new_lock("ttl", 5, Duration::from_secs(10)).await.unwrap();
    assert_eq!(lock.get_ttl().await.unwrap(), Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(lock.get_ttl().await.unwrap(), Duration::from_secs(6));

    limiter.remove_lock("ttl").await.unwrap();
    assert_eq!(lock.get_ttl().await.unwrap(), Duration::ZERO);
}

#[tokio::test]
async fn test_sub_second_window_lasts_one_second() {
    let limiter = limiter();

    let lock = limiter
        .new_lock("short", 1, Duration::from_millis(250))
        .await
        .unwrap();

    assert_eq!(lock.window(), Duration::from_secs(1));
    assert_eq!(lock.get_ttl().await.unwrap(), Duration::from_secs(1));
}

#[tokio::test]
async fn test_store_outage() {
    let store = Arc::new(FlakyStore::default());
    let limiter = RateLimiter::with_store(store.clone());

    let lock = limiter.new_lock(LOGIN_KEY, 1, Duration::from_secs(60)).await.unwrap();
    lock.hit().await.unwrap();
    assert!(!lock.is_allowed().await);

    store.down.store(true, Ordering::SeqCst);

    // Reads fail open, writes report the failure, TTL degrades to zero.
    assert!(lock.is_allowed().await);
    let err = assert_err!(lock.hit().await);
    assert!(matches!(err, FloodgateError::StoreUnavailable(_)));
    assert_eq!(lock.get_ttl().await.unwrap(), Duration::ZERO);

    // Starting a window needs the store.
    let err = assert_err!(limiter.new_lock("other", 1, Duration::from_secs(60)).await);
    assert!(matches!(err, FloodgateError::StoreUnavailable(_)));
    assert_err!(limiter.remove_lock(LOGIN_KEY).await);

    store.down.store(false, Ordering::SeqCst);
    assert!(!lock.is_allowed().await);
}
