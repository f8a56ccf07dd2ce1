use std::time::Duration;

use super::runtime;
use crate::{
    MemoryBackend,
    backend::{Backend, Transaction, Ttl},
};

#[test]
fn ttl_maps_pttl_sentinels() {
    assert_eq!(Ttl::from_pttl_millis(-1), Ttl::Persistent);
    assert_eq!(Ttl::from_pttl_millis(-2), Ttl::Missing);
    assert_eq!(Ttl::from_pttl_millis(0), Ttl::Expires(Duration::ZERO));
    assert_eq!(
        Ttl::from_pttl_millis(1500),
        Ttl::Expires(Duration::from_millis(1500))
    );
}

#[test]
fn create_if_absent_only_creates_once() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();

        let mut tx = backend.watch("k").await.unwrap();
        assert!(tx.create_if_absent(Duration::from_secs(10)).await.unwrap());
        assert!(!tx.create_if_absent(Duration::from_secs(10)).await.unwrap());
        tx.finish().await.unwrap();

        assert_eq!(backend.raw_count("k"), Some(1));
        assert_eq!(backend.len(), 1);
    });
}

#[test]
fn increment_commits_when_key_untouched() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();
        backend.insert_raw("k", 1, Some(Duration::from_secs(10)));

        let mut tx = backend.watch("k").await.unwrap();
        let (count, ttl) = tx.increment().await.unwrap().unwrap();

        assert_eq!(count, 2);
        assert!(matches!(ttl, Ttl::Expires(left) if left <= Duration::from_secs(10)));
    });
}

#[test]
fn concurrent_write_aborts_watched_increment() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();
        backend.insert_raw("k", 1, Some(Duration::from_secs(10)));

        let mut loser = backend.watch("k").await.unwrap();
        let mut winner = backend.watch("k").await.unwrap();

        assert_eq!(winner.increment().await.unwrap().map(|(c, _)| c), Some(2));
        assert_eq!(loser.increment().await.unwrap(), None);
        assert_eq!(loser.read().await.unwrap(), None);

        assert_eq!(backend.raw_count("k"), Some(2));
    });
}

#[test]
fn creation_after_watch_of_absent_key_is_a_conflict() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();

        let mut late = backend.watch("k").await.unwrap();
        let mut early = backend.watch("k").await.unwrap();
        assert!(early.create_if_absent(Duration::from_secs(10)).await.unwrap());

        assert!(!late.create_if_absent(Duration::from_secs(10)).await.unwrap());
        assert_eq!(late.increment().await.unwrap(), None);
        assert_eq!(backend.raw_count("k"), Some(1));
    });
}

#[test]
fn read_reports_missing_key_as_zero() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();

        let mut tx = backend.watch("k").await.unwrap();
        assert_eq!(tx.read().await.unwrap(), Some((0, Ttl::Missing)));
    });
}

#[test]
fn increment_on_missing_key_has_no_expiry() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();

        let mut tx = backend.watch("k").await.unwrap();
        assert_eq!(tx.increment().await.unwrap(), Some((1, Ttl::Persistent)));
        assert!(tx.expire(Duration::from_secs(5)).await.unwrap());

        let mut tx = backend.watch("k").await.unwrap();
        assert!(matches!(tx.read().await.unwrap(), Some((1, Ttl::Expires(_)))));
    });
}

#[test]
fn expire_on_missing_key_is_refused() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();

        let mut tx = backend.watch("k").await.unwrap();
        assert!(!tx.expire(Duration::from_secs(5)).await.unwrap());
    });
}

#[test]
fn expired_counters_read_as_absent_and_can_be_purged() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();
        backend.insert_raw("a", 3, Some(Duration::from_millis(30)));
        backend.insert_raw("b", 3, None);

        runtime::async_sleep(Duration::from_millis(60)).await;

        assert_eq!(backend.raw_count("a"), None);
        assert_eq!(backend.len(), 1);

        let mut tx = backend.watch("a").await.unwrap();
        assert_eq!(tx.read().await.unwrap(), Some((0, Ttl::Missing)));

        backend.purge_expired();
        assert_eq!(backend.len(), 1);
        assert!(!backend.is_empty());
    });
}

#[test]
fn ttl_beyond_clock_range_is_kept_without_expiry() {
    runtime::block_on(async {
        let backend = MemoryBackend::new();

        let mut tx = backend.watch("k").await.unwrap();
        assert!(tx.create_if_absent(Duration::MAX).await.unwrap());
        assert!(tx.expire(Duration::MAX).await.unwrap());
        tx.finish().await.unwrap();

        let mut tx = backend.watch("k").await.unwrap();
        assert_eq!(tx.read().await.unwrap(), Some((1, Ttl::Persistent)));
    });
}
