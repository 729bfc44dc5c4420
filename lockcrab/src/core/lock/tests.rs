use super::{LockError, Locker};
use crate::core::store::{KeyValueStore, MemoryStore};
use crate::core::testutil::FailingStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn locker() -> (Locker, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Locker::new(store.clone()), store)
}

#[test]
fn test_mutex_defaults() {
    let (locker, _) = locker();
    let mutex = locker.mutex("job").build();

    assert_eq!(mutex.name(), "job");
    assert_eq!(mutex.ttl(), Duration::from_secs(10));
    assert_eq!(mutex.retry_count, 50);
    assert_eq!(mutex.retry_delay, Duration::from_secs(1));
    assert!(mutex.value().starts_with("lok_"));
    assert_eq!(mutex.value().len(), 4 + 64);
}

#[test]
fn test_fencing_values_are_unique() {
    let (locker, _) = locker();
    let a = locker.mutex("job").build();
    let b = locker.mutex("job").build();
    assert_ne!(a.value(), b.value());

    let preset = locker.mutex("job").value("handoff").build();
    assert_eq!(preset.value(), "handoff");
}

#[tokio::test]
async fn test_lock_and_unlock() {
    let (locker, store) = locker();
    let mutex = locker.mutex("job").build();

    assert!(mutex.lock().await.unwrap());
    assert_eq!(
        store.get("job").await.unwrap().as_deref(),
        Some(mutex.value())
    );

    mutex.unlock().await.unwrap();
    assert_eq!(store.get("job").await.unwrap(), None);

    // A second release has nothing to remove
    assert!(matches!(mutex.unlock().await, Err(LockError::UnlockFailed)));
}

#[tokio::test(start_paused = true)]
async fn test_contended_lock_fails_then_succeeds_after_release() {
    let (locker, _) = locker();
    let holder_a = locker.mutex("job").build();
    let holder_b = locker
        .mutex("job")
        .retry_count(3)
        .retry_delay(Duration::from_secs(1))
        .build();

    assert!(holder_a.lock().await.unwrap());

    let started = Instant::now();
    assert!(!holder_b.lock().await.unwrap());
    // Two random pauses below one second each between three attempts
    assert!(started.elapsed() < Duration::from_secs(2));

    holder_a.unlock().await.unwrap();
    assert!(holder_b.lock().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_unlock_after_expiry_does_not_release_new_holder() {
    let (locker, store) = locker();
    let stale = locker.mutex("job").ttl(Duration::from_secs(1)).build();
    let fresh = locker.mutex("job").ttl(Duration::from_secs(10)).build();

    assert!(stale.lock().await.unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(fresh.lock().await.unwrap());

    assert!(matches!(stale.unlock().await, Err(LockError::UnlockFailed)));
    assert_eq!(
        store.get("job").await.unwrap().as_deref(),
        Some(fresh.value())
    );
    fresh.unlock().await.unwrap();
}

#[tokio::test]
async fn test_ownership_handoff_via_preset_value() {
    let (locker, _) = locker();
    let original = locker.mutex("job").build();
    assert!(original.lock().await.unwrap());

    let successor = locker.mutex("job").value(original.value()).build();
    successor.unlock().await.unwrap();

    assert!(matches!(
        original.unlock().await,
        Err(LockError::UnlockFailed)
    ));
}

#[tokio::test]
async fn test_store_failure_aborts_without_retry() {
    let store = Arc::new(FailingStore::default());
    let locker = Locker::new(store.clone());
    let mutex = locker.mutex("job").retry_count(10).build();

    assert!(matches!(mutex.lock().await, Err(LockError::Store(_))));
    assert_eq!(store.calls(), 1);

    assert!(matches!(mutex.unlock().await, Err(LockError::Store(_))));
}

#[tokio::test]
async fn test_zero_retry_count_never_touches_store() {
    let store = Arc::new(FailingStore::default());
    let locker = Locker::new(store.clone());
    let mutex = locker.mutex("job").retry_count(0).build();

    assert!(!mutex.lock().await.unwrap());
    assert_eq!(store.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_backoff() {
    let (locker, _) = locker();
    let holder = locker.mutex("db_migrate").build();
    assert!(holder.lock().await.unwrap());

    let waiter = locker
        .mutex("db_migrate")
        .retry_count(1000)
        .retry_delay(Duration::from_secs(5))
        .build();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = waiter.lock_with_cancel(&cancel).await;
    assert!(matches!(result, Err(LockError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_backoff() {
    let (locker, _) = locker();
    let holder = locker.mutex("job").build();
    assert!(holder.lock().await.unwrap());

    let waiter = locker
        .mutex("job")
        .retry_count(1000)
        .retry_delay(Duration::from_secs(5))
        .build();

    let deadline = Instant::now() + Duration::from_millis(750);
    let result = waiter.lock_until(deadline).await;
    assert!(matches!(result, Err(LockError::DeadlineElapsed)));
    assert!(Instant::now() <= deadline + Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn test_lock_with_cancel_acquires_when_free() {
    let (locker, _) = locker();
    let mutex = locker.mutex("job").build();
    let cancel = CancellationToken::new();

    assert!(mutex.lock_with_cancel(&cancel).await.unwrap());

    cancel.cancel();
    let other = locker.mutex("job").build();
    assert!(matches!(
        other.lock_with_cancel(&cancel).await,
        Err(LockError::Cancelled)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_mutual_exclusion_under_contention() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let holders = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        // Every task is its own "process" with its own locker
        let locker = Locker::new(store.clone());
        let holders = holders.clone();
        let max_seen = max_seen.clone();
        let completed = completed.clone();

        tasks.push(tokio::spawn(async move {
            let mutex = locker
                .mutex("shared")
                .ttl(Duration::from_secs(10))
                .retry_count(10_000)
                .retry_delay(Duration::from_millis(20))
                .build();

            assert!(mutex.lock().await.unwrap());
            let now_holding = holders.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now_holding, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(50)).await;

            holders.fetch_sub(1, Ordering::SeqCst);
            mutex.unlock().await.unwrap();
            completed.fetch_add(1, Ordering::SeqCst);
        }));
    }

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .for_each(|r| r.unwrap());

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 8);
}
