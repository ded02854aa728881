//! Integration tests for TTL-fenced worker locks.

mod common;

use std::time::Duration;

use chrono::TimeDelta;
use webstatus_storage::StorageError;

use common::client_with_clock;

const TTL: Duration = Duration::from_secs(30);

#[tokio::test]
async fn lease_lifecycle_across_workers() {
    let (client, clock) = client_with_clock();

    let lease = client.try_acquire_lock("sync-features", "worker-1", TTL).await.unwrap();
    assert_eq!(lease.resource, "sync-features");

    match client.try_acquire_lock("sync-features", "worker-2", TTL).await {
        Err(StorageError::AlreadyLocked { owner, .. }) => assert_eq!(owner, "worker-1"),
        other => panic!("expected AlreadyLocked, got {other:?}"),
    }

    clock.advance(TimeDelta::seconds(31));
    let taken = client.try_acquire_lock("sync-features", "worker-2", TTL).await.unwrap();
    assert_eq!(taken.owner, "worker-2");

    // The stale owner can neither release nor silently re-take the lock.
    assert!(matches!(
        client.release_lock("sync-features", "worker-1").await,
        Err(StorageError::LockNotOwned { .. })
    ));
    assert!(client
        .try_acquire_lock("sync-features", "worker-1", TTL)
        .await
        .is_err());

    client.release_lock("sync-features", "worker-2").await.unwrap();
    client.try_acquire_lock("sync-features", "worker-1", TTL).await.unwrap();
}

#[tokio::test]
async fn racing_workers_get_exactly_one_lease() {
    let (client, _clock) = client_with_clock();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .try_acquire_lock("job", &format!("worker-{i}"), TTL)
                    .await
            })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(StorageError::AlreadyLocked { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(granted, 1);
}

#[tokio::test]
async fn out_of_range_ttl_is_invalid_argument() {
    let (client, _clock) = client_with_clock();
    let err = client
        .try_acquire_lock("job", "w", Duration::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));

    let err = client
        .try_acquire_lock("job", "w", Duration::from_secs(10u64.pow(15)))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArgument(_)));
    assert!(client.release_lock("job", "w").await.is_ok());
}
