//! Integration tests for per-key locking through the map proxy.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hazelmap_core::Data;
use tokio::time::Instant;

use crate::common::{caller, service, unique_name};

#[tokio::test(start_paused = true)]
async fn test_try_lock_timeout_then_handover() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let (c, _) = endpoints.connect();
    let name = unique_name("abc");
    let key = Data::from("x");

    let map_a = service.proxy(&name, caller(a, 1));
    let map_b = service.proxy(&name, caller(b, 1));
    let map_c = service.proxy(&name, caller(c, 1));

    map_a.lock(&key).await.unwrap();

    let started = Instant::now();
    let acquired = map_b
        .try_lock_timeout(&key, Duration::from_millis(100))
        .await
        .unwrap();
    assert!(!acquired);
    assert!(started.elapsed() >= Duration::from_millis(100));

    map_a.unlock(&key).unwrap();
    assert!(map_c.try_lock(&key));
    assert!(map_c.is_locked(&key));
}

#[tokio::test]
async fn test_try_lock_zero_does_not_block() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let name = unique_name("zero");
    let key = Data::from("k");

    service.proxy(&name, caller(a, 1)).lock(&key).await.unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        service
            .proxy(&name, caller(b, 1))
            .try_lock_timeout(&key, Duration::ZERO),
    )
    .await
    .expect("zero timeout must not wait");
    assert!(!outcome.unwrap());
}

#[tokio::test]
async fn test_reentrant_lock_needs_matching_unlocks() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let name = unique_name("reentrant");
    let key = Data::from("k");
    let owner = service.proxy(&name, caller(a, 1));
    let other = service.proxy(&name, caller(b, 1));

    owner.lock(&key).await.unwrap();
    owner.lock(&key).await.unwrap();
    assert!(owner.try_lock(&key));

    owner.unlock(&key).unwrap();
    owner.unlock(&key).unwrap();
    assert!(other.is_locked(&key));
    assert!(!other.try_lock(&key));

    owner.unlock(&key).unwrap();
    assert!(!other.is_locked(&key));
    assert!(other.try_lock(&key));
}

#[tokio::test]
async fn test_unlock_by_non_owner_is_illegal_state() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let name = unique_name("illegal");
    let key = Data::from("k");

    let err = service.proxy(&name, caller(a, 1)).unlock(&key).unwrap_err();
    assert!(err.is_illegal_state());

    service.proxy(&name, caller(a, 1)).lock(&key).await.unwrap();
    let err = service.proxy(&name, caller(b, 1)).unlock(&key).unwrap_err();
    assert!(err.is_illegal_state());

    let err = service.proxy(&name, caller(a, 2)).unlock(&key).unwrap_err();
    assert!(err.is_illegal_state());
    assert!(service.proxy(&name, caller(b, 1)).is_locked(&key));
}

#[tokio::test]
async fn test_lock_is_mutually_exclusive() {
    let (endpoints, service) = service();
    let (client, _) = endpoints.connect();
    let name = unique_name("exclusive");
    let key = Data::from("k");
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let map = service.proxy(&name, caller(client, thread_id));
        let key = key.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                map.lock(&key).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
                map.unlock(&key).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!service.proxy(&name, caller(client, 0)).is_locked(&key));
}

#[tokio::test(start_paused = true)]
async fn test_mutation_waits_for_lock_holder() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let name = unique_name("blocked");
    let key = Data::from("k");
    let holder = service.proxy(&name, caller(a, 1));
    let writer = service.proxy(&name, caller(b, 1));

    holder.lock(&key).await.unwrap();
    holder.put(key.clone(), Data::from("owner")).await.unwrap();

    assert!(!writer
        .try_put(key.clone(), Data::from("late"), Duration::from_millis(50))
        .await
        .unwrap());
    let err = writer
        .try_remove(key.clone(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let pending = writer.put_async(key.clone(), Data::from("after"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!pending.is_done());
    assert_eq!(holder.get(&key), Some(Data::from("owner")));

    holder.unlock(&key).unwrap();
    assert_eq!(pending.await.unwrap(), Some(Data::from("owner")));
    assert_eq!(holder.get(&key), Some(Data::from("after")));
}

#[tokio::test(start_paused = true)]
async fn test_clear_skips_locked_keys() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let name = unique_name("clear");
    let map = service.proxy(&name, caller(a, 1));

    map.put(Data::from("locked"), Data::from("1")).await.unwrap();
    map.put(Data::from("free"), Data::from("2")).await.unwrap();
    map.lock(&Data::from("locked")).await.unwrap();

    assert_eq!(map.clear(), 1);
    assert_eq!(map.get(&Data::from("locked")), Some(Data::from("1")));
    assert!(!map.evict(&Data::from("locked")));
}

#[tokio::test]
async fn test_disconnect_releases_locks() {
    let (endpoints, service) = service();
    let (gone, _) = endpoints.connect();
    let (waiter, _) = endpoints.connect();
    let name = unique_name("disconnect");
    let key = Data::from("k");

    service.proxy(&name, caller(gone, 1)).lock(&key).await.unwrap();
    service.proxy(&name, caller(gone, 2)).lock(&Data::from("j")).await.unwrap();

    let waiting = {
        let map = service.proxy(&name, caller(waiter, 1));
        let key = key.clone();
        tokio::spawn(async move { map.lock(&key).await })
    };
    tokio::task::yield_now().await;

    endpoints.disconnect(gone);
    let cleanup = service.on_endpoint_disconnected(gone);
    assert_eq!(cleanup.locks_released, 2);

    tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .expect("waiter was not granted the lock")
        .unwrap()
        .unwrap();
    let map = service.proxy(&name, caller(waiter, 1));
    assert!(map.is_locked(&key));
    map.unlock(&key).unwrap();
    assert!(!map.is_locked(&Data::from("j")));
}

#[tokio::test]
async fn test_force_unlock_ignores_owner() {
    let (endpoints, service) = service();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let name = unique_name("force");
    let key = Data::from("k");

    let owner = service.proxy(&name, caller(a, 1));
    owner.lock(&key).await.unwrap();
    owner.lock(&key).await.unwrap();

    assert!(service.proxy(&name, caller(b, 1)).force_unlock(&key));
    assert!(!owner.is_locked(&key));
    assert!(!service.proxy(&name, caller(b, 1)).force_unlock(&key));
}
