//! Integration tests for entry listeners and event delivery to endpoints.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hazelmap_core::{Data, EntryEventType};
use hazelmap_server::{FnEntryListener, Predicates, Ttl};

use crate::common::{caller, drain, next_event, service, unique_name};

#[tokio::test]
async fn test_key_filtered_listener_receives_only_its_key() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("key-filter"), caller(client, 1));

    let id = map.add_entry_listener(Some(Data::from("watched")), None, true);

    map.put(Data::from("other"), Data::from("x")).await.unwrap();
    map.put(Data::from("watched"), Data::from("v1")).await.unwrap();
    map.put(Data::from("watched"), Data::from("v2")).await.unwrap();
    map.remove(Data::from("watched")).await.unwrap();

    let added = next_event(&mut rx).await;
    assert_eq!(added.event_type, EntryEventType::Added);
    assert_eq!(added.registration_id, id.as_uuid());
    assert_eq!(added.key, Some(Data::from("watched")));
    assert_eq!(added.new_value, Some(Data::from("v1")));
    assert_eq!(added.old_value, None);
    assert_eq!(added.affected_count, 1);

    let updated = next_event(&mut rx).await;
    assert_eq!(updated.event_type, EntryEventType::Updated);
    assert_eq!(updated.old_value, Some(Data::from("v1")));
    assert_eq!(updated.new_value, Some(Data::from("v2")));

    let removed = next_event(&mut rx).await;
    assert_eq!(removed.event_type, EntryEventType::Removed);
    assert_eq!(removed.old_value, Some(Data::from("v2")));

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_events_carry_member_id() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("member"), caller(client, 1));
    map.add_entry_listener(None, None, true);

    map.put(Data::from("k"), Data::from("v")).await.unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event.member_id, service.config().member_id());
}

#[tokio::test]
async fn test_include_value_false_strips_values() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("no-values"), caller(client, 1));

    map.add_entry_listener(None, None, false);
    map.put(Data::from("k"), Data::from("v")).await.unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event.event_type, EntryEventType::Added);
    assert_eq!(event.key, Some(Data::from("k")));
    assert_eq!(event.new_value, None);
    assert_eq!(event.old_value, None);
}

#[tokio::test]
async fn test_predicate_listener_filters_on_value() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("predicate"), caller(client, 1));

    map.add_entry_listener(None, Some(Arc::new(Predicates::value_equals("hot"))), true);
    map.put(Data::from("a"), Data::from("cold")).await.unwrap();
    map.put(Data::from("b"), Data::from("hot")).await.unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event.key, Some(Data::from("b")));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_no_delivery_after_removal() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("removed"), caller(client, 1));

    let id = map.add_entry_listener(None, None, true);
    map.put(Data::from("k"), Data::from("v1")).await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EntryEventType::Added);

    assert!(map.remove_entry_listener(id));
    assert!(!map.remove_entry_listener(id));
    map.put(Data::from("k"), Data::from("v2")).await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_dead_endpoint_is_skipped() {
    let (endpoints, service) = service();
    let (gone, _rx) = endpoints.connect();
    let (alive, mut alive_rx) = endpoints.connect();
    let name = unique_name("dead");

    service.proxy(&name, caller(gone, 1)).add_entry_listener(None, None, true);
    service.proxy(&name, caller(alive, 1)).add_entry_listener(None, None, true);
    endpoints.disconnect(gone);

    let map = service.proxy(&name, caller(alive, 1));
    map.put(Data::from("k"), Data::from("v")).await.unwrap();

    assert_eq!(next_event(&mut alive_rx).await.key, Some(Data::from("k")));
    assert_eq!(map.listener_stats().skipped_dead(), 1);
    assert_eq!(map.listener_stats().errors(), 0);
}

#[tokio::test]
async fn test_disconnect_removes_registrations() {
    let (endpoints, service) = service();
    let (client, _rx) = endpoints.connect();
    let name = unique_name("cleanup");
    let map = service.proxy(&name, caller(client, 1));

    map.add_entry_listener(None, None, true);
    map.add_entry_listener(Some(Data::from("k")), None, false);
    assert_eq!(map.container().registry().len(), 2);

    endpoints.disconnect(client);
    let cleanup = service.on_endpoint_disconnected(client);
    assert_eq!(cleanup.listeners_removed, 2);
    assert!(map.container().registry().is_empty());
}

#[tokio::test]
async fn test_map_wide_event_does_not_fail_clear() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("clear"), caller(client, 1));

    map.put(Data::from("k"), Data::from("v")).await.unwrap();
    map.add_entry_listener(None, None, true);

    assert_eq!(map.clear(), 1);
    assert!(map.is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(map.listener_stats().errors(), 1);
}

#[tokio::test]
async fn test_local_listener_sees_map_wide_events() {
    let (endpoints, service) = service();
    let (client, _rx) = endpoints.connect();
    let map = service.proxy(&unique_name("local"), caller(client, 1));

    let cleared = Arc::new(AtomicU32::new(0));
    let counter = cleared.clone();
    let listener = FnEntryListener::builder()
        .on_map_cleared(move |event| {
            counter.fetch_add(event.affected_count as u32, Ordering::SeqCst);
        })
        .build();
    map.add_local_entry_listener(Arc::new(listener));

    map.put(Data::from("a"), Data::from("1")).await.unwrap();
    map.put(Data::from("b"), Data::from("2")).await.unwrap();
    map.clear();

    assert_eq!(cleared.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_is_published_exactly_once() {
    let (endpoints, service) = service();
    let (client, mut rx) = endpoints.connect();
    let map = service.proxy(&unique_name("expiry"), caller(client, 1));

    map.put_with_ttl(
        Data::from("k"),
        Data::from("v"),
        Ttl::After(Duration::from_millis(500)),
    )
    .await
    .unwrap();
    map.add_entry_listener(None, None, true);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(map.get(&Data::from("k")), None);
    assert_eq!(map.get(&Data::from("k")), None);
    assert!(!map.contains_key(&Data::from("k")));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EntryEventType::Expired);
    assert_eq!(events[0].key, Some(Data::from("k")));
    assert_eq!(events[0].old_value, Some(Data::from("v")));
}
