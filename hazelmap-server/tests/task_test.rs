//! Integration tests for request handling through message tasks.

mod common;

use std::sync::Arc;

use hazelmap_core::protocol::{EntryEventParameters, MapRequest, MapResponse};
use hazelmap_core::{ClientMessage, Data, EntryEventType, HazelmapError, Result};
use hazelmap_server::{
    AllowAll, BoxedPredicate, EndpointId, MapMessageTask, MessageTask, NoPredicateDecoder,
    Predicates, Role, RoleAuthorizer,
};

use crate::common::{service, unique_name};

const PARTITION: i32 = 0;

fn open_task() -> (Arc<hazelmap_server::LocalEndpoints>, MapMessageTask) {
    let (endpoints, service) = service();
    let task = MapMessageTask::new(service, Arc::new(AllowAll), Arc::new(NoPredicateDecoder));
    (endpoints, task)
}

async fn call(task: &MapMessageTask, endpoint: EndpointId, request: MapRequest) -> ClientMessage {
    let message = request.encode(hazelmap_core::protocol::next_correlation_id(), PARTITION);
    let response = task.handle(endpoint, &message).await;
    assert_eq!(response.correlation_id(), message.correlation_id());
    response
}

#[tokio::test]
async fn test_put_get_remove_over_the_wire() {
    let (endpoints, task) = open_task();
    let (client, _rx) = endpoints.connect();
    let name = unique_name("wire");

    let put = MapRequest::Put {
        name: name.clone(),
        key: Data::from("k"),
        value: Data::from("v1"),
        thread_id: 1,
        ttl_ms: -1,
    };
    assert_eq!(MapResponse::decode_nullable(&call(&task, client, put).await).unwrap(), None);

    let get = MapRequest::Get {
        name: name.clone(),
        key: Data::from("k"),
        thread_id: 1,
    };
    assert_eq!(
        MapResponse::decode_nullable(&call(&task, client, get).await).unwrap(),
        Some(Data::from("v1"))
    );

    let size = MapRequest::Size { name: name.clone() };
    assert_eq!(MapResponse::decode_int(&call(&task, client, size).await).unwrap(), 1);

    let remove = MapRequest::Remove {
        name: name.clone(),
        key: Data::from("k"),
        thread_id: 1,
    };
    assert_eq!(
        MapResponse::decode_nullable(&call(&task, client, remove).await).unwrap(),
        Some(Data::from("v1"))
    );
}

#[tokio::test]
async fn test_lock_requests_follow_lock_semantics() {
    let (endpoints, task) = open_task();
    let (a, _) = endpoints.connect();
    let (b, _) = endpoints.connect();
    let name = unique_name("wire-lock");
    let key = Data::from("x");

    let lock = MapRequest::Lock {
        name: name.clone(),
        key: key.clone(),
        thread_id: 1,
    };
    call(&task, a, lock).await;

    let try_lock = MapRequest::TryLock {
        name: name.clone(),
        key: key.clone(),
        thread_id: 1,
        timeout_ms: -10,
    };
    assert!(!MapResponse::decode_bool(&call(&task, b, try_lock).await).unwrap());

    let unlock = MapRequest::Unlock {
        name: name.clone(),
        key: key.clone(),
        thread_id: 1,
    };
    let err = MapResponse::decode_bool(&call(&task, b, unlock.clone()).await).unwrap_err();
    assert!(err.is_illegal_state());

    call(&task, a, unlock).await;
    let is_locked = MapRequest::IsLocked { name, key };
    assert!(!MapResponse::decode_bool(&call(&task, b, is_locked).await).unwrap());
}

#[tokio::test]
async fn test_listener_registration_over_the_wire() {
    let (endpoints, task) = open_task();
    let (client, mut rx) = endpoints.connect();
    let name = unique_name("wire-listener");

    let add = MapRequest::AddEntryListener {
        name: name.clone(),
        key: Some(Data::from("k")),
        predicate: None,
        include_value: true,
    };
    let registration_id = MapResponse::decode_uuid(&call(&task, client, add).await).unwrap();

    let set = MapRequest::Set {
        name: name.clone(),
        key: Data::from("k"),
        value: Data::from("v"),
        thread_id: 1,
        ttl_ms: 0,
    };
    call(&task, client, set).await;

    let event = rx.try_recv().expect("event was not pushed");
    let event = EntryEventParameters::decode(&event).unwrap();
    assert_eq!(event.registration_id, registration_id);
    assert_eq!(event.event_type, EntryEventType::Added);

    let remove = MapRequest::RemoveEntryListener {
        name,
        registration_id,
    };
    assert!(MapResponse::decode_bool(&call(&task, client, remove).await).unwrap());
}

#[tokio::test]
async fn test_permission_denied() {
    let (endpoints, service) = service();
    let (client, _rx) = endpoints.connect();
    let authorizer = RoleAuthorizer::new().with_role(Role::read_only("reader"));
    let task = MapMessageTask::new(service.clone(), Arc::new(authorizer), Arc::new(NoPredicateDecoder));
    let name = unique_name("secured");

    let put = MapRequest::Put {
        name: name.clone(),
        key: Data::from("k"),
        value: Data::from("v"),
        thread_id: 1,
        ttl_ms: -1,
    };
    let err = MapResponse::decode_nullable(&call(&task, client, put).await).unwrap_err();
    assert!(matches!(err, HazelmapError::PermissionDenied { .. }));
    assert!(service.existing(&name).map_or(true, |c| c.store().is_empty()));

    let get = MapRequest::Get {
        name,
        key: Data::from("k"),
        thread_id: 1,
    };
    assert_eq!(MapResponse::decode_nullable(&call(&task, client, get).await).unwrap(), None);
}

#[tokio::test]
async fn test_malformed_request_returns_error_response() {
    let (endpoints, task) = open_task();
    let (client, _rx) = endpoints.connect();

    let message = ClientMessage::new_request(0x7f_ff00, 42, PARTITION);
    let response = task.handle(client, &message).await;

    assert_eq!(response.correlation_id(), Some(42));
    let err = MapResponse::decode_bool(&response).unwrap_err();
    assert!(matches!(err, HazelmapError::Protocol(_)));
}

#[tokio::test]
async fn test_query_with_decoded_predicate() {
    let (endpoints, service) = service();
    let (client, _rx) = endpoints.connect();
    let decoder = |data: &Data| -> Result<BoxedPredicate> {
        Ok(Arc::new(Predicates::value_equals(data.clone())))
    };
    let task = MapMessageTask::new(service, Arc::new(AllowAll), Arc::new(decoder));
    let name = unique_name("wire-query");

    for (key, value) in [("a", "red"), ("b", "blue"), ("c", "red")] {
        let put = MapRequest::Put {
            name: name.clone(),
            key: Data::from(key),
            value: Data::from(value),
            thread_id: 1,
            ttl_ms: -1,
        };
        call(&task, client, put).await;
    }

    let key_set = MapRequest::KeySet {
        name: name.clone(),
        predicate: Some(Data::from("red")),
    };
    let mut keys = MapResponse::decode_data_list(&call(&task, client, key_set).await).unwrap();
    keys.sort();
    assert_eq!(keys, vec![Data::from("a"), Data::from("c")]);

    let entries = MapRequest::EntrySet {
        name,
        predicate: Some(Data::from("blue")),
    };
    assert_eq!(
        MapResponse::decode_entry_list(&call(&task, client, entries).await).unwrap(),
        vec![(Data::from("b"), Data::from("blue"))]
    );
}

#[tokio::test]
async fn test_predicate_without_decoder_is_unsupported() {
    let (endpoints, task) = open_task();
    let (client, _rx) = endpoints.connect();

    let values = MapRequest::Values {
        name: unique_name("no-decoder"),
        predicate: Some(Data::from("anything")),
    };
    let err = MapResponse::decode_data_list(&call(&task, client, values).await).unwrap_err();
    assert!(matches!(err, HazelmapError::Unsupported(_)));
}
