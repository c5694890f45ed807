/// End-to-end tests for property synchronization

use std::sync::Arc;

use parking_lot::Mutex;

use rd_shared::{BindError, RdBindable, RdProperty};
use rd_test::{init_logging, TestEndpoints};

#[test]
fn local_set_reaches_peer() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let client = RdProperty::new(0i32);
    let server = RdProperty::new(0i32);
    endpoints.bind(&client, &server, "counter");
    endpoints.exchange();

    endpoints.client.run(|| client.set(5));
    endpoints.exchange();

    assert_eq!(server.value(), Some(5));
    assert_eq!(client.value(), Some(5));
}

#[test]
fn defaults_stay_local() {
    let endpoints = TestEndpoints::new();
    let client = RdProperty::new(String::from("client default"));
    let server = RdProperty::new(String::from("server default"));
    endpoints.bind(&client, &server, "name");

    assert_eq!(endpoints.transports.client_to_server.queued(), 0);
    assert_eq!(endpoints.transports.server_to_client.queued(), 0);
    endpoints.exchange();

    assert_eq!(client.value().as_deref(), Some("client default"));
    assert_eq!(server.value().as_deref(), Some("server default"));
}

#[test]
fn value_set_before_bind_waits_for_late_peer() {
    let endpoints = TestEndpoints::new();
    let client = RdProperty::<i32>::empty();
    let server = RdProperty::<i32>::empty();

    client.set(7);
    endpoints.client.bind(&client, "late");
    endpoints.exchange();

    let id = client.rd_id();
    assert_eq!(endpoints.server.wire.broker().held_message_count(id), 1);
    assert!(!server.has_value());

    endpoints.server.bind(&server, "late");
    endpoints.exchange();

    assert_eq!(server.rd_id(), id);
    assert_eq!(server.value(), Some(7));
    assert_eq!(endpoints.server.wire.broker().held_message_count(id), 0);
}

#[test]
fn remote_change_is_not_echoed() {
    let endpoints = TestEndpoints::new();
    let client = RdProperty::new(0i32);
    let server = RdProperty::new(0i32);
    endpoints.bind(&client, &server, "echo");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    server.advise(endpoints.server.lifetime(), move |value| recorder.lock().push(*value));

    endpoints.client.run(|| client.set(3));
    assert_eq!(endpoints.transports.client_to_server.queued(), 1);
    endpoints.transports.deliver();
    endpoints.server.pump();

    assert_eq!(*seen.lock(), vec![0, 3]);
    assert_eq!(endpoints.transports.server_to_client.queued(), 0);
}

#[test]
fn set_from_wrong_thread_is_rejected() {
    let endpoints = TestEndpoints::new();
    let client = RdProperty::new(0i32);
    let server = RdProperty::new(0i32);
    endpoints.bind(&client, &server, "guarded");

    let result = client.try_set(1);
    assert!(matches!(result, Err(BindError::WrongThread(_))));
    assert_eq!(client.value(), Some(0));
}

#[test]
fn unbound_property_stops_syncing() {
    let endpoints = TestEndpoints::new();
    let client = RdProperty::new(0i32);
    let server = RdProperty::new(0i32);
    endpoints.bind(&client, &server, "detached");
    endpoints.exchange();

    endpoints.client.disconnect();
    assert!(!client.is_bound());
    assert!(client.rd_id().is_null());

    client.set(9);
    endpoints.exchange();
    assert_eq!(server.value(), Some(0));
}

#[test]
fn binding_twice_fails() {
    let endpoints = TestEndpoints::new();
    let client = RdProperty::new(0i32);
    endpoints.client.bind(&client, "once");

    let result = endpoints
        .client
        .run(|| endpoints.client.protocol.try_bind_static(&client, "once"));
    assert!(matches!(result, Err(BindError::AlreadyIdentified { .. })));

    let result = endpoints.client.run(|| {
        client.try_bind(endpoints.client.lifetime(), &*endpoints.client.protocol, "once")
    });
    assert!(matches!(result, Err(BindError::AlreadyBound { .. })));
}
