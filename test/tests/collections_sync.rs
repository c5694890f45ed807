/// End-to-end tests for lists, sets, signals and models

use std::sync::Arc;

use parking_lot::Mutex;

use rd_shared::{RdBindable, RdDynamic, SetEvent};
use rd_test::{init_logging, TestEndpoints, TestModel};

fn bound_pair(endpoints: &TestEndpoints) -> (TestModel, TestModel) {
    let (client, server) = TestModel::pair();
    endpoints.bind(&client.model, &server.model, "model");
    endpoints.exchange();
    (client, server)
}

#[test]
fn members_get_matching_ids_and_locations() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    assert_eq!(client.title.rd_id(), server.title.rd_id());
    assert_ne!(client.title.rd_id(), client.scores.rd_id());
    assert_eq!(client.title.location(), "client.model.title");
    assert_eq!(server.inventory.location(), "server.model.inventory");
    assert_eq!(
        client.model.member_names(),
        vec!["title", "scores", "tags", "inventory", "chat", "lookup"]
    );
}

#[test]
fn list_edits_flow_both_ways() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.client.run(|| {
        client.scores.add(1);
        client.scores.add(3);
        client.scores.insert(1, 2);
    });
    endpoints.exchange();
    assert_eq!(server.scores.to_vec(), vec![1, 2, 3]);

    endpoints.server.run(|| {
        server.scores.set(0, 10);
        server.scores.remove_at(2);
    });
    endpoints.exchange();
    assert_eq!(client.scores.to_vec(), vec![10, 2]);

    endpoints.client.run(|| client.scores.clear());
    endpoints.exchange();
    assert!(server.scores.is_empty());
}

#[test]
fn list_contents_before_bind_are_pushed() {
    let endpoints = TestEndpoints::new();
    let (client, server) = TestModel::pair();
    client.scores.add(4);
    client.scores.add(5);

    endpoints.bind(&client.model, &server.model, "model");
    endpoints.exchange();

    assert_eq!(server.scores.to_vec(), vec![4, 5]);
}

#[test]
fn set_edits_flow_and_fire_events() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = events.clone();
    server.tags.advise(endpoints.server.lifetime(), move |event| {
        let entry = match event {
            SetEvent::Add(value) => format!("+{}", value),
            SetEvent::Remove(value) => format!("-{}", value),
        };
        recorder.lock().push(entry);
    });

    endpoints.client.run(|| {
        assert!(client.tags.add("red".to_string()));
        assert!(!client.tags.add("red".to_string()));
        client.tags.add("blue".to_string());
        client.tags.remove(&"red".to_string());
    });
    endpoints.exchange();

    assert_eq!(server.tags.to_vec(), vec!["blue".to_string()]);
    assert_eq!(*events.lock(), vec!["+red", "+blue", "-red"]);
}

#[test]
fn signal_fires_locally_and_remotely() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    let local = Arc::new(Mutex::new(Vec::new()));
    let remote = Arc::new(Mutex::new(Vec::new()));
    let local_recorder = local.clone();
    let remote_recorder = remote.clone();
    client
        .chat
        .advise(endpoints.client.lifetime(), move |message| local_recorder.lock().push(message.clone()));
    server
        .chat
        .advise(endpoints.server.lifetime(), move |message| remote_recorder.lock().push(message.clone()));

    endpoints.client.run(|| {
        client.chat.fire("hello".to_string());
        client.chat.fire("again".to_string());
    });
    endpoints.exchange();

    assert_eq!(*local.lock(), vec!["hello", "again"]);
    assert_eq!(*remote.lock(), vec!["hello", "again"]);
}

#[test]
fn property_in_model_syncs() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.server.run(|| server.title.set("renamed".to_string()));
    endpoints.exchange();

    assert_eq!(client.title.value().as_deref(), Some("renamed"));
}
