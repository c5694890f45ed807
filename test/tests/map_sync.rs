/// End-to-end tests for master/slave map synchronization

use rd_shared::{MapEvent, RdMap};
use rd_test::{init_logging, TestEndpoints, TestModel};

const ACK_HEADER: i32 = (1 << 8) | 3;

fn is_ack(frame: &[u8]) -> bool {
    frame.len() >= 12 && frame[8..12] == ACK_HEADER.to_le_bytes()
}

fn bound_pair(endpoints: &TestEndpoints) -> (TestModel, TestModel) {
    let (client, server) = TestModel::pair();
    endpoints.bind(&client.model, &server.model, "model");
    endpoints.exchange();
    (client, server)
}

#[test]
fn master_write_is_acknowledged() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    assert!(server.inventory.is_master());

    endpoints.server.run(|| server.inventory.set("sword".to_string(), 1));
    assert_eq!(server.inventory.pending_acks(), 1);

    endpoints.exchange();
    assert_eq!(client.inventory.get(&"sword".to_string()), Some(1));
    assert_eq!(server.inventory.pending_acks(), 0);
}

#[test]
fn slave_write_is_applied_without_ack() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.client.run(|| {
        client.inventory.set("shield".to_string(), 2);
        client.inventory.set("shield".to_string(), 3);
    });
    endpoints.exchange();

    assert_eq!(server.inventory.get(&"shield".to_string()), Some(3));
    assert_eq!(client.inventory.pending_acks(), 0);
    assert_eq!(server.inventory.pending_acks(), 0);
}

#[test]
fn concurrent_writes_converge_on_master_value() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.server.run(|| server.inventory.set("gold".to_string(), 100));
    endpoints.client.run(|| client.inventory.set("gold".to_string(), 5));
    endpoints.exchange();

    assert_eq!(server.inventory.get(&"gold".to_string()), Some(100));
    assert_eq!(client.inventory.get(&"gold".to_string()), Some(100));
    assert_eq!(server.inventory.pending_acks(), 0);
}

#[test]
fn removal_propagates() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.server.run(|| {
        server.inventory.set("potion".to_string(), 1);
        server.inventory.set("elixir".to_string(), 2);
    });
    endpoints.exchange();
    endpoints.client.run(|| {
        client.inventory.remove(&"potion".to_string());
    });
    endpoints.exchange();

    assert_eq!(server.inventory.keys(), vec!["elixir".to_string()]);
    assert_eq!(client.inventory.entries(), vec![("elixir".to_string(), 2)]);
}

#[test]
fn standalone_maps_sync_at_top_level() {
    let endpoints = TestEndpoints::new();
    let client = RdMap::<i32, String>::new();
    let server = RdMap::<i32, String>::master();
    server.set(1, "one".to_string());

    endpoints.bind(&client, &server, "lookup");
    endpoints.exchange();

    assert_eq!(client.get(&1).as_deref(), Some("one"));
    assert_eq!(server.pending_acks(), 0);
}

#[test]
fn write_made_while_applying_remote_change_is_sent() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    let derived = client.inventory.clone();
    client.inventory.advise(endpoints.client.lifetime(), move |event| {
        if let MapEvent::Add { key, .. } = event {
            if key == "a" {
                derived.set("derived".to_string(), 10);
            }
        }
    });

    endpoints.server.run(|| server.inventory.set("a".to_string(), 1));
    endpoints.exchange();

    assert_eq!(client.inventory.get(&"derived".to_string()), Some(10));
    assert_eq!(server.inventory.get(&"derived".to_string()), Some(10));
    assert_eq!(server.inventory.get(&"a".to_string()), Some(1));
    assert_eq!(server.inventory.pending_acks(), 0);
}

#[test]
fn remote_change_is_not_echoed_back() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.client.run(|| client.inventory.set("arrow".to_string(), 20));
    endpoints.transports.client_to_server.deliver();
    endpoints.server.pump();

    assert_eq!(server.inventory.get(&"arrow".to_string()), Some(20));
    assert_eq!(endpoints.transports.server_to_client.queued(), 0);
}

#[test]
fn each_versioned_write_gets_exactly_one_ack() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.server.run(|| {
        server.inventory.set("bow".to_string(), 1);
        server.inventory.set("axe".to_string(), 2);
        server.inventory.remove(&"bow".to_string());
    });
    assert_eq!(endpoints.transports.server_to_client.deliver(), 3);
    endpoints.client.pump();

    let frames = endpoints.transports.client_to_server.take_queued();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|frame| is_ack(frame)));

    for frame in &frames {
        endpoints.server.wire.receive_frame(frame).unwrap();
    }
    endpoints.server.pump();
    assert_eq!(server.inventory.pending_acks(), 0);
    assert_eq!(client.inventory.entries(), vec![("axe".to_string(), 2)]);
}

#[test]
fn late_and_unmatched_acks_are_tolerated() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);

    endpoints.server.run(|| {
        server.inventory.set("ring".to_string(), 1);
        server.inventory.set("ring".to_string(), 2);
    });
    assert_eq!(server.inventory.pending_acks(), 1);
    endpoints.transports.server_to_client.deliver();
    endpoints.client.pump();

    let acks = endpoints.transports.client_to_server.take_queued();
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|frame| is_ack(frame)));

    // The Ack for the first write arrives while the second is still pending.
    endpoints.server.wire.receive_frame(&acks[0]).unwrap();
    endpoints.server.pump();
    assert_eq!(server.inventory.pending_acks(), 1);

    endpoints.server.wire.receive_frame(&acks[1]).unwrap();
    endpoints.server.pump();
    assert_eq!(server.inventory.pending_acks(), 0);

    // A duplicate Ack finds nothing pending.
    endpoints.server.wire.receive_frame(&acks[1]).unwrap();
    endpoints.server.pump();
    assert_eq!(server.inventory.pending_acks(), 0);

    assert_eq!(server.inventory.get(&"ring".to_string()), Some(2));
    assert_eq!(client.inventory.get(&"ring".to_string()), Some(2));
}

#[test]
fn ack_ahead_of_pending_write_keeps_it_pending() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (_client, server) = bound_pair(&endpoints);

    endpoints.server.run(|| server.inventory.set("gem".to_string(), 1));
    endpoints.transports.server_to_client.deliver();
    endpoints.client.pump();
    let acks = endpoints.transports.client_to_server.take_queued();
    assert_eq!(acks.len(), 1);

    // Same Ack with its version bumped past anything the master sent.
    let mut ahead = acks[0].clone();
    ahead[12..20].copy_from_slice(&99i64.to_le_bytes());
    endpoints.server.wire.receive_frame(&ahead).unwrap();
    endpoints.server.pump();
    assert_eq!(server.inventory.pending_acks(), 1);

    endpoints.server.wire.receive_frame(&acks[0]).unwrap();
    endpoints.server.pump();
    assert_eq!(server.inventory.pending_acks(), 0);
}
