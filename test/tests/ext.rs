/// End-to-end tests for extension handshakes

use rd_shared::{RdBindable, RdDynamic, RdExt, RdModel, RdProperty};
use rd_test::{init_logging, TestEndpoints};

const SCHEMA_HASH: i64 = 0x5eed_1234;

struct Side {
    ext: RdExt,
    status: RdProperty<String>,
}

fn side(hash: i64) -> Side {
    let status = RdProperty::new(String::from("idle"));
    let ext = RdExt::new(hash).with_member("status", status.clone());
    Side { ext, status }
}

#[test]
fn handshake_connects_both_sides() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let client = side(SCHEMA_HASH);
    let server = side(SCHEMA_HASH);
    endpoints.bind(&client.ext, &server.ext, "plugin");
    endpoints.exchange();

    assert_eq!(client.ext.connected().value(), Some(true));
    assert_eq!(server.ext.connected().value(), Some(true));

    endpoints.client.run(|| client.status.set("busy".to_string()));
    endpoints.exchange();
    assert_eq!(server.status.value().as_deref(), Some("busy"));
}

#[test]
fn member_traffic_waits_for_counterpart() {
    let endpoints = TestEndpoints::new();
    let client = side(SCHEMA_HASH);
    let server = side(SCHEMA_HASH);

    endpoints.client.bind(&client.ext, "plugin");
    endpoints.client.run(|| client.status.set("early".to_string()));
    endpoints.exchange();

    assert_eq!(client.ext.connected().value(), Some(false));
    assert_eq!(client.ext.pending_count(), 1);

    endpoints.server.bind(&server.ext, "plugin");
    endpoints.exchange();

    assert_eq!(client.ext.pending_count(), 0);
    assert_eq!(server.status.value().as_deref(), Some("early"));
}

#[test]
fn extension_nested_in_model_binds_through_child_protocol() {
    let endpoints = TestEndpoints::new();
    let client = side(SCHEMA_HASH);
    let server = side(SCHEMA_HASH);
    let client_model = RdModel::new().with_member("plugin", client.ext.clone());
    let server_model = RdModel::new().with_member("plugin", server.ext.clone());
    endpoints.bind(&client_model, &server_model, "root");
    endpoints.exchange();

    let child = client.status.protocol().expect("member is bound");
    assert_eq!(child.name(), "client.root.plugin");
    assert!(!std::sync::Arc::ptr_eq(&child, &endpoints.client.protocol));
    assert_eq!(client.status.rd_id(), server.status.rd_id());
}

#[test]
fn schema_mismatch_marks_model_out_of_sync() {
    let endpoints = TestEndpoints::new();
    let client = side(1);
    let server = side(2);
    endpoints.bind(&client.ext, &server.ext, "plugin");
    endpoints.exchange();

    assert!(endpoints
        .server
        .protocol
        .out_of_sync_models()
        .contains(&"server.plugin".to_string()));
    assert!(endpoints
        .client
        .protocol
        .out_of_sync_models()
        .contains(&"client.plugin".to_string()));
    assert!(!client.ext.is_bound());
    assert!(!server.ext.is_bound());
    assert!(!server.status.is_bound());
}

#[test]
fn disconnect_is_reported_to_counterpart() {
    let endpoints = TestEndpoints::new();
    let client = side(SCHEMA_HASH);
    let server = side(SCHEMA_HASH);
    endpoints.bind(&client.ext, &server.ext, "plugin");
    endpoints.exchange();
    assert_eq!(server.ext.connected().value(), Some(true));

    endpoints.client.disconnect();
    endpoints.exchange();

    assert_eq!(client.ext.connected().value(), Some(false));
    assert_eq!(server.ext.connected().value(), Some(false));
}
