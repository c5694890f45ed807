/// End-to-end tests for polymorphic values

use rd_serde::{Serde, SerdeErr, StreamReader, StreamWriter};
use rd_shared::{Polymorphic, RdProperty, RdSignal};
use rd_test::{init_logging, TestEndpoints};

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

impl Serde for Position {
    fn ser(&self, writer: &mut StreamWriter) {
        self.x.ser(writer);
        self.y.ser(writer);
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok(Position {
            x: i32::de(reader)?,
            y: i32::de(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity(i32);

impl Serde for Velocity {
    fn ser(&self, writer: &mut StreamWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok(Velocity(i32::de(reader)?))
    }
}

fn register_both(endpoints: &TestEndpoints) {
    for peer in [&endpoints.client, &endpoints.server] {
        let serializers = peer.protocol.serializers();
        serializers.register::<Position>("Position").unwrap();
        serializers.register::<Velocity>("Velocity").unwrap();
    }
}

#[test]
fn polymorphic_property_carries_registered_types() {
    init_logging();
    let endpoints = TestEndpoints::new();
    register_both(&endpoints);
    let client = RdProperty::<Polymorphic>::empty();
    let server = RdProperty::<Polymorphic>::empty();
    endpoints.bind(&client, &server, "shape");

    endpoints
        .client
        .run(|| client.set(Polymorphic::new(Position { x: 3, y: -4 })));
    endpoints.exchange();

    let received = server.value().expect("value arrived");
    assert_eq!(received.downcast_ref::<Position>(), Some(&Position { x: 3, y: -4 }));

    endpoints.client.run(|| client.set(Polymorphic::new(Velocity(9))));
    endpoints.exchange();
    let received = server.value().expect("value arrived");
    assert_eq!(received.downcast_ref::<Velocity>(), Some(&Velocity(9)));
}

#[test]
fn unregistered_type_is_not_sent() {
    let endpoints = TestEndpoints::new();
    let client = RdSignal::<Polymorphic>::new();
    let server = RdSignal::<Polymorphic>::new();
    endpoints.bind(&client, &server, "events");

    endpoints
        .client
        .run(|| client.fire(Polymorphic::new(Velocity(1))));
    assert_eq!(endpoints.transports.client_to_server.queued(), 0);
}

#[test]
fn type_unknown_to_receiver_is_dropped() {
    let endpoints = TestEndpoints::new();
    endpoints
        .client
        .protocol
        .serializers()
        .register::<Position>("Position")
        .unwrap();
    let client = RdProperty::<Polymorphic>::empty();
    let server = RdProperty::<Polymorphic>::empty();
    endpoints.bind(&client, &server, "shape");

    endpoints
        .client
        .run(|| client.set(Polymorphic::new(Position { x: 1, y: 1 })));
    assert_eq!(endpoints.transports.client_to_server.queued(), 1);
    endpoints.exchange();

    assert!(!server.has_value());
}
