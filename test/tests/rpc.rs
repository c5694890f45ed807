/// End-to-end tests for remote calls

use std::{convert::Infallible, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;

use rd_shared::{
    BindError, Lifetime, RdCall, RdTask, RdTaskResult, RpcError, RpcTimeouts, ThreadScheduler,
};
use rd_test::{init_logging, TestEndpoints, TestModel};

#[derive(Debug)]
struct NotFound(String);

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no item named `{}`", self.0)
    }
}

impl std::error::Error for NotFound {}

fn bound_pair(endpoints: &TestEndpoints) -> (TestModel, TestModel) {
    let (client, server) = TestModel::pair();
    endpoints.bind(&client.model, &server.model, "model");
    endpoints.exchange();
    (client, server)
}

fn length_handler(call: &RdCall<String, i32>) {
    call.set_sync(|name: String| Ok::<_, Infallible>(name.len() as i32));
}

/// Registers a handler that never answers and records the lifetime of each request.
fn stalled_handler(call: &RdCall<String, i32>) -> Arc<Mutex<Vec<(Lifetime, RdTask<i32>)>>> {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorder = requests.clone();
    call.set_handler(move |lifetime, _request| {
        let task = RdTask::new();
        recorder.lock().push((lifetime.clone(), task.clone()));
        task
    });
    requests
}

#[test]
fn call_returns_handler_result() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    length_handler(&server.lookup);

    let task = endpoints
        .client
        .run(|| client.lookup.start(endpoints.client.lifetime(), "apple".to_string()));
    assert!(!task.is_completed());

    endpoints.exchange();
    assert_eq!(task.result(), Some(RdTaskResult::Success(5)));
}

#[test]
fn either_side_can_answer() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    length_handler(&client.lookup);

    let task = endpoints
        .server
        .run(|| server.lookup.start(endpoints.server.lifetime(), "pear".to_string()));
    endpoints.exchange();

    assert_eq!(task.result(), Some(RdTaskResult::Success(4)));
}

#[test]
fn handler_error_becomes_fault() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    server
        .lookup
        .set_sync(|name: String| Err::<i32, _>(NotFound(name)));

    let task = endpoints
        .client
        .run(|| client.lookup.start(endpoints.client.lifetime(), "ghost".to_string()));
    endpoints.exchange();

    match task.result() {
        Some(RdTaskResult::Fault(fault)) => {
            assert!(fault.reason_type_fqn.ends_with("NotFound"));
            assert_eq!(fault.reason_message, "no item named `ghost`");
        }
        other => panic!("expected a fault, got {:?}", other),
    }
}

#[test]
fn panicking_handler_becomes_fault() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    server.lookup.set_handler(|_, _| panic!("handler exploded"));

    let task = endpoints
        .client
        .run(|| client.lookup.start(endpoints.client.lifetime(), "boom".to_string()));
    endpoints.exchange();

    match task.result() {
        Some(RdTaskResult::Fault(fault)) => assert_eq!(fault.reason_message, "handler exploded"),
        other => panic!("expected a fault, got {:?}", other),
    }
}

#[test]
fn missing_handler_becomes_fault() {
    let endpoints = TestEndpoints::new();
    let (client, _server) = bound_pair(&endpoints);

    let task = endpoints
        .client
        .run(|| client.lookup.start(endpoints.client.lifetime(), "nobody".to_string()));
    endpoints.exchange();

    assert!(matches!(task.result(), Some(RdTaskResult::Fault(_))));
}

#[test]
fn cancelling_caller_ends_handler_lifetime() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    let requests = stalled_handler(&server.lookup);

    let caller = endpoints.client.lifetime().create_nested();
    let task = endpoints
        .client
        .run(|| client.lookup.start(&caller, "slow".to_string()));
    endpoints.exchange();

    let (handler_lifetime, pending) = requests.lock()[0].clone();
    assert!(handler_lifetime.is_alive());

    endpoints.client.run(|| {
        caller.terminate();
    });
    assert_eq!(task.result(), Some(RdTaskResult::Cancelled));
    endpoints.exchange();
    assert!(!handler_lifetime.is_alive());

    // A result produced after cancellation never reaches the caller.
    endpoints.server.run(|| {
        pending.set(RdTaskResult::Success(1));
    });
    assert_eq!(endpoints.exchange(), 0);
    assert_eq!(task.result(), Some(RdTaskResult::Cancelled));
}

#[test]
fn calls_cancelled_before_delivery_leave_no_held_messages() {
    init_logging();
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    length_handler(&server.lookup);

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let caller = endpoints.client.lifetime().create_nested();
        tasks.push(endpoints.client.run(|| {
            let task = client.lookup.start(&caller, "plum".to_string());
            caller.terminate();
            task
        }));
    }
    endpoints.exchange();

    assert!(tasks
        .iter()
        .all(|task| task.result() == Some(RdTaskResult::Cancelled)));
    assert!(endpoints.client.wire.broker().dump().contains("Held queues: 0"));
    assert!(endpoints.server.wire.broker().dump().contains("Held queues: 0"));
}

#[test]
fn finished_calls_leave_nothing_on_caller_lifetime() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    length_handler(&server.lookup);

    let session = endpoints.client.lifetime().create_nested();
    let tasks: Vec<_> = (0..50)
        .map(|_| {
            endpoints
                .client
                .run(|| client.lookup.start(&session, "fig".to_string()))
        })
        .collect();
    endpoints.exchange();

    assert!(tasks
        .iter()
        .all(|task| task.result() == Some(RdTaskResult::Success(3))));
    assert_eq!(session.resource_count(), 0);
    assert!(endpoints.client.wire.broker().dump().contains("Held queues: 0"));
}

#[test]
fn disconnect_cancels_pending_calls() {
    let endpoints = TestEndpoints::new();
    let (client, server) = bound_pair(&endpoints);
    stalled_handler(&server.lookup);

    let task = endpoints
        .client
        .run(|| client.lookup.start(endpoints.client.lifetime(), "never".to_string()));
    endpoints.exchange();

    endpoints.client.disconnect();
    assert_eq!(task.result(), Some(RdTaskResult::Cancelled));
}

#[test]
fn unbound_call_cannot_start() {
    let call = RdCall::<String, i32>::new();
    let lifetime = Lifetime::eternal();

    let result = call.try_start(&lifetime, "x".to_string());
    assert!(matches!(result, Err(RpcError::Bind(BindError::NotBound { .. }))));
}

#[test]
fn blocking_call_returns_result() {
    let endpoints = TestEndpoints::synchronous();
    let (client, server) = bound_pair(&endpoints);
    length_handler(&server.lookup);

    assert_eq!(client.lookup.sync("melon".to_string(), None), Ok(5));
}

#[test]
fn blocking_call_reports_fault() {
    let endpoints = TestEndpoints::synchronous();
    let (client, server) = bound_pair(&endpoints);
    server
        .lookup
        .set_sync(|name: String| Err::<i32, _>(NotFound(name)));

    let result = client.lookup.sync("ghost".to_string(), None);
    assert!(matches!(result, Err(RpcError::Fault(_))));
}

#[test]
fn blocking_call_times_out_and_cancels() {
    let endpoints = TestEndpoints::synchronous();
    let (client, server) = bound_pair(&endpoints);
    let requests = stalled_handler(&server.lookup);

    let timeouts = RpcTimeouts::new(Duration::from_millis(10), Duration::from_millis(50));
    let result = client.lookup.sync("stuck".to_string(), Some(timeouts));

    match result {
        Err(RpcError::Timeout { location, waited }) => {
            assert_eq!(location, "client.model.lookup");
            assert!(waited >= Duration::from_millis(40));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    let (handler_lifetime, _) = requests.lock()[0].clone();
    assert!(!handler_lifetime.is_alive());
}

#[test]
fn handler_can_run_on_its_own_thread() {
    let endpoints = TestEndpoints::synchronous();
    let (client, server) = TestModel::pair();
    let worker = ThreadScheduler::new("lookup-worker").unwrap();
    server.lookup.set_handler_scheduler(Arc::new(worker));
    length_handler(&server.lookup);
    endpoints.bind(&client.model, &server.model, "model");

    let timeouts = RpcTimeouts::new(Duration::from_secs(1), Duration::from_secs(5));
    assert_eq!(client.lookup.sync("kiwi".to_string(), Some(timeouts)), Ok(4));
}
