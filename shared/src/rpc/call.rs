use std::{
    error::Error as StdError,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use log::{error, trace, warn};
use parking_lot::Mutex;

use rd_serde::{Serde, StreamWriter};

use crate::{
    entities::{BindError, BindableCore, RdBindable, RdDynamic},
    identity::{Identities, RdId},
    lifetime::{Lifetime, LifetimeDefinition},
    protocol::{Protocol, RpcTimeouts, Serializers, WireValue},
    scheduler::{Scheduler, SynchronousScheduler},
    wire::{RdWireable, Wire},
};

use super::{
    error::RpcError,
    task::{RdFault, RdTask, RdTaskResult},
};

type CallHandler<Req, Res> = Arc<dyn Fn(&Lifetime, Req) -> RdTask<Res> + Send + Sync>;

struct CallInner<Req, Res> {
    core: BindableCore,
    handler: Mutex<Option<CallHandler<Req, Res>>>,
    handler_scheduler: Mutex<Option<Arc<dyn Scheduler>>>,
    cancellation_scheduler: Mutex<Option<Arc<dyn Scheduler>>>,
}

/// A request/response endpoint shared by both peers. Either side may call it; the side
/// that set a handler answers.
///
/// A request is `[task id: i64][request]` on the call's id. The response travels on the
/// task id as an [`RdTaskResult`]; an empty message on the task id from the caller
/// cancels the call.
pub struct RdCall<Req, Res> {
    inner: Arc<CallInner<Req, Res>>,
}

impl<Req, Res> Clone for RdCall<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Req, Res> RdCall<Req, Res>
where
    Req: WireValue,
    Res: WireValue + Clone + PartialEq,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CallInner {
                core: BindableCore::new("call"),
                handler: Mutex::new(None),
                handler_scheduler: Mutex::new(None),
                cancellation_scheduler: Mutex::new(None),
            }),
        }
    }

    /// Answers incoming requests with `handler`. The lifetime passed to it ends when the
    /// caller cancels.
    pub fn set_handler(&self, handler: impl Fn(&Lifetime, Req) -> RdTask<Res> + Send + Sync + 'static) {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Answers incoming requests synchronously. An `Err` reaches the caller as a fault.
    pub fn set_sync<E: StdError + 'static>(
        &self,
        handler: impl Fn(Req) -> Result<Res, E> + Send + Sync + 'static,
    ) {
        self.set_handler(move |_, request| match handler(request) {
            Ok(response) => RdTask::from_result(response),
            Err(error) => RdTask::faulted(RdFault::from_error(&error)),
        });
    }

    /// Runs the handler on `scheduler` instead of the protocol's scheduler. Takes effect
    /// at the next bind.
    pub fn set_handler_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        *self.inner.handler_scheduler.lock() = Some(scheduler);
    }

    /// Where cancellation requests are delivered. Defaults to running them on the
    /// receiving thread, so a busy handler scheduler does not delay them.
    pub fn set_cancellation_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        *self.inner.cancellation_scheduler.lock() = Some(scheduler);
    }

    /// Sends `request`. The returned task settles with the response, or with
    /// `Cancelled` if `lifetime` or the call's binding ends first.
    pub fn try_start(&self, lifetime: &Lifetime, request: Req) -> Result<RdTask<Res>, RpcError> {
        self.inner.core.check_thread()?;
        self.start_with(lifetime, request, None)
    }

    /// Panicking version of [`RdCall::try_start`].
    pub fn start(&self, lifetime: &Lifetime, request: Req) -> RdTask<Res> {
        match self.try_start(lifetime, request) {
            Ok(task) => task,
            Err(error) => panic!("{}", error),
        }
    }

    /// Sends `request` and blocks until the response arrives. Logs a warning once the
    /// call is slower than `warn_await`, and gives up, cancelling the call, after
    /// `error_await`. Uses the protocol's timeouts when `timeouts` is `None`.
    pub fn sync(&self, request: Req, timeouts: Option<RpcTimeouts>) -> Result<Res, RpcError> {
        let protocol = self.bound_protocol()?;
        let timeouts = timeouts.unwrap_or(protocol.config().rpc_timeouts);
        let location = self.inner.core.location();

        let caller = LifetimeDefinition::new();
        let task = self.start_with(&caller, request, Some(Arc::new(SynchronousScheduler::new())))?;
        let started = Instant::now();

        let first_wait = timeouts.warn_await.min(timeouts.error_await);
        let result = match task.wait(first_wait) {
            Some(result) => Some(result),
            None if first_wait < timeouts.error_await => {
                warn!("call `{}` is taking longer than {:?}", location, timeouts.warn_await);
                task.wait(timeouts.error_await - first_wait)
            }
            None => None,
        };
        caller.terminate();

        match result {
            Some(result) => result.into_result(),
            None => Err(RpcError::Timeout {
                location,
                waited: started.elapsed(),
            }),
        }
    }

    fn bound_protocol(&self) -> Result<Arc<Protocol>, BindError> {
        self.inner.core.protocol().ok_or_else(|| BindError::NotBound {
            location: self.inner.core.location(),
        })
    }

    fn start_with(
        &self,
        lifetime: &Lifetime,
        request: Req,
        response_scheduler: Option<Arc<dyn Scheduler>>,
    ) -> Result<RdTask<Res>, RpcError> {
        let protocol = self.bound_protocol()?;
        let (call_id, binding) = match (self.inner.core.rd_id(), self.inner.core.binding()) {
            (id, Some(binding)) if !id.is_null() => (id, binding),
            _ => {
                return Err(BindError::NotBound {
                    location: self.inner.core.location(),
                }
                .into())
            }
        };

        let task_id = protocol.identities().next(RdId::NULL);
        let mut writer = StreamWriter::new();
        task_id.ser(&mut writer);
        request.write_value(protocol.serializers(), &mut writer)?;

        let task = RdTask::new();
        let call_site = lifetime.intersect(&binding);
        let location = format!("{}[{}]", self.inner.core.location(), task_id);
        let cancel_task = task.clone();
        let cancel_wire = protocol.wire().clone();
        let cancel_location = location.clone();
        let registered = call_site.try_on_termination(move || {
            if cancel_task.set(RdTaskResult::Cancelled) {
                trace!("call `{}` :: cancelled, notifying handler", cancel_location);
                cancel_wire.send(task_id, &[]);
            }
        });
        if registered.is_err() {
            task.set(RdTaskResult::Cancelled);
            return Ok(task);
        }

        let site = Arc::new(CallSiteTask {
            id: task_id,
            task: task.clone(),
            serializers: protocol.serializers().clone(),
            scheduler: response_scheduler.unwrap_or_else(|| protocol.scheduler().clone()),
            location: location.clone(),
        });
        if let Err(error) = protocol.wire().try_advise_transient(&call_site, site) {
            call_site.terminate();
            return Err(BindError::from(error).into());
        }

        let finished = call_site.clone();
        task.advise(&call_site, move |_| {
            finished.terminate();
        });

        trace!("call `{}` :: send request", location);
        protocol.wire().send(call_id, &writer.to_bytes());
        Ok(task)
    }
}

impl<Req, Res> Default for RdCall<Req, Res>
where
    Req: WireValue,
    Res: WireValue + Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Res> CallInner<Req, Res>
where
    Req: WireValue,
    Res: WireValue + Clone + PartialEq,
{
    fn run_handler(&self, lifetime: &Lifetime, request: Req) -> RdTask<Res> {
        let handler = self.handler.lock().clone();
        let Some(handler) = handler else {
            let message = format!("no handler set for call `{}`", self.core.location());
            return RdTask::faulted(RdFault::new("NoHandler", message.clone(), message));
        };
        match catch_unwind(AssertUnwindSafe(|| handler(lifetime, request))) {
            Ok(task) => task,
            Err(payload) => {
                let fault = RdFault::from_panic(payload.as_ref());
                warn!("call `{}` :: handler panicked: {}", self.core.location(), fault.reason_message);
                RdTask::faulted(fault)
            }
        }
    }
}

impl<Req, Res> RdWireable for CallInner<Req, Res>
where
    Req: WireValue,
    Res: WireValue + Clone + PartialEq,
{
    fn rd_id(&self) -> RdId {
        self.core.rd_id()
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        match self.handler_scheduler.lock().clone() {
            Some(scheduler) => scheduler,
            None => self.core.scheduler(),
        }
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let Some((protocol, (task_id, request))) = self.core.decode(payload, |serializers, reader| {
            let task_id = RdId::de(reader)?;
            Ok((task_id, Req::read_value(serializers, reader)?))
        }) else {
            return;
        };
        let Some(binding) = self.core.binding() else {
            return;
        };
        let location = format!("{}[{}]", self.core.location(), task_id);
        trace!("call `{}` :: received request", location);

        let handling = binding.create_nested();
        let outcome = RdTask::<Res>::new();
        let endpoint = Arc::new(EndpointTask {
            id: task_id,
            handling: handling.clone(),
            outcome: outcome.clone(),
            scheduler: self
                .cancellation_scheduler
                .lock()
                .clone()
                .unwrap_or_else(|| Arc::new(SynchronousScheduler::new())),
            location: location.clone(),
        });
        if let Err(error) = protocol.wire().try_advise_transient(&handling, endpoint) {
            warn!("call `{}` :: dropping request: {}", location, error);
            handling.terminate();
            return;
        }

        let handler_task = self.run_handler(&handling, request);

        let wire = protocol.wire().clone();
        let serializers = protocol.serializers().clone();
        let finished = handling.clone();
        handler_task.advise(&handling, move |result| {
            if outcome.set(result.clone()) {
                send_response(&*wire, &serializers, task_id, result, &location);
            }
            finished.terminate();
        });
    }

    fn location(&self) -> String {
        self.core.location()
    }
}

fn send_response<Res: WireValue>(
    wire: &dyn Wire,
    serializers: &Serializers,
    task_id: RdId,
    result: &RdTaskResult<Res>,
    location: &str,
) {
    let mut writer = StreamWriter::new();
    if let Err(error) = result.write_value(serializers, &mut writer) {
        error!("call `{}` :: failed to serialize response: {}", location, error);
        let message = error.to_string();
        let fault = RdTaskResult::<Res>::Fault(RdFault::new("ProtocolError", message.clone(), message));
        writer = StreamWriter::new();
        if fault.write_value(serializers, &mut writer).is_err() {
            return;
        }
    }
    trace!("call `{}` :: send response", location);
    wire.send(task_id, &writer.to_bytes());
}

/// The caller's half of one call: waits on the task id for the response.
struct CallSiteTask<Res> {
    id: RdId,
    task: RdTask<Res>,
    serializers: Arc<Serializers>,
    scheduler: Arc<dyn Scheduler>,
    location: String,
}

impl<Res: WireValue + Clone + PartialEq> RdWireable for CallSiteTask<Res> {
    fn rd_id(&self) -> RdId {
        self.id
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    fn on_wire_received(&self, payload: &[u8]) {
        let mut reader = rd_serde::StreamReader::new(payload);
        let result = match RdTaskResult::<Res>::read_value(&self.serializers, &mut reader) {
            Ok(result) => result,
            Err(error) => {
                error!("call `{}` :: malformed response: {}", self.location, error);
                let message = error.to_string();
                RdTaskResult::Fault(RdFault::new("ProtocolError", message.clone(), message))
            }
        };
        if self.task.set(result) {
            trace!("call `{}` :: response received", self.location);
        } else {
            trace!("call `{}` :: late response dropped", self.location);
        }
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

/// The handler's half of one call: listens on the task id for cancellation.
struct EndpointTask<Res> {
    id: RdId,
    handling: LifetimeDefinition,
    outcome: RdTask<Res>,
    scheduler: Arc<dyn Scheduler>,
    location: String,
}

impl<Res: WireValue + Clone + PartialEq> RdWireable for EndpointTask<Res> {
    fn rd_id(&self) -> RdId {
        self.id
    }

    fn wire_scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    fn on_wire_received(&self, _payload: &[u8]) {
        if self.outcome.set(RdTaskResult::Cancelled) {
            trace!("call `{}` :: cancelled by caller", self.location);
        }
        self.handling.terminate();
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

impl<Req, Res> RdDynamic for RdCall<Req, Res>
where
    Req: WireValue,
    Res: WireValue + Clone + PartialEq,
{
    fn protocol(&self) -> Option<Arc<Protocol>> {
        self.inner.core.protocol()
    }

    fn location(&self) -> String {
        self.inner.core.location()
    }
}

impl<Req, Res> RdBindable for RdCall<Req, Res>
where
    Req: WireValue,
    Res: WireValue + Clone + PartialEq,
{
    fn rd_id(&self) -> RdId {
        self.inner.core.rd_id()
    }

    fn try_identify(&self, _identities: &dyn Identities, id: RdId) -> Result<(), BindError> {
        self.inner.core.identify(id)
    }

    fn try_bind(&self, lifetime: &Lifetime, parent: &dyn RdDynamic, name: &str) -> Result<(), BindError> {
        let attached = self.inner.core.attach(lifetime, parent, name)?;
        if let Err(error) = attached
            .protocol
            .wire()
            .try_advise(&attached.binding, self.inner.clone())
        {
            attached.binding.terminate();
            return Err(error.into());
        }
        Ok(())
    }
}
