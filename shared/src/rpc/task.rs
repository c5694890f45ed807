use std::{
    any::Any,
    error::Error as StdError,
    fmt::Write as _,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use rd_serde::{Serde, SerdeErr, StreamReader, StreamWriter};

use crate::{
    lifetime::{Lifetime, LifetimeDefinition},
    panic_guard::panic_message,
    protocol::{ProtocolError, Serializers, WireValue},
    reactive::WriteOnceProperty,
};

use super::error::RpcError;

/// A failure that crossed the wire. Carries text only, never a native error value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason_type_fqn}: {reason_message}")]
pub struct RdFault {
    pub reason_type_fqn: String,
    pub reason_message: String,
    pub reason_as_text: String,
}

impl RdFault {
    pub fn new(
        reason_type_fqn: impl Into<String>,
        reason_message: impl Into<String>,
        reason_as_text: impl Into<String>,
    ) -> Self {
        Self {
            reason_type_fqn: reason_type_fqn.into(),
            reason_message: reason_message.into(),
            reason_as_text: reason_as_text.into(),
        }
    }

    /// Captures `error` with its type name, message and source chain.
    pub fn from_error<E: StdError + 'static>(error: &E) -> Self {
        let type_name = std::any::type_name::<E>();
        let message = error.to_string();
        let mut text = format!("{}: {}", type_name, message);
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(text, "\nCaused by: {}", cause);
            source = cause.source();
        }
        Self::new(type_name, message, text)
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = panic_message(payload);
        let text = format!("panic: {}", message);
        Self::new("panic", message, text)
    }
}

impl Serde for RdFault {
    fn ser(&self, writer: &mut StreamWriter) {
        self.reason_type_fqn.ser(writer);
        self.reason_message.ser(writer);
        self.reason_as_text.ser(writer);
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            reason_type_fqn: String::de(reader)?,
            reason_message: String::de(reader)?,
            reason_as_text: String::de(reader)?,
        })
    }
}

/// The terminal state of a call. Encoded as `[tag: i32]` followed by the value for
/// `Success = 0`, nothing for `Cancelled = 1` and the fault for `Fault = 2`.
#[derive(Debug, Clone, PartialEq)]
pub enum RdTaskResult<T> {
    Success(T),
    Cancelled,
    Fault(RdFault),
}

impl<T> RdTaskResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RdTaskResult::Success(_))
    }

    pub fn into_result(self) -> Result<T, RpcError> {
        match self {
            RdTaskResult::Success(value) => Ok(value),
            RdTaskResult::Cancelled => Err(RpcError::Cancelled),
            RdTaskResult::Fault(fault) => Err(RpcError::Fault(fault)),
        }
    }
}

impl<T: WireValue> WireValue for RdTaskResult<T> {
    fn write_value(&self, serializers: &Serializers, writer: &mut StreamWriter) -> Result<(), ProtocolError> {
        match self {
            RdTaskResult::Success(value) => {
                0i32.ser(writer);
                value.write_value(serializers, writer)
            }
            RdTaskResult::Cancelled => {
                1i32.ser(writer);
                Ok(())
            }
            RdTaskResult::Fault(fault) => {
                2i32.ser(writer);
                fault.ser(writer);
                Ok(())
            }
        }
    }

    fn read_value(serializers: &Serializers, reader: &mut StreamReader) -> Result<Self, ProtocolError> {
        match i32::de(reader)? {
            0 => Ok(RdTaskResult::Success(T::read_value(serializers, reader)?)),
            1 => Ok(RdTaskResult::Cancelled),
            2 => Ok(RdTaskResult::Fault(RdFault::de(reader)?)),
            tag => Err(SerdeErr::InvalidTag {
                type_name: "RdTaskResult",
                tag: i64::from(tag),
            }
            .into()),
        }
    }
}

/// A pending or settled call outcome. The first result set wins; later ones are ignored.
pub struct RdTask<T> {
    result: WriteOnceProperty<RdTaskResult<T>>,
}

impl<T> Clone for RdTask<T> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> RdTask<T> {
    pub fn new() -> Self {
        Self {
            result: WriteOnceProperty::named("rd_task"),
        }
    }

    pub fn from_result(value: T) -> Self {
        Self::settled(RdTaskResult::Success(value))
    }

    pub fn faulted(fault: RdFault) -> Self {
        Self::settled(RdTaskResult::Fault(fault))
    }

    pub fn cancelled() -> Self {
        Self::settled(RdTaskResult::Cancelled)
    }

    fn settled(result: RdTaskResult<T>) -> Self {
        let task = Self::new();
        task.set(result);
        task
    }

    pub fn result(&self) -> Option<RdTaskResult<T>> {
        self.result.value()
    }

    pub fn is_completed(&self) -> bool {
        self.result.has_value()
    }

    /// Settles the task. Returns `false` if it was already settled.
    pub fn set(&self, result: RdTaskResult<T>) -> bool {
        self.result.set_if_empty(result)
    }

    /// Calls `handler` once with the result, immediately if already settled.
    pub fn advise(&self, lifetime: &Lifetime, handler: impl Fn(&RdTaskResult<T>) + Send + Sync + 'static) {
        self.result.advise(lifetime, handler);
    }

    /// Blocks the calling thread until the task settles or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<RdTaskResult<T>> {
        let signal = Arc::new((Mutex::new(()), Condvar::new()));
        let waiting = LifetimeDefinition::new();
        let notify = signal.clone();
        self.result.advise(&waiting, move |_| {
            let _guard = notify.0.lock();
            notify.1.notify_all();
        });

        let deadline = Instant::now().checked_add(timeout);
        let mut guard = signal.0.lock();
        let result = loop {
            if let Some(result) = self.result() {
                break Some(result);
            }
            match deadline {
                Some(deadline) => {
                    if signal.1.wait_until(&mut guard, deadline).timed_out() {
                        break self.result();
                    }
                }
                None => signal.1.wait(&mut guard),
            }
        };
        drop(guard);
        waiting.terminate();
        result
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Default for RdTask<T> {
    fn default() -> Self {
        Self::new()
    }
}
