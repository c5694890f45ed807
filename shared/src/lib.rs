//! # RD Shared
//! Lifetime-scoped reactive primitives and the id-addressed wire protocol that keeps
//! pairs of them in sync across two processes.
//!
//! A [`Protocol`] owns a [`Wire`], a [`Scheduler`] and an id allocator. Entities such as
//! [`RdProperty`], [`RdList`], [`RdMap`] or [`RdCall`] are bound into it under a
//! [`Lifetime`]; while bound, local changes are written to the wire and remote changes
//! are applied on the protocol's scheduler.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use rd_serde::{Serde, SerdeErr, StreamReader, StreamWriter};

mod panic_guard;

pub mod entities;
pub mod identity;
pub mod lifetime;
pub mod protocol;
pub mod reactive;
pub mod rpc;
pub mod scheduler;
pub mod wire;

pub use entities::{
    BindError, ExtState, ExtWire, MapConflictPolicy, RdBindable, RdDynamic, RdExt, RdList, RdMap,
    RdModel, RdProperty, RdSet, RdSignal,
};
pub use identity::{IdKind, Identities, IdentityError, RdId, SequentialIdentities};
pub use lifetime::{Lifetime, LifetimeDefinition, LifetimeError, LifetimeStatus, SequentialLifetimes};
pub use protocol::{
    Polymorphic, PolymorphicValue, Protocol, ProtocolConfig, ProtocolError, RpcTimeouts, Serializers,
    WireValue,
};
pub use reactive::{
    AdvisePriority, ListEvent, MapEvent, Property, ReactiveError, SetEvent, Signal, ViewableList,
    ViewableMap, ViewableSet, WriteOnceProperty,
};
pub use rpc::{RdCall, RdFault, RdTask, RdTaskResult, RpcError};
pub use scheduler::{PumpScheduler, Scheduler, SchedulerError, SynchronousScheduler, ThreadScheduler};
pub use wire::{MessageBroker, RdWireable, Transport, Wire, WireBase, WireError};
