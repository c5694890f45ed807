mod config;
mod error;
mod rd_protocol;
mod serializers;

pub use config::{ProtocolConfig, RpcTimeouts};
pub use error::ProtocolError;
pub use rd_protocol::Protocol;
pub use serializers::{Polymorphic, PolymorphicValue, Serializers, WireValue};
