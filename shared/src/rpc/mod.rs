mod call;
mod error;
mod task;

pub use call::RdCall;
pub use error::RpcError;
pub use task::{RdFault, RdTask, RdTaskResult};
