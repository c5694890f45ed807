mod error;
pub mod hash;
mod identities;
mod rd_id;

pub use error::IdentityError;
pub use identities::{IdKind, Identities, SequentialIdentities};
pub use rd_id::RdId;
