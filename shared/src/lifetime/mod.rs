mod definition;
mod error;
mod sequential;

pub use definition::{Lifetime, LifetimeDefinition, LifetimeStatus};
pub use error::LifetimeError;
pub use sequential::SequentialLifetimes;
