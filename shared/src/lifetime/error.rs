use thiserror::Error;

use super::LifetimeStatus;

/// Errors that can occur while scoping work to a Lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifetimeError {
    /// Attempted to register a termination action on a lifetime that is no longer alive
    #[error("Cannot register termination action on lifetime #{id}: lifetime is {status:?}")]
    NotAlive { id: u64, status: LifetimeStatus },
}
