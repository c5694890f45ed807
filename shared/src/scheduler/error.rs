use thiserror::Error;

/// Errors raised by scheduler contracts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Code that must run inside a scheduler ran outside of it
    #[error("Must be executed on scheduler `{scheduler}`, but current thread is `{thread}`")]
    WrongThread { scheduler: String, thread: String },

    /// The worker thread of a scheduler could not be started
    #[error("Failed to start scheduler thread `{name}`: {reason}")]
    Spawn { name: String, reason: String },
}
