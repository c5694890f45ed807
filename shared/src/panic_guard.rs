use std::{
    any::Any,
    fmt::Display,
    panic::{catch_unwind, AssertUnwindSafe},
};

use log::error;

/// Runs `f`, logging and swallowing a panic. Returns `None` if `f` panicked.
pub(crate) fn catch_logged<T>(context: impl Display, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!("{}: {}", context, panic_message(payload.as_ref()));
            None
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
