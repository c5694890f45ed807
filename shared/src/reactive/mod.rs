mod combinators;
mod error;
mod property;
mod signal;
mod viewable_list;
mod viewable_map;
mod viewable_set;

pub use error::ReactiveError;
pub use property::{Property, WriteOnceProperty};
pub use signal::{AdvisePriority, Handler, Signal};
pub use viewable_list::{ListEvent, ViewableList};
pub use viewable_map::{MapEvent, ViewableMap};
pub use viewable_set::{SetEvent, ViewableSet};
