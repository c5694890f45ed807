mod bindable;
mod error;
mod ext;
mod model;
mod rd_list;
mod rd_map;
mod rd_property;
mod rd_set;
mod rd_signal;

pub(crate) use bindable::BindableCore;
pub use bindable::{RdBindable, RdDynamic};
pub use error::BindError;
pub use ext::{ExtState, ExtWire, RdExt};
pub use model::RdModel;
pub use rd_list::RdList;
pub use rd_map::{MapConflictPolicy, RdMap};
pub use rd_property::RdProperty;
pub use rd_set::RdSet;
pub use rd_signal::RdSignal;
