pub mod test_endpoints;
pub mod test_model;

pub use test_endpoints::{TestEndpoints, TestPeer};
pub use test_model::TestModel;

/// Initializes logging once per test binary. Honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
