pub mod conformance;
pub mod mock;
pub mod support;

pub use mock::{register_mock_backend, MockKernelLibrary, MockWorkloadFactory};
pub use support::assert_close;
