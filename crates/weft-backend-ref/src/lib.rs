pub mod factory;
pub mod workloads;

pub use factory::RefWorkloadFactory;

use std::sync::Arc;

/// Register the reference backend with the global factory registry.
///
/// Called automatically via a static initializer, but can also be called
/// manually to make registration explicit in tests and binaries.
/// The backend is registered under the name "ref".
pub fn register_ref_backend() {
    weft::factory::register_factory("ref", || {
        Arc::new(RefWorkloadFactory::new()) as Arc<dyn weft::factory::WorkloadFactory>
    });
    log::debug!("reference backend registered as 'ref'");
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_REF_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_ref_backend();
    }
    register
};
