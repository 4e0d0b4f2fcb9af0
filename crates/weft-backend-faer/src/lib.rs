//! faer-accelerated backend.
//!
//! Covers the GEMM-shaped kinds only (fully connected and 2D convolution via
//! im2col); everything else is left to the reference backend through engine
//! fallback.

pub mod factory;
pub mod workloads;

pub use factory::FaerWorkloadFactory;

use std::sync::Arc;

use faer::Par;

pub(crate) fn faer_parallelism() -> Par {
    let par = faer::get_global_parallelism();
    if par.degree() == 1 {
        Par::Seq
    } else {
        par
    }
}

/// Register the faer backend with the global factory registry under the
/// name "faer".
pub fn register_faer_backend() {
    weft::factory::register_factory("faer", || {
        Arc::new(FaerWorkloadFactory::new()) as Arc<dyn weft::factory::WorkloadFactory>
    });
    log::debug!("faer backend registered as 'faer'");
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_FAER_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_faer_backend();
    }
    register
};
