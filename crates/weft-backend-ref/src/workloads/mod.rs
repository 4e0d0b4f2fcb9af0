//! Reference workload implementations.
//!
//! Each submodule provides constructor functions with the
//! [`weft::factory::WorkloadConstructor`] signature; the factory's table maps
//! (kind, dtype) pairs onto them. Kernels favour clarity over speed: this
//! backend is the semantic baseline the accelerated backends are tested
//! against.

pub mod activation;
pub mod conv2d;
pub mod copy;
pub mod elementwise;
pub mod fully_connected;
pub mod pooling;
pub mod softmax;

use weft::capability::BackendId;
use weft::error::ExecutionError;
use weft::layer::LayerKind;
use weft::tensor::TensorData;

pub(crate) const BACKEND_NAME: &str = "ref";

pub(crate) fn exec_err(kind: LayerKind, message: impl Into<String>) -> ExecutionError {
    ExecutionError::backend(BackendId::new(BACKEND_NAME), kind, message)
}

/// Views tensor data as f32, surfacing a backend error on a dtype mismatch
/// that slipped past construction-time validation.
pub(crate) fn f32_slice<'a>(
    kind: LayerKind,
    data: &'a TensorData,
) -> Result<&'a [f32], ExecutionError> {
    data.as_f32()
        .ok_or_else(|| exec_err(kind, format!("expected Float32 data, found {}", data.dtype())))
}

pub(crate) fn qasymm_u8_slice<'a>(
    kind: LayerKind,
    data: &'a TensorData,
) -> Result<&'a [u8], ExecutionError> {
    data.as_qasymm_u8()
        .ok_or_else(|| exec_err(kind, format!("expected QAsymmU8 data, found {}", data.dtype())))
}
