//! Reference backend workload factory.

use weft::capability::{BackendId, CapabilityProfile};
use weft::descriptor::QueueDescriptor;
use weft::error::FactoryError;
use weft::factory::{create_from_table, ConstructorTable, WorkloadFactory};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::DType;
use weft::workload::Workload;

use crate::workloads::{
    activation, conv2d, copy, elementwise, fully_connected, pooling, softmax, BACKEND_NAME,
};

/// Portable baseline backend. Covers every kind the accelerated backends
/// cover plus the data-movement kinds, so any graph the engine accepts can
/// fall back here.
pub struct RefWorkloadFactory {
    backend: BackendId,
    profile: CapabilityProfile,
    table: ConstructorTable,
}

impl RefWorkloadFactory {
    pub fn new() -> Self {
        let backend = BackendId::new(BACKEND_NAME);
        let mut table = ConstructorTable::new();

        table.insert(LayerKind::Softmax, DType::F32, softmax::make_softmax_f32);
        table.insert(
            LayerKind::Softmax,
            DType::QAsymmU8,
            softmax::make_softmax_qasymm_u8,
        );

        table.insert(
            LayerKind::Activation,
            DType::F32,
            activation::make_activation_f32,
        );

        for dtype in [DType::F32, DType::Si32] {
            table.insert(LayerKind::Addition, dtype, elementwise::make_addition);
            table.insert(LayerKind::Subtraction, dtype, elementwise::make_subtraction);
            table.insert(
                LayerKind::Multiplication,
                dtype,
                elementwise::make_multiplication,
            );
            table.insert(LayerKind::Division, dtype, elementwise::make_division);
            table.insert(LayerKind::Maximum, dtype, elementwise::make_maximum);
            table.insert(LayerKind::Minimum, dtype, elementwise::make_minimum);
        }

        table.insert(
            LayerKind::FullyConnected,
            DType::F32,
            fully_connected::make_fully_connected_f32,
        );
        table.insert(LayerKind::Pooling2d, DType::F32, pooling::make_pooling2d_f32);
        table.insert(
            LayerKind::Convolution2d,
            DType::F32,
            conv2d::make_convolution2d_f32,
        );

        for dtype in [DType::F32, DType::Si32, DType::QAsymmU8, DType::F16] {
            table.insert(LayerKind::MemCopy, dtype, copy::make_mem_copy);
            table.insert(LayerKind::Reshape, dtype, copy::make_reshape);
        }
        for dtype in [DType::F32, DType::Si32, DType::QAsymmU8] {
            table.insert(LayerKind::Permute, dtype, copy::make_permute);
        }

        let profile = table.to_profile(backend.clone());
        Self {
            backend,
            profile,
            table,
        }
    }
}

impl Default for RefWorkloadFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkloadFactory for RefWorkloadFactory {
    fn backend_id(&self) -> &BackendId {
        &self.backend
    }

    fn capability_profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    fn create_workload(
        &self,
        kind: LayerKind,
        descriptor: &QueueDescriptor,
        memory: &MemoryManager,
    ) -> Result<Box<dyn Workload>, FactoryError> {
        create_from_table(
            &self.backend,
            &self.profile,
            &self.table,
            kind,
            descriptor,
            memory,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_mirrors_the_constructor_table() {
        let factory = RefWorkloadFactory::new();
        let profile = factory.capability_profile();
        assert!(profile.supports(LayerKind::Softmax, DType::F32));
        assert!(profile.supports(LayerKind::Softmax, DType::QAsymmU8));
        assert!(profile.supports(LayerKind::Addition, DType::Si32));
        assert!(!profile.supports(LayerKind::Convolution2d, DType::QAsymmU8));
        assert!(!profile.supports(LayerKind::Lstm, DType::F32));
    }
}
