//! faer backend workload factory.

use weft::capability::{BackendId, CapabilityProfile};
use weft::descriptor::QueueDescriptor;
use weft::error::FactoryError;
use weft::factory::{create_from_table, ConstructorTable, WorkloadFactory};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::DType;
use weft::workload::Workload;

use crate::workloads::{self, BACKEND_NAME};

/// Covers only the GEMM-shaped kinds; graphs mixing in other kinds rely on
/// engine fallback to a broader backend.
pub struct FaerWorkloadFactory {
    backend: BackendId,
    profile: CapabilityProfile,
    table: ConstructorTable,
}

impl FaerWorkloadFactory {
    pub fn new() -> Self {
        let backend = BackendId::new(BACKEND_NAME);
        let mut table = ConstructorTable::new();
        table.insert(
            LayerKind::FullyConnected,
            DType::F32,
            workloads::make_fully_connected_f32,
        );
        table.insert(
            LayerKind::Convolution2d,
            DType::F32,
            workloads::make_convolution2d_f32,
        );
        let profile = table.to_profile(backend.clone());
        Self {
            backend,
            profile,
            table,
        }
    }
}

impl Default for FaerWorkloadFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkloadFactory for FaerWorkloadFactory {
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
