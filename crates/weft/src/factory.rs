//! Workload factories and the global backend registry.
//!
//! Backend dispatch is data, not a class hierarchy: each backend owns a
//! [`ConstructorTable`] keyed by (layer kind, element type), which makes
//! precision variants explicit table entries and backend coverage auditable.
//! Backends register a factory constructor under a name in the process-wide
//! registry; the execution engine looks factories up by that name, so adding
//! a backend never touches the engine.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::capability::{BackendId, CapabilityProfile};
use crate::descriptor::QueueDescriptor;
use crate::error::{FactoryError, TensorRole};
use crate::layer::LayerKind;
use crate::memory::MemoryManager;
use crate::tensor::DType;
use crate::workload::Workload;

/// Builds one concrete workload from a descriptor.
pub type WorkloadConstructor =
    fn(&QueueDescriptor, &MemoryManager) -> Result<Box<dyn Workload>, FactoryError>;

/// Capability-indexed table mapping (kind, dtype) to a constructor.
///
/// Precision variants of the same kind (e.g. a float32 and a quantized
/// softmax path) are separate entries; the dispatching dtype comes from the
/// descriptor, chosen by the caller, never auto-detected here.
#[derive(Default)]
pub struct ConstructorTable {
    entries: HashMap<(LayerKind, DType), WorkloadConstructor>,
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: LayerKind, dtype: DType, constructor: WorkloadConstructor) {
        self.entries.insert((kind, dtype), constructor);
    }

    pub fn get(&self, kind: LayerKind, dtype: DType) -> Option<WorkloadConstructor> {
        self.entries.get(&(kind, dtype)).copied()
    }

    /// Derives the capability profile from the table itself, keeping the
    /// declared support matrix and the dispatch table in lockstep.
    pub fn to_profile(&self, backend: BackendId) -> CapabilityProfile {
        let mut profile = CapabilityProfile::new(backend);
        for (kind, dtype) in self.entries.keys() {
            profile.insert(*kind, *dtype);
        }
        profile
    }
}

/// Constructs backend-specific workloads for one backend.
pub trait WorkloadFactory: Send + Sync {
    fn backend_id(&self) -> &BackendId;

    fn capability_profile(&self) -> &CapabilityProfile;

    /// Validates the descriptor against the capability profile, leases any
    /// scratch memory from `memory`, binds the descriptor's tensor handles
    /// (and quantization parameters where applicable), and returns the
    /// constructed workload.
    ///
    /// A declined combination returns [`FactoryError::NotSupported`] without
    /// side effects: no partially constructed workload, no leaked scratch.
    fn create_workload(
        &self,
        kind: LayerKind,
        descriptor: &QueueDescriptor,
        memory: &MemoryManager,
    ) -> Result<Box<dyn Workload>, FactoryError>;
}

/// Dispatching dtype of a descriptor: the first input's dtype, falling back
/// to the first output for source-like kinds without inputs.
pub fn dispatch_dtype(descriptor: &QueueDescriptor) -> Option<DType> {
    descriptor
        .inputs
        .first()
        .or_else(|| descriptor.outputs.first())
        .map(|handle| handle.info().dtype())
}

/// Shared profile-check-then-table-lookup path used by backend factories.
pub fn create_from_table(
    backend: &BackendId,
    profile: &CapabilityProfile,
    table: &ConstructorTable,
    kind: LayerKind,
    descriptor: &QueueDescriptor,
    memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    profile.check(kind, descriptor)?;
    let dtype = dispatch_dtype(descriptor).ok_or_else(|| {
        FactoryError::unsupported_configuration(
            backend.clone(),
            kind,
            "descriptor carries no tensors to dispatch on",
        )
    })?;
    let constructor = table
        .get(kind, dtype)
        .ok_or_else(|| FactoryError::NotSupported {
            backend: backend.clone(),
            kind,
            dtype,
            role: TensorRole::Input,
            index: 0,
        })?;
    constructor(descriptor, memory)
}

/// Creates a fresh factory instance each time a backend is requested.
pub type FactoryConstructor = Box<dyn Fn() -> Arc<dyn WorkloadFactory> + Send + Sync>;

struct FactoryRegistry {
    factories: RwLock<HashMap<String, FactoryConstructor>>,
}

impl FactoryRegistry {
    fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: FactoryConstructor) {
        self.factories.write().unwrap().insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Arc<dyn WorkloadFactory>> {
        let factories = self.factories.read().unwrap();
        let constructor = factories.get(name)?;
        Some(constructor())
    }

    fn list(&self) -> Vec<String> {
        self.factories.read().unwrap().keys().cloned().collect()
    }

    fn has(&self, name: &str) -> bool {
        self.factories.read().unwrap().contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

fn global_registry() -> &'static FactoryRegistry {
    GLOBAL_REGISTRY.get_or_init(FactoryRegistry::new)
}

/// Registers a factory constructor under a backend name.
///
/// External crates register their backends by calling this from a module
/// initializer; re-registering a name replaces the previous constructor.
pub fn register_factory<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Arc<dyn WorkloadFactory> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Creates a factory for a registered backend name, or `None`.
pub fn create_factory(name: &str) -> Option<Arc<dyn WorkloadFactory>> {
    global_registry().create(name)
}

/// All registered backend names.
pub fn list_backends() -> Vec<String> {
    global_registry().list()
}

pub fn has_backend(name: &str) -> bool {
    global_registry().has(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LayerParams;

    #[test]
    fn empty_descriptor_reports_missing_dispatch_dtype() {
        let backend = BackendId::new("test");
        let table = ConstructorTable::new();
        let profile = table.to_profile(backend.clone());
        let descriptor = QueueDescriptor::new(vec![], vec![], LayerParams::None);
        let memory = MemoryManager::new(1024);
        let err = match create_from_table(
            &backend,
            &profile,
            &table,
            LayerKind::Softmax,
            &descriptor,
            &memory,
        ) {
            Ok(_) => panic!("a descriptor without tensors must fail"),
            Err(err) => err,
        };
        match err {
            FactoryError::UnsupportedConfiguration { detail, .. } => {
                assert!(detail.contains("no tensors"));
            }
            other => panic!("expected UnsupportedConfiguration, got {other}"),
        }
    }
}
