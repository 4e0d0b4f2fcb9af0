//! Mock accelerator backend.
//!
//! Stands in for a backend wrapping an external kernel library: the
//! [`MockKernelLibrary`] records every kernel submission and can be armed to
//! fail, letting engine tests observe placement, execution order and runtime
//! failure propagation without real accelerator hardware.

use std::sync::{Arc, Mutex};

use weft::capability::{BackendId, CapabilityProfile};
use weft::descriptor::QueueDescriptor;
use weft::error::{ExecutionError, FactoryError};
use weft::factory::{register_factory, WorkloadFactory};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::TensorHandle;
use weft::workload::Workload;

#[derive(Default)]
struct LibraryState {
    executed: Vec<LayerKind>,
    failure: Option<String>,
}

/// Shared handle to the fake kernel library; clones observe the same state.
#[derive(Clone, Default)]
pub struct MockKernelLibrary {
    state: Arc<Mutex<LibraryState>>,
}

impl MockKernelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds submitted so far, in execution order.
    pub fn executed(&self) -> Vec<LayerKind> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().executed.clear();
    }

    /// Makes every subsequent submission fail with `message` until
    /// [`MockKernelLibrary::disarm`] is called.
    pub fn arm_failure(&self, message: impl Into<String>) {
        self.state.lock().unwrap().failure = Some(message.into());
    }

    pub fn disarm(&self) {
        self.state.lock().unwrap().failure = None;
    }

    fn submit(&self, kind: LayerKind) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.failure {
            return Err(message.clone());
        }
        state.executed.push(kind);
        Ok(())
    }
}

struct MockWorkload {
    backend: BackendId,
    kind: LayerKind,
    input: Option<TensorHandle>,
    output: Option<TensorHandle>,
    library: MockKernelLibrary,
}

impl Workload for MockWorkload {
    fn kind(&self) -> LayerKind {
        self.kind
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        self.library
            .submit(self.kind)
            .map_err(|message| ExecutionError::backend(self.backend.clone(), self.kind, message))?;
        // Pass-through so downstream nodes observe a write; the mock makes
        // no claim about numeric results.
        if let (Some(input), Some(output)) = (&self.input, &self.output) {
            if input.info().element_count() == output.info().element_count()
                && input.info().dtype() == output.info().dtype()
            {
                let data = input.read().clone();
                *output.write() = data;
            }
        }
        Ok(())
    }
}

/// Factory for the mock backend; supported (kind, dtype) pairs are chosen
/// per test.
pub struct MockWorkloadFactory {
    backend: BackendId,
    profile: CapabilityProfile,
    library: MockKernelLibrary,
}

impl MockWorkloadFactory {
    pub fn new(
        name: &str,
        supported: &[(LayerKind, weft::tensor::DType)],
        library: MockKernelLibrary,
    ) -> Self {
        let backend = BackendId::new(name);
        let mut profile = CapabilityProfile::new(backend.clone());
        for &(kind, dtype) in supported {
            profile.insert(kind, dtype);
        }
        Self {
            backend,
            profile,
            library,
        }
    }
}

impl WorkloadFactory for MockWorkloadFactory {
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
        _memory: &MemoryManager,
    ) -> Result<Box<dyn Workload>, FactoryError> {
        self.profile.check(kind, descriptor)?;
        Ok(Box::new(MockWorkload {
            backend: self.backend.clone(),
            kind,
            input: descriptor.inputs.first().cloned(),
            output: descriptor.outputs.first().cloned(),
            library: self.library.clone(),
        }))
    }
}

/// Registers a mock backend under `name`; all factory instances created from
/// the registry share the returned library handle.
pub fn register_mock_backend(
    name: &str,
    supported: &[(LayerKind, weft::tensor::DType)],
) -> MockKernelLibrary {
    let library = MockKernelLibrary::new();
    let registered = library.clone();
    let name_owned = name.to_string();
    let supported: Vec<_> = supported.to_vec();
    register_factory(name, move || {
        Arc::new(MockWorkloadFactory::new(
            &name_owned,
            &supported,
            registered.clone(),
        )) as Arc<dyn WorkloadFactory>
    });
    library
}
