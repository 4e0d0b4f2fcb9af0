extern crate self as weft;

pub mod capability;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod factory;
pub mod graph;
pub mod layer;
pub mod memory;
pub mod tensor;
pub mod workload;

pub use capability::{BackendId, CapabilityProfile};
pub use descriptor::{LayerParams, QueueDescriptor};
pub use engine::{ExecutionEngine, LoadedGraph};
pub use graph::Graph;
pub use layer::LayerKind;
pub use memory::{MemoryHandle, MemoryManager};
pub use tensor::{DType, DataLayout, TensorData, TensorHandle, TensorInfo, TensorShape};
pub use workload::Workload;
