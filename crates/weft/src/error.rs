//! Shared error taxonomy for workload construction and execution.

use std::fmt;

use thiserror::Error;

use crate::capability::BackendId;
use crate::descriptor::DescriptorError;
use crate::layer::LayerKind;
use crate::memory::MemoryError;
use crate::tensor::{DType, TensorError};

/// Whether a tensor sits on the input or output side of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Input,
    Output,
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorRole::Input => f.write_str("input"),
            TensorRole::Output => f.write_str("output"),
        }
    }
}

/// Workload construction failure.
///
/// `NotSupported` and `UnsupportedConfiguration` are recoverable: the graph
/// compiler may retry the node on a fallback backend. Every other variant is
/// fatal for the graph.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The backend's capability profile excludes this kind/dtype combination.
    #[error("backend '{backend}' does not support {kind} with {dtype} {role} tensor {index}")]
    NotSupported {
        backend: BackendId,
        kind: LayerKind,
        dtype: DType,
        role: TensorRole,
        index: usize,
    },
    /// The kind/dtype pair is within the profile, but this particular
    /// descriptor configuration (layout, shape family, ...) is not.
    #[error("backend '{backend}' does not support this {kind} configuration: {detail}")]
    UnsupportedConfiguration {
        backend: BackendId,
        kind: LayerKind,
        detail: String,
    },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl FactoryError {
    pub fn unsupported_configuration(
        backend: BackendId,
        kind: LayerKind,
        detail: impl Into<String>,
    ) -> Self {
        FactoryError::UnsupportedConfiguration {
            backend,
            kind,
            detail: detail.into(),
        }
    }

    /// True when a fallback backend may still be able to serve the node.
    pub fn is_not_supported(&self) -> bool {
        matches!(
            self,
            FactoryError::NotSupported { .. } | FactoryError::UnsupportedConfiguration { .. }
        )
    }
}

/// Run-time workload failure, surfaced per invocation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The backend kernel reported a failure; outputs are unspecified but the
    /// error is explicit, never silent corruption.
    #[error("backend '{backend}' failed executing {kind}: {message}")]
    Backend {
        backend: BackendId,
        kind: LayerKind,
        message: String,
    },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl ExecutionError {
    pub fn backend(backend: BackendId, kind: LayerKind, message: impl Into<String>) -> Self {
        ExecutionError::Backend {
            backend,
            kind,
            message: message.into(),
        }
    }

    /// Backend that raised the failure, when one did.
    pub fn backend_name(&self) -> Option<&str> {
        match self {
            ExecutionError::Backend { backend, .. } => Some(backend.as_str()),
            ExecutionError::Tensor(_) => None,
        }
    }
}

/// Graph-level compilation failure. Fatal for the graph, not the process.
#[derive(Debug, Error)]
pub enum GraphCompileError {
    #[error("graph node {node} ({kind}): no configured backend can execute it")]
    NoBackend {
        node: usize,
        kind: LayerKind,
        /// Why each attempted backend declined, in attempt order.
        attempts: Vec<(BackendId, String)>,
    },
    #[error("backend '{backend}' requested by node {node} is not registered")]
    UnknownBackend { node: usize, backend: BackendId },
    #[error("graph node {node} ({kind}) failed to build: {source}")]
    Factory {
        node: usize,
        kind: LayerKind,
        source: FactoryError,
    },
    #[error("graph contains a dependency cycle through its tensor handles")]
    Cyclic,
}
