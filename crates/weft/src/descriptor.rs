//! Per-node data packets handed to workload factories.
//!
//! A [`QueueDescriptor`] bundles the input/output tensor handles of one graph
//! node together with the operation parameters for its layer kind. The node
//! owns its descriptor for the lifetime of the loaded graph.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layer::LayerKind;
use crate::tensor::{DataLayout, TensorHandle, TensorShape};

/// Activation functions selectable by [`LayerParams::Activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLu,
    BoundedReLu,
    Sigmoid,
    TanH,
    LeakyReLu,
    Abs,
    Sqrt,
    Square,
    Linear,
}

/// Pooling algorithms selectable by [`LayerParams::Pooling2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolingAlgorithm {
    Max,
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convolution2dParams {
    pub stride: (usize, usize),
    pub padding: (usize, usize),
    pub dilation: (usize, usize),
    pub bias_enabled: bool,
    pub layout: DataLayout,
}

impl Default for Convolution2dParams {
    fn default() -> Self {
        Self {
            stride: (1, 1),
            padding: (0, 0),
            dilation: (1, 1),
            bias_enabled: false,
            layout: DataLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullyConnectedParams {
    pub bias_enabled: bool,
    /// When set, weights arrive as `[in_features, out_features]` instead of
    /// `[out_features, in_features]`.
    pub transpose_weight_matrix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pooling2dParams {
    pub pool: PoolingAlgorithm,
    pub window: (usize, usize),
    pub stride: (usize, usize),
    pub padding: (usize, usize),
    pub layout: DataLayout,
}

/// Operation parameters, one variant per parameterized layer kind.
///
/// Kinds without parameters (elementwise arithmetic, MemCopy, ...) use
/// [`LayerParams::None`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerParams {
    None,
    Activation {
        function: ActivationFunction,
        alpha: f32,
        beta: f32,
    },
    Convolution2d(Convolution2dParams),
    FullyConnected(FullyConnectedParams),
    Pooling2d(Pooling2dParams),
    Softmax {
        beta: f32,
    },
    Permute {
        mappings: Vec<usize>,
    },
    Reshape {
        target_shape: TensorShape,
    },
    Merger {
        axis: usize,
    },
    Mean {
        axes: Vec<usize>,
        keep_dims: bool,
    },
    Pad {
        pad_list: Vec<(usize, usize)>,
    },
}

/// Tensor handles and parameters needed to execute one operation instance.
#[derive(Debug, Clone)]
pub struct QueueDescriptor {
    pub inputs: Vec<TensorHandle>,
    pub outputs: Vec<TensorHandle>,
    pub params: LayerParams,
}

impl QueueDescriptor {
    pub fn new(
        inputs: Vec<TensorHandle>,
        outputs: Vec<TensorHandle>,
        params: LayerParams,
    ) -> Self {
        Self {
            inputs,
            outputs,
            params,
        }
    }

    pub fn ensure_inputs(&self, kind: LayerKind, expected: usize) -> Result<(), DescriptorError> {
        if self.inputs.len() != expected {
            return Err(DescriptorError::WrongInputCount {
                kind,
                expected,
                actual: self.inputs.len(),
            });
        }
        Ok(())
    }

    pub fn ensure_outputs(&self, kind: LayerKind, expected: usize) -> Result<(), DescriptorError> {
        if self.outputs.len() != expected {
            return Err(DescriptorError::WrongOutputCount {
                kind,
                expected,
                actual: self.outputs.len(),
            });
        }
        Ok(())
    }

    /// Checks that two descriptor tensors agree in shape.
    pub fn ensure_same_shape(
        &self,
        kind: LayerKind,
        a: &TensorHandle,
        b: &TensorHandle,
    ) -> Result<(), DescriptorError> {
        if a.info().shape() != b.info().shape() {
            return Err(DescriptorError::ShapeMismatch {
                kind,
                lhs: a.info().shape().clone(),
                rhs: b.info().shape().clone(),
            });
        }
        Ok(())
    }

    /// Extracts the expected parameter variant, naming the mismatch otherwise.
    pub fn expect_params<'a, T>(
        &'a self,
        kind: LayerKind,
        expected: &'static str,
        extract: impl FnOnce(&'a LayerParams) -> Option<T>,
    ) -> Result<T, DescriptorError> {
        extract(&self.params).ok_or(DescriptorError::WrongParams { kind, expected })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    #[error("{kind} expects {expected} input tensor(s), descriptor has {actual}")]
    WrongInputCount {
        kind: LayerKind,
        expected: usize,
        actual: usize,
    },
    #[error("{kind} expects {expected} output tensor(s), descriptor has {actual}")]
    WrongOutputCount {
        kind: LayerKind,
        expected: usize,
        actual: usize,
    },
    #[error("{kind} descriptor carries the wrong parameter variant, expected {expected}")]
    WrongParams {
        kind: LayerKind,
        expected: &'static str,
    },
    #[error("{kind} tensor shapes disagree: {lhs} vs {rhs}")]
    ShapeMismatch {
        kind: LayerKind,
        lhs: TensorShape,
        rhs: TensorShape,
    },
    #[error("{kind} descriptor is invalid: {detail}")]
    Invalid { kind: LayerKind, detail: String },
}
