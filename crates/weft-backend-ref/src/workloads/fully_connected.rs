//! Fully connected (inner product) layer, float32.

use weft::descriptor::{DescriptorError, FullyConnectedParams, LayerParams, QueueDescriptor};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{TensorData, TensorHandle};
use weft::workload::Workload;

use super::f32_slice;

const KIND: LayerKind = LayerKind::FullyConnected;

pub struct RefFullyConnectedFloat32Workload {
    input: TensorHandle,
    weights: TensorHandle,
    bias: Option<TensorHandle>,
    output: TensorHandle,
    batch: usize,
    in_features: usize,
    out_features: usize,
    transposed: bool,
}

pub fn make_fully_connected_f32(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    let params = descriptor.expect_params(KIND, "FullyConnected", |params| match params {
        LayerParams::FullyConnected(params) => Some(*params),
        _ => None,
    })?;
    let expected_inputs = if params.bias_enabled { 3 } else { 2 };
    descriptor.ensure_inputs(KIND, expected_inputs)?;
    descriptor.ensure_outputs(KIND, 1)?;

    let (batch, in_features, out_features) = validate_shapes(descriptor, params)?;

    Ok(Box::new(RefFullyConnectedFloat32Workload {
        input: descriptor.inputs[0].clone(),
        weights: descriptor.inputs[1].clone(),
        bias: descriptor.inputs.get(2).cloned(),
        output: descriptor.outputs[0].clone(),
        batch,
        in_features,
        out_features,
        transposed: params.transpose_weight_matrix,
    }))
}

/// Leading dim is the batch; all remaining input dims flatten into features.
fn validate_shapes(
    descriptor: &QueueDescriptor,
    params: FullyConnectedParams,
) -> Result<(usize, usize, usize), DescriptorError> {
    let invalid = |detail: String| DescriptorError::Invalid { kind: KIND, detail };

    let input_shape = descriptor.inputs[0].info().shape();
    if input_shape.rank() < 2 {
        return Err(invalid("input must have rank >= 2".into()));
    }
    let batch = input_shape.dim(0);
    let in_features: usize = input_shape.dims()[1..].iter().product();

    let weight_shape = descriptor.inputs[1].info().shape();
    if weight_shape.rank() != 2 {
        return Err(invalid("weights must have rank 2".into()));
    }
    let (weight_out, weight_in) = if params.transpose_weight_matrix {
        (weight_shape.dim(1), weight_shape.dim(0))
    } else {
        (weight_shape.dim(0), weight_shape.dim(1))
    };
    if weight_in != in_features {
        return Err(invalid(format!(
            "weights expect {weight_in} input features, input provides {in_features}"
        )));
    }

    if params.bias_enabled {
        let bias_count = descriptor.inputs[2].info().element_count();
        if bias_count != weight_out {
            return Err(invalid(format!(
                "bias holds {bias_count} values for {weight_out} output features"
            )));
        }
    }

    let output_shape = descriptor.outputs[0].info().shape();
    let output_count = output_shape.element_count();
    if output_count != batch * weight_out {
        return Err(invalid(format!(
            "output {output_shape} does not match batch {batch} x features {weight_out}"
        )));
    }

    Ok((batch, in_features, weight_out))
}

impl Workload for RefFullyConnectedFloat32Workload {
    fn kind(&self) -> LayerKind {
        KIND
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let input_guard = self.input.read();
        let weights_guard = self.weights.read();
        let input = f32_slice(KIND, &input_guard)?;
        let weights = f32_slice(KIND, &weights_guard)?;

        let mut dst = vec![0.0f32; self.batch * self.out_features];
        for b in 0..self.batch {
            let row = &input[b * self.in_features..(b + 1) * self.in_features];
            for o in 0..self.out_features {
                let mut acc = 0.0f32;
                for (i, &x) in row.iter().enumerate() {
                    let w = if self.transposed {
                        // weights laid out [in_features, out_features]
                        weights[i * self.out_features + o]
                    } else {
                        weights[o * self.in_features + i]
                    };
                    acc += x * w;
                }
                dst[b * self.out_features + o] = acc;
            }
        }
        drop(input_guard);
        drop(weights_guard);

        if let Some(bias) = &self.bias {
            let bias_guard = bias.read();
            let bias = f32_slice(KIND, &bias_guard)?;
            for b in 0..self.batch {
                for o in 0..self.out_features {
                    dst[b * self.out_features + o] += bias[o];
                }
            }
        }

        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}
