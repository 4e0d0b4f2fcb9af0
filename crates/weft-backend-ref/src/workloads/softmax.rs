//! Softmax over the innermost dimension, float32 and QAsymmU8 variants.

use weft::descriptor::{DescriptorError, LayerParams, QueueDescriptor};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{QuantizationInfo, TensorData, TensorHandle};
use weft::workload::Workload;

use super::{f32_slice, qasymm_u8_slice};

const KIND: LayerKind = LayerKind::Softmax;

/// Numerically stable softmax of each `row_len`-sized row of `src`.
fn softmax_rows(src: &[f32], dst: &mut [f32], row_len: usize, beta: f32) {
    for (src_row, dst_row) in src.chunks_exact(row_len).zip(dst.chunks_exact_mut(row_len)) {
        let max = src_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (d, &s) in dst_row.iter_mut().zip(src_row) {
            let e = (beta * (s - max)).exp();
            *d = e;
            sum += e;
        }
        for d in dst_row.iter_mut() {
            *d /= sum;
        }
    }
}

fn softmax_row_len(descriptor: &QueueDescriptor) -> Result<usize, FactoryError> {
    let shape = descriptor.inputs[0].info().shape();
    if shape.rank() == 0 {
        return Err(DescriptorError::Invalid {
            kind: KIND,
            detail: "softmax input must have rank >= 1".into(),
        }
        .into());
    }
    let row_len = shape.dim(shape.rank() - 1);
    if row_len == 0 {
        return Err(DescriptorError::Invalid {
            kind: KIND,
            detail: "softmax input innermost dimension must be non-zero".into(),
        }
        .into());
    }
    Ok(row_len)
}

fn extract_beta(descriptor: &QueueDescriptor) -> Result<f32, DescriptorError> {
    descriptor.expect_params(KIND, "Softmax", |params| match params {
        LayerParams::Softmax { beta } => Some(*beta),
        _ => None,
    })
}

pub struct RefSoftmaxFloat32Workload {
    input: TensorHandle,
    output: TensorHandle,
    beta: f32,
    row_len: usize,
}

pub fn make_softmax_f32(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    descriptor.ensure_inputs(KIND, 1)?;
    descriptor.ensure_outputs(KIND, 1)?;
    descriptor.ensure_same_shape(KIND, &descriptor.inputs[0], &descriptor.outputs[0])?;
    let beta = extract_beta(descriptor)?;
    let row_len = softmax_row_len(descriptor)?;
    Ok(Box::new(RefSoftmaxFloat32Workload {
        input: descriptor.inputs[0].clone(),
        output: descriptor.outputs[0].clone(),
        beta,
        row_len,
    }))
}

impl Workload for RefSoftmaxFloat32Workload {
    fn kind(&self) -> LayerKind {
        KIND
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let input = self.input.read();
        let src = f32_slice(KIND, &input)?;
        let mut dst = vec![0.0f32; src.len()];
        softmax_rows(src, &mut dst, self.row_len, self.beta);
        drop(input);
        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}

/// Quantized softmax: dequantize, run the shared float kernel, requantize
/// with the output tensor's scale/offset.
pub struct RefSoftmaxQAsymmU8Workload {
    input: TensorHandle,
    output: TensorHandle,
    beta: f32,
    row_len: usize,
    input_q: QuantizationInfo,
    output_q: QuantizationInfo,
}

pub fn make_softmax_qasymm_u8(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    descriptor.ensure_inputs(KIND, 1)?;
    descriptor.ensure_outputs(KIND, 1)?;
    descriptor.ensure_same_shape(KIND, &descriptor.inputs[0], &descriptor.outputs[0])?;
    let beta = extract_beta(descriptor)?;
    let row_len = softmax_row_len(descriptor)?;
    let quant = |handle: &TensorHandle| {
        handle
            .info()
            .quantization()
            .ok_or_else(|| DescriptorError::Invalid {
                kind: KIND,
                detail: "QAsymmU8 softmax tensors must carry quantization parameters".into(),
            })
    };
    let input_q = quant(&descriptor.inputs[0])?;
    let output_q = quant(&descriptor.outputs[0])?;
    Ok(Box::new(RefSoftmaxQAsymmU8Workload {
        input: descriptor.inputs[0].clone(),
        output: descriptor.outputs[0].clone(),
        beta,
        row_len,
        input_q,
        output_q,
    }))
}

impl Workload for RefSoftmaxQAsymmU8Workload {
    fn kind(&self) -> LayerKind {
        KIND
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let input = self.input.read();
        let src = qasymm_u8_slice(KIND, &input)?;
        let dequantized: Vec<f32> = src.iter().map(|&v| self.input_q.dequantize(v)).collect();
        drop(input);

        let mut probabilities = vec![0.0f32; dequantized.len()];
        softmax_rows(&dequantized, &mut probabilities, self.row_len, self.beta);

        let requantized: Vec<u8> = probabilities
            .iter()
            .map(|&p| self.output_q.quantize(p))
            .collect();
        *self.output.write() = TensorData::QAsymmU8(requantized);
        Ok(())
    }
}
