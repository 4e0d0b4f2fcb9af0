//! GEMM-backed workloads.
//!
//! faer's `matmul` wants column-major output; both kernels therefore compute
//! the transposed product `C^T = B^T * A^T` into a column-major view of the
//! row-major destination buffer, which is the same bytes.

use std::sync::Mutex;

use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::Accum;

use weft::capability::BackendId;
use weft::descriptor::{
    Convolution2dParams, DescriptorError, FullyConnectedParams, LayerParams, QueueDescriptor,
};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::{MemoryHandle, MemoryManager};
use weft::tensor::{DataLayout, DType, TensorData, TensorHandle};
use weft::workload::Workload;

use crate::faer_parallelism;

pub(crate) const BACKEND_NAME: &str = "faer";

fn exec_err(kind: LayerKind, message: impl Into<String>) -> ExecutionError {
    ExecutionError::backend(BackendId::new(BACKEND_NAME), kind, message)
}

fn f32_slice<'a>(kind: LayerKind, data: &'a TensorData) -> Result<&'a [f32], ExecutionError> {
    data.as_f32()
        .ok_or_else(|| exec_err(kind, format!("expected Float32 data, found {}", data.dtype())))
}

pub struct FaerFullyConnectedWorkload {
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
    const KIND: LayerKind = LayerKind::FullyConnected;
    let params = descriptor.expect_params(KIND, "FullyConnected", |params| match params {
        LayerParams::FullyConnected(params) => Some(*params),
        _ => None,
    })?;
    let expected_inputs = if params.bias_enabled { 3 } else { 2 };
    descriptor.ensure_inputs(KIND, expected_inputs)?;
    descriptor.ensure_outputs(KIND, 1)?;
    let (batch, in_features, out_features) = fully_connected_dims(descriptor, params)?;
    Ok(Box::new(FaerFullyConnectedWorkload {
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

fn fully_connected_dims(
    descriptor: &QueueDescriptor,
    params: FullyConnectedParams,
) -> Result<(usize, usize, usize), DescriptorError> {
    const KIND: LayerKind = LayerKind::FullyConnected;
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
    if params.bias_enabled && descriptor.inputs[2].info().element_count() != weight_out {
        return Err(invalid(format!(
            "bias does not hold one value per {weight_out} output features"
        )));
    }
    if descriptor.outputs[0].info().element_count() != batch * weight_out {
        return Err(invalid(format!(
            "output does not hold batch {batch} x features {weight_out} values"
        )));
    }
    Ok((batch, in_features, weight_out))
}

impl Workload for FaerFullyConnectedWorkload {
    fn kind(&self) -> LayerKind {
        LayerKind::FullyConnected
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        const KIND: LayerKind = LayerKind::FullyConnected;
        let par = faer_parallelism();

        let input_guard = self.input.read();
        let weights_guard = self.weights.read();
        let input = f32_slice(KIND, &input_guard)?;
        let weights = f32_slice(KIND, &weights_guard)?;

        let mut dst = vec![0.0f32; self.batch * self.out_features];
        if self.batch > 0 && self.out_features > 0 {
            let a = MatRef::from_row_major_slice(input, self.batch, self.in_features);
            // C^T (out x batch) in column-major is dst row-major.
            let out_view =
                MatMut::from_column_major_slice_mut(&mut dst, self.out_features, self.batch);
            if self.transposed {
                let w = MatRef::from_row_major_slice(weights, self.in_features, self.out_features);
                matmul(out_view, Accum::Replace, w.transpose(), a.transpose(), 1.0f32, par);
            } else {
                let w = MatRef::from_row_major_slice(weights, self.out_features, self.in_features);
                matmul(out_view, Accum::Replace, w, a.transpose(), 1.0f32, par);
            }
        }
        drop(input_guard);
        drop(weights_guard);

        if let Some(bias) = &self.bias {
            let bias_guard = bias.read();
            let bias = f32_slice(KIND, &bias_guard)?;
            for row in dst.chunks_exact_mut(self.out_features) {
                for (value, b) in row.iter_mut().zip(bias) {
                    *value += b;
                }
            }
        }

        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct ConvDims {
    batch: usize,
    in_c: usize,
    in_h: usize,
    in_w: usize,
    out_c: usize,
    out_h: usize,
    out_w: usize,
    kernel_h: usize,
    kernel_w: usize,
}

/// im2col convolution: each image's patches are gathered into a
/// `rows x k` scratch matrix, then one GEMM against the flattened weights
/// produces all output positions at once.
pub struct FaerConvolution2dWorkload {
    input: TensorHandle,
    weights: TensorHandle,
    bias: Option<TensorHandle>,
    output: TensorHandle,
    params: Convolution2dParams,
    dims: ConvDims,
    scratch: Mutex<Vec<f32>>,
    _lease: MemoryHandle,
}

pub fn make_convolution2d_f32(
    descriptor: &QueueDescriptor,
    memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    const KIND: LayerKind = LayerKind::Convolution2d;
    let params = descriptor.expect_params(KIND, "Convolution2d", |params| match params {
        LayerParams::Convolution2d(params) => Some(params.clone()),
        _ => None,
    })?;
    if params.layout == DataLayout::Nchw {
        return Err(FactoryError::unsupported_configuration(
            BackendId::new(BACKEND_NAME),
            KIND,
            "only NHWC activations are supported",
        ));
    }
    let expected_inputs = if params.bias_enabled { 3 } else { 2 };
    descriptor.ensure_inputs(KIND, expected_inputs)?;
    descriptor.ensure_outputs(KIND, 1)?;
    let dims = convolution_dims(descriptor, &params)?;

    // One im2col panel per image, reused across the batch.
    let rows = dims.out_h * dims.out_w;
    let k = dims.kernel_h * dims.kernel_w * dims.in_c;
    let lease = memory.acquire(rows * k * DType::F32.size_in_bytes())?;

    Ok(Box::new(FaerConvolution2dWorkload {
        input: descriptor.inputs[0].clone(),
        weights: descriptor.inputs[1].clone(),
        bias: descriptor.inputs.get(2).cloned(),
        output: descriptor.outputs[0].clone(),
        params,
        dims,
        scratch: Mutex::new(vec![0.0f32; rows * k]),
        _lease: lease,
    }))
}

fn convolution_dims(
    descriptor: &QueueDescriptor,
    params: &Convolution2dParams,
) -> Result<ConvDims, DescriptorError> {
    const KIND: LayerKind = LayerKind::Convolution2d;
    let invalid = |detail: String| DescriptorError::Invalid { kind: KIND, detail };

    if params.stride.0 == 0 || params.stride.1 == 0 {
        return Err(invalid("convolution stride must be non-zero".into()));
    }
    if params.dilation.0 == 0 || params.dilation.1 == 0 {
        return Err(invalid("convolution dilation must be non-zero".into()));
    }

    let input_shape = descriptor.inputs[0].info().shape();
    if input_shape.rank() != 4 {
        return Err(invalid(format!("input must have rank 4, got {input_shape}")));
    }
    let (batch, in_h, in_w, in_c) = (
        input_shape.dim(0),
        input_shape.dim(1),
        input_shape.dim(2),
        input_shape.dim(3),
    );

    let weight_shape = descriptor.inputs[1].info().shape();
    if weight_shape.rank() != 4 {
        return Err(invalid(format!(
            "weights must have rank 4, got {weight_shape}"
        )));
    }
    let (out_c, kernel_h, kernel_w, weight_c) = (
        weight_shape.dim(0),
        weight_shape.dim(1),
        weight_shape.dim(2),
        weight_shape.dim(3),
    );
    if kernel_h == 0 || kernel_w == 0 {
        return Err(invalid(format!(
            "convolution kernel {kernel_h}x{kernel_w} must have non-zero spatial extent"
        )));
    }
    if in_c == 0 {
        return Err(invalid("convolution input must have non-zero channels".into()));
    }
    if weight_c != in_c {
        return Err(invalid(format!(
            "weights expect {weight_c} input channels, input provides {in_c}"
        )));
    }

    let extent = |input: usize, kernel: usize, stride: usize, padding: usize, dilation: usize| {
        let effective = (kernel - 1) * dilation + 1;
        let padded = input + 2 * padding;
        if padded < effective {
            None
        } else {
            Some((padded - effective) / stride + 1)
        }
    };
    let out_h = extent(
        in_h,
        kernel_h,
        params.stride.0,
        params.padding.0,
        params.dilation.0,
    )
    .ok_or_else(|| invalid(format!("kernel height {kernel_h} exceeds padded input")))?;
    let out_w = extent(
        in_w,
        kernel_w,
        params.stride.1,
        params.padding.1,
        params.dilation.1,
    )
    .ok_or_else(|| invalid(format!("kernel width {kernel_w} exceeds padded input")))?;

    if params.bias_enabled && descriptor.inputs[2].info().element_count() != out_c {
        return Err(invalid(format!(
            "bias does not hold one value per {out_c} output channels"
        )));
    }

    let expected = [batch, out_h, out_w, out_c];
    if descriptor.outputs[0].info().shape().dims() != expected {
        return Err(invalid(format!(
            "output shape {} does not match convolved extent {expected:?}",
            descriptor.outputs[0].info().shape()
        )));
    }

    Ok(ConvDims {
        batch,
        in_c,
        in_h,
        in_w,
        out_c,
        out_h,
        out_w,
        kernel_h,
        kernel_w,
    })
}

impl FaerConvolution2dWorkload {
    fn im2col(&self, src: &[f32], image: usize, scratch: &mut [f32]) {
        let d = self.dims;
        let (sh, sw) = self.params.stride;
        let (ph, pw) = self.params.padding;
        let (dh, dw) = self.params.dilation;
        let k = d.kernel_h * d.kernel_w * d.in_c;
        let image_base = image * d.in_h * d.in_w * d.in_c;

        scratch.fill(0.0);
        for oy in 0..d.out_h {
            for ox in 0..d.out_w {
                let row = (oy * d.out_w + ox) * k;
                let y0 = (oy * sh) as isize - ph as isize;
                let x0 = (ox * sw) as isize - pw as isize;
                for ky in 0..d.kernel_h {
                    for kx in 0..d.kernel_w {
                        let y = y0 + (ky * dh) as isize;
                        let x = x0 + (kx * dw) as isize;
                        if y < 0 || x < 0 {
                            continue;
                        }
                        let (y, x) = (y as usize, x as usize);
                        if y >= d.in_h || x >= d.in_w {
                            continue;
                        }
                        let src_base = image_base + (y * d.in_w + x) * d.in_c;
                        let dst_base = row + (ky * d.kernel_w + kx) * d.in_c;
                        scratch[dst_base..dst_base + d.in_c]
                            .copy_from_slice(&src[src_base..src_base + d.in_c]);
                    }
                }
            }
        }
    }
}

impl Workload for FaerConvolution2dWorkload {
    fn kind(&self) -> LayerKind {
        LayerKind::Convolution2d
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        const KIND: LayerKind = LayerKind::Convolution2d;
        let d = self.dims;
        let rows = d.out_h * d.out_w;
        let k = d.kernel_h * d.kernel_w * d.in_c;
        let par = faer_parallelism();

        let input_guard = self.input.read();
        let weights_guard = self.weights.read();
        let src = f32_slice(KIND, &input_guard)?;
        let weights = f32_slice(KIND, &weights_guard)?;

        let mut scratch = self.scratch.lock().unwrap();
        let mut dst = vec![0.0f32; d.batch * rows * d.out_c];
        if rows > 0 && d.out_c > 0 {
            // Weights [out_c, kh, kw, in_c] flatten row-major to [out_c, k].
            let w = MatRef::from_row_major_slice(weights, d.out_c, k);
            for image in 0..d.batch {
                self.im2col(src, image, &mut scratch[..]);
                let patches = MatRef::from_row_major_slice(&scratch[..rows * k], rows, k);
                let chunk = &mut dst[image * rows * d.out_c..(image + 1) * rows * d.out_c];
                let out_view = MatMut::from_column_major_slice_mut(chunk, d.out_c, rows);
                matmul(out_view, Accum::Replace, w, patches.transpose(), 1.0f32, par);
            }
        }
        drop(input_guard);
        drop(weights_guard);
        drop(scratch);

        if let Some(bias) = &self.bias {
            let bias_guard = bias.read();
            let bias = f32_slice(KIND, &bias_guard)?;
            for position in dst.chunks_exact_mut(d.out_c) {
                for (value, b) in position.iter_mut().zip(bias) {
                    *value += b;
                }
            }
        }

        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}
