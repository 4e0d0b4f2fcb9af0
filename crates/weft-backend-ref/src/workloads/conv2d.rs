//! Direct 2D convolution, float32, NHWC and NCHW.
//!
//! Weights follow the activation layout: `[out_c, kh, kw, in_c]` for NHWC
//! and `[out_c, in_c, kh, kw]` for NCHW.

use weft::descriptor::{Convolution2dParams, DescriptorError, LayerParams, QueueDescriptor};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{DataLayout, TensorData, TensorHandle};
use weft::workload::Workload;

use super::f32_slice;

const KIND: LayerKind = LayerKind::Convolution2d;

#[derive(Clone, Copy)]
pub(crate) struct ConvDims {
    pub batch: usize,
    pub in_c: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub out_c: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
}

pub struct RefConvolution2dFloat32Workload {
    input: TensorHandle,
    weights: TensorHandle,
    bias: Option<TensorHandle>,
    output: TensorHandle,
    params: Convolution2dParams,
    dims: ConvDims,
}

fn conv_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    let effective = (kernel - 1) * dilation + 1;
    let padded = input + 2 * padding;
    if padded < effective {
        return None;
    }
    Some((padded - effective) / stride + 1)
}

pub fn make_convolution2d_f32(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    let params = descriptor.expect_params(KIND, "Convolution2d", |params| match params {
        LayerParams::Convolution2d(params) => Some(params.clone()),
        _ => None,
    })?;
    let expected_inputs = if params.bias_enabled { 3 } else { 2 };
    descriptor.ensure_inputs(KIND, expected_inputs)?;
    descriptor.ensure_outputs(KIND, 1)?;
    let dims = validate_shapes(descriptor, &params)?;
    Ok(Box::new(RefConvolution2dFloat32Workload {
        input: descriptor.inputs[0].clone(),
        weights: descriptor.inputs[1].clone(),
        bias: descriptor.inputs.get(2).cloned(),
        output: descriptor.outputs[0].clone(),
        params,
        dims,
    }))
}

pub(crate) fn validate_shapes(
    descriptor: &QueueDescriptor,
    params: &Convolution2dParams,
) -> Result<ConvDims, DescriptorError> {
    let invalid = |detail: String| DescriptorError::Invalid { kind: KIND, detail };

    if params.stride.0 == 0 || params.stride.1 == 0 {
        return Err(invalid("convolution stride must be non-zero".into()));
    }
    if params.dilation.0 == 0 || params.dilation.1 == 0 {
        return Err(invalid("convolution dilation must be non-zero".into()));
    }

    let input_shape = descriptor.inputs[0].info().shape();
    if input_shape.rank() != 4 {
        return Err(invalid(format!(
            "input must have rank 4, got {input_shape}"
        )));
    }
    let (batch, in_h, in_w, in_c) = match params.layout {
        DataLayout::Nhwc => (
            input_shape.dim(0),
            input_shape.dim(1),
            input_shape.dim(2),
            input_shape.dim(3),
        ),
        DataLayout::Nchw => (
            input_shape.dim(0),
            input_shape.dim(2),
            input_shape.dim(3),
            input_shape.dim(1),
        ),
    };

    let weight_shape = descriptor.inputs[1].info().shape();
    if weight_shape.rank() != 4 {
        return Err(invalid(format!(
            "weights must have rank 4, got {weight_shape}"
        )));
    }
    let (out_c, kernel_h, kernel_w, weight_c) = match params.layout {
        DataLayout::Nhwc => (
            weight_shape.dim(0),
            weight_shape.dim(1),
            weight_shape.dim(2),
            weight_shape.dim(3),
        ),
        DataLayout::Nchw => (
            weight_shape.dim(0),
            weight_shape.dim(2),
            weight_shape.dim(3),
            weight_shape.dim(1),
        ),
    };
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

    let out_h = conv_extent(
        in_h,
        kernel_h,
        params.stride.0,
        params.padding.0,
        params.dilation.0,
    )
    .ok_or_else(|| invalid(format!("kernel height {kernel_h} exceeds padded input")))?;
    let out_w = conv_extent(
        in_w,
        kernel_w,
        params.stride.1,
        params.padding.1,
        params.dilation.1,
    )
    .ok_or_else(|| invalid(format!("kernel width {kernel_w} exceeds padded input")))?;

    if params.bias_enabled {
        let bias_count = descriptor.inputs[2].info().element_count();
        if bias_count != out_c {
            return Err(invalid(format!(
                "bias holds {bias_count} values for {out_c} output channels"
            )));
        }
    }

    let expected = match params.layout {
        DataLayout::Nhwc => vec![batch, out_h, out_w, out_c],
        DataLayout::Nchw => vec![batch, out_c, out_h, out_w],
    };
    let output_shape = descriptor.outputs[0].info().shape();
    if output_shape.dims() != expected.as_slice() {
        return Err(invalid(format!(
            "output shape {output_shape} does not match convolved extent {expected:?}"
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

impl RefConvolution2dFloat32Workload {
    fn in_index(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
        let d = self.dims;
        match self.params.layout {
            DataLayout::Nhwc => ((b * d.in_h + y) * d.in_w + x) * d.in_c + c,
            DataLayout::Nchw => ((b * d.in_c + c) * d.in_h + y) * d.in_w + x,
        }
    }

    fn weight_index(&self, o: usize, ky: usize, kx: usize, c: usize) -> usize {
        let d = self.dims;
        match self.params.layout {
            DataLayout::Nhwc => ((o * d.kernel_h + ky) * d.kernel_w + kx) * d.in_c + c,
            DataLayout::Nchw => ((o * d.in_c + c) * d.kernel_h + ky) * d.kernel_w + kx,
        }
    }

    fn out_index(&self, b: usize, y: usize, x: usize, o: usize) -> usize {
        let d = self.dims;
        match self.params.layout {
            DataLayout::Nhwc => ((b * d.out_h + y) * d.out_w + x) * d.out_c + o,
            DataLayout::Nchw => ((b * d.out_c + o) * d.out_h + y) * d.out_w + x,
        }
    }
}

impl Workload for RefConvolution2dFloat32Workload {
    fn kind(&self) -> LayerKind {
        KIND
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let d = self.dims;
        let (sh, sw) = self.params.stride;
        let (ph, pw) = self.params.padding;
        let (dh, dw) = self.params.dilation;

        let input = self.input.read();
        let weights = self.weights.read();
        let src = f32_slice(KIND, &input)?;
        let wgt = f32_slice(KIND, &weights)?;

        let mut dst = vec![0.0f32; d.batch * d.out_c * d.out_h * d.out_w];
        for b in 0..d.batch {
            for o in 0..d.out_c {
                for oy in 0..d.out_h {
                    for ox in 0..d.out_w {
                        let y0 = (oy * sh) as isize - ph as isize;
                        let x0 = (ox * sw) as isize - pw as isize;
                        let mut acc = 0.0f32;
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
                                for c in 0..d.in_c {
                                    acc += src[self.in_index(b, y, x, c)]
                                        * wgt[self.weight_index(o, ky, kx, c)];
                                }
                            }
                        }
                        dst[self.out_index(b, oy, ox, o)] = acc;
                    }
                }
            }
        }
        drop(input);
        drop(weights);

        if let Some(bias) = &self.bias {
            let bias_guard = bias.read();
            let bias = f32_slice(KIND, &bias_guard)?;
            for b in 0..d.batch {
                for o in 0..d.out_c {
                    for oy in 0..d.out_h {
                        for ox in 0..d.out_w {
                            dst[self.out_index(b, oy, ox, o)] += bias[o];
                        }
                    }
                }
            }
        }

        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}
