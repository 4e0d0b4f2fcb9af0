//! 2D pooling (max and average), float32, NHWC and NCHW.

use weft::descriptor::{
    DescriptorError, LayerParams, Pooling2dParams, PoolingAlgorithm, QueueDescriptor,
};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{DataLayout, TensorData, TensorHandle};
use weft::workload::Workload;

use super::f32_slice;

const KIND: LayerKind = LayerKind::Pooling2d;

#[derive(Clone, Copy)]
struct Dims {
    batch: usize,
    channels: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

pub struct RefPooling2dFloat32Workload {
    input: TensorHandle,
    output: TensorHandle,
    params: Pooling2dParams,
    dims: Dims,
}

fn pooled_extent(input: usize, window: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = input + 2 * padding;
    if padded < window {
        return None;
    }
    Some((padded - window) / stride + 1)
}

pub fn make_pooling2d_f32(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    descriptor.ensure_inputs(KIND, 1)?;
    descriptor.ensure_outputs(KIND, 1)?;
    let params = descriptor.expect_params(KIND, "Pooling2d", |params| match params {
        LayerParams::Pooling2d(params) => Some(params.clone()),
        _ => None,
    })?;
    let dims = validate_shapes(descriptor, &params)?;
    Ok(Box::new(RefPooling2dFloat32Workload {
        input: descriptor.inputs[0].clone(),
        output: descriptor.outputs[0].clone(),
        params,
        dims,
    }))
}

fn validate_shapes(
    descriptor: &QueueDescriptor,
    params: &Pooling2dParams,
) -> Result<Dims, DescriptorError> {
    let invalid = |detail: String| DescriptorError::Invalid { kind: KIND, detail };

    if params.window.0 == 0 || params.window.1 == 0 {
        return Err(invalid("pooling window must be non-zero".into()));
    }
    if params.stride.0 == 0 || params.stride.1 == 0 {
        return Err(invalid("pooling stride must be non-zero".into()));
    }

    let input_shape = descriptor.inputs[0].info().shape();
    if input_shape.rank() != 4 {
        return Err(invalid(format!(
            "input must have rank 4, got {input_shape}"
        )));
    }
    let (batch, in_h, in_w, channels) = match params.layout {
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

    let out_h = pooled_extent(in_h, params.window.0, params.stride.0, params.padding.0)
        .ok_or_else(|| invalid(format!("window {} exceeds padded height", params.window.0)))?;
    let out_w = pooled_extent(in_w, params.window.1, params.stride.1, params.padding.1)
        .ok_or_else(|| invalid(format!("window {} exceeds padded width", params.window.1)))?;

    let expected = match params.layout {
        DataLayout::Nhwc => vec![batch, out_h, out_w, channels],
        DataLayout::Nchw => vec![batch, channels, out_h, out_w],
    };
    let output_shape = descriptor.outputs[0].info().shape();
    if output_shape.dims() != expected.as_slice() {
        return Err(invalid(format!(
            "output shape {output_shape} does not match pooled extent {expected:?}"
        )));
    }

    Ok(Dims {
        batch,
        channels,
        in_h,
        in_w,
        out_h,
        out_w,
    })
}

impl RefPooling2dFloat32Workload {
    fn index(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
        let d = self.dims;
        match self.params.layout {
            DataLayout::Nhwc => ((b * d.in_h + y) * d.in_w + x) * d.channels + c,
            DataLayout::Nchw => ((b * d.channels + c) * d.in_h + y) * d.in_w + x,
        }
    }

    fn out_index(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
        let d = self.dims;
        match self.params.layout {
            DataLayout::Nhwc => ((b * d.out_h + y) * d.out_w + x) * d.channels + c,
            DataLayout::Nchw => ((b * d.channels + c) * d.out_h + y) * d.out_w + x,
        }
    }
}

impl Workload for RefPooling2dFloat32Workload {
    fn kind(&self) -> LayerKind {
        KIND
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let d = self.dims;
        let (wh, ww) = self.params.window;
        let (sh, sw) = self.params.stride;
        let (ph, pw) = self.params.padding;

        let input = self.input.read();
        let src = f32_slice(KIND, &input)?;
        let mut dst = vec![0.0f32; d.batch * d.channels * d.out_h * d.out_w];
        for b in 0..d.batch {
            for c in 0..d.channels {
                for oy in 0..d.out_h {
                    for ox in 0..d.out_w {
                        let y0 = (oy * sh) as isize - ph as isize;
                        let x0 = (ox * sw) as isize - pw as isize;
                        let mut max = f32::NEG_INFINITY;
                        let mut sum = 0.0f32;
                        // Padding elements are ignored rather than treated
                        // as zeros, so the average divides by the count of
                        // in-bounds taps.
                        let mut count = 0usize;
                        for ky in 0..wh {
                            for kx in 0..ww {
                                let y = y0 + ky as isize;
                                let x = x0 + kx as isize;
                                if y < 0 || x < 0 {
                                    continue;
                                }
                                let (y, x) = (y as usize, x as usize);
                                if y >= d.in_h || x >= d.in_w {
                                    continue;
                                }
                                let v = src[self.index(b, y, x, c)];
                                max = max.max(v);
                                sum += v;
                                count += 1;
                            }
                        }
                        dst[self.out_index(b, oy, ox, c)] = match self.params.pool {
                            PoolingAlgorithm::Max => max,
                            PoolingAlgorithm::Average => {
                                if count == 0 {
                                    0.0
                                } else {
                                    sum / count as f32
                                }
                            }
                        };
                    }
                }
            }
        }
        drop(input);
        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}
