//! Data-movement workloads: MemCopy, Reshape and Permute.
//!
//! MemCopy and Reshape are dtype-agnostic buffer copies (a reshape changes
//! only the shape metadata, which lives on the output handle already).
//! Permute reorders dimensions according to a source-to-destination mapping.

use weft::descriptor::{DescriptorError, LayerParams, QueueDescriptor};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{TensorData, TensorHandle, TensorShape};
use weft::workload::Workload;

pub struct RefCopyWorkload {
    kind: LayerKind,
    input: TensorHandle,
    output: TensorHandle,
}

fn make_copy(
    kind: LayerKind,
    descriptor: &QueueDescriptor,
) -> Result<Box<dyn Workload>, FactoryError> {
    descriptor.ensure_inputs(kind, 1)?;
    descriptor.ensure_outputs(kind, 1)?;
    let input = &descriptor.inputs[0];
    let output = &descriptor.outputs[0];
    if input.info().dtype() != output.info().dtype() {
        return Err(DescriptorError::Invalid {
            kind,
            detail: format!(
                "input dtype {} does not match output dtype {}",
                input.info().dtype(),
                output.info().dtype()
            ),
        }
        .into());
    }
    if input.info().element_count() != output.info().element_count() {
        return Err(DescriptorError::Invalid {
            kind,
            detail: format!(
                "input {} and output {} hold different element counts",
                input.info().shape(),
                output.info().shape()
            ),
        }
        .into());
    }
    Ok(Box::new(RefCopyWorkload {
        kind,
        input: input.clone(),
        output: output.clone(),
    }))
}

pub fn make_mem_copy(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    make_copy(LayerKind::MemCopy, descriptor)
}

pub fn make_reshape(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    const KIND: LayerKind = LayerKind::Reshape;
    let target_shape = descriptor.expect_params(KIND, "Reshape", |params| match params {
        LayerParams::Reshape { target_shape } => Some(target_shape.clone()),
        _ => None,
    })?;
    descriptor.ensure_outputs(KIND, 1)?;
    if descriptor.outputs[0].info().shape() != &target_shape {
        return Err(DescriptorError::Invalid {
            kind: KIND,
            detail: format!(
                "target shape {target_shape} does not match output shape {}",
                descriptor.outputs[0].info().shape()
            ),
        }
        .into());
    }
    make_copy(KIND, descriptor)
}

impl Workload for RefCopyWorkload {
    fn kind(&self) -> LayerKind {
        self.kind
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let data = self.input.read().clone();
        *self.output.write() = data;
        Ok(())
    }
}

pub struct RefPermuteWorkload {
    input: TensorHandle,
    output: TensorHandle,
    mappings: Vec<usize>,
    source_shape: TensorShape,
}

/// `mappings[i]` names the destination dimension that source dimension `i`
/// moves to.
pub fn make_permute(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    const KIND: LayerKind = LayerKind::Permute;
    descriptor.ensure_inputs(KIND, 1)?;
    descriptor.ensure_outputs(KIND, 1)?;
    let mappings = descriptor.expect_params(KIND, "Permute", |params| match params {
        LayerParams::Permute { mappings } => Some(mappings.clone()),
        _ => None,
    })?;

    let invalid = |detail: String| DescriptorError::Invalid { kind: KIND, detail };

    let input = &descriptor.inputs[0];
    let output = &descriptor.outputs[0];
    if input.info().dtype() != output.info().dtype() {
        return Err(invalid(format!(
            "input dtype {} does not match output dtype {}",
            input.info().dtype(),
            output.info().dtype()
        ))
        .into());
    }

    let source_shape = input.info().shape().clone();
    let rank = source_shape.rank();
    if mappings.len() != rank {
        return Err(invalid(format!(
            "mapping lists {} dimensions for a rank-{rank} tensor",
            mappings.len()
        ))
        .into());
    }
    let mut seen = vec![false; rank];
    for &dst in &mappings {
        if dst >= rank || seen[dst] {
            return Err(invalid(format!("mapping {mappings:?} is not a permutation")).into());
        }
        seen[dst] = true;
    }

    let mut expected = vec![0usize; rank];
    for (src_dim, &dst_dim) in mappings.iter().enumerate() {
        expected[dst_dim] = source_shape.dim(src_dim);
    }
    if output.info().shape().dims() != expected.as_slice() {
        return Err(invalid(format!(
            "output shape {} does not match permuted shape {expected:?}",
            output.info().shape()
        ))
        .into());
    }

    Ok(Box::new(RefPermuteWorkload {
        input: input.clone(),
        output: output.clone(),
        mappings,
        source_shape,
    }))
}

fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

fn permute_into<T: Copy + Default>(
    src: &[T],
    source_dims: &[usize],
    mappings: &[usize],
) -> Vec<T> {
    let rank = source_dims.len();
    let mut dest_dims = vec![0usize; rank];
    for (src_dim, &dst_dim) in mappings.iter().enumerate() {
        dest_dims[dst_dim] = source_dims[src_dim];
    }
    let dest_strides = row_major_strides(&dest_dims);

    let mut dst = vec![T::default(); src.len()];
    let mut coords = vec![0usize; rank];
    for &value in src {
        let mut offset = 0usize;
        for (src_dim, &coord) in coords.iter().enumerate() {
            offset += coord * dest_strides[mappings[src_dim]];
        }
        dst[offset] = value;

        for dim in (0..rank).rev() {
            coords[dim] += 1;
            if coords[dim] < source_dims[dim] {
                break;
            }
            coords[dim] = 0;
        }
    }
    dst
}

impl Workload for RefPermuteWorkload {
    fn kind(&self) -> LayerKind {
        LayerKind::Permute
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let dims = self.source_shape.dims();
        let input = self.input.read();
        let permuted = match &*input {
            TensorData::F32(src) => TensorData::F32(permute_into(src, dims, &self.mappings)),
            TensorData::Si32(src) => TensorData::Si32(permute_into(src, dims, &self.mappings)),
            TensorData::QAsymmU8(src) => {
                TensorData::QAsymmU8(permute_into(src, dims, &self.mappings))
            }
            TensorData::F16(src) => TensorData::F16(permute_into(src, dims, &self.mappings)),
        };
        drop(input);
        *self.output.write() = permuted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permute_transposes_a_matrix() {
        // [2, 3] -> [3, 2] with mapping (0 -> 1, 1 -> 0).
        let src = [1, 2, 3, 4, 5, 6];
        let dst = permute_into(&src, &[2, 3], &[1, 0]);
        assert_eq!(dst, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn permute_nhwc_to_nchw() {
        // [1, 2, 2, 3] NHWC -> [1, 3, 2, 2] NCHW: N->N, H->2, W->3, C->1.
        let src: Vec<i32> = (0..12).collect();
        let dst = permute_into(&src, &[1, 2, 2, 3], &[0, 2, 3, 1]);
        assert_eq!(dst, vec![0, 3, 6, 9, 1, 4, 7, 10, 2, 5, 8, 11]);
    }
}
