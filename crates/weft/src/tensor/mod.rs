//! Tensor metadata and shared tensor buffers.

mod handle;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use handle::{TensorData, TensorHandle};

/// Scalar element types supported by the core.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DType {
    F32,
    Si32,
    QAsymmU8,
    F16,
}

impl DType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::Si32 => 4,
            DType::F16 => 2,
            DType::QAsymmU8 => 1,
        }
    }

    /// Quantized dtypes must carry a scale/offset pair in their [`TensorInfo`].
    pub fn is_quantized(self) -> bool {
        matches!(self, DType::QAsymmU8)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "Float32",
            DType::Si32 => "Signed32",
            DType::QAsymmU8 => "QAsymmU8",
            DType::F16 => "Float16",
        };
        f.write_str(name)
    }
}

/// Memory layout of rank-4 image-like tensors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum DataLayout {
    #[default]
    Nhwc,
    Nchw,
}

/// Affine quantization parameters: `real = (stored - offset) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationInfo {
    pub scale: f32,
    pub offset: i32,
}

impl QuantizationInfo {
    pub fn new(scale: f32, offset: i32) -> Self {
        Self { scale, offset }
    }

    pub fn quantize(&self, value: f32) -> u8 {
        let q = (value / self.scale).round() as i32 + self.offset;
        q.clamp(0, 255) as u8
    }

    pub fn dequantize(&self, value: u8) -> f32 {
        (value as i32 - self.offset) as f32 * self.scale
    }
}

/// Ordered tensor dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.0[axis]
    }

    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .0
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        write!(f, "[{dims}]")
    }
}

/// Full tensor metadata: shape, element type, layout, and quantization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    shape: TensorShape,
    dtype: DType,
    layout: DataLayout,
    quantization: Option<QuantizationInfo>,
}

impl TensorInfo {
    pub fn new(shape: TensorShape, dtype: DType) -> Self {
        Self {
            shape,
            dtype,
            layout: DataLayout::default(),
            quantization: None,
        }
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_quantization(mut self, quantization: QuantizationInfo) -> Self {
        self.quantization = Some(quantization);
        self
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    pub fn quantization(&self) -> Option<QuantizationInfo> {
        self.quantization
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size_in_bytes()
    }

    /// Checks the internal consistency rules: quantized dtypes must carry
    /// quantization parameters.
    pub fn validate(&self) -> Result<(), TensorError> {
        if self.dtype.is_quantized() && self.quantization.is_none() {
            return Err(TensorError::MissingQuantization { dtype: self.dtype });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("{dtype} tensors require quantization parameters")]
    MissingQuantization { dtype: DType },
    #[error("tensor data is {actual} but the descriptor declares {expected}")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("tensor data holds {actual} elements but the shape implies {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_round_trips_representable_values() {
        let q = QuantizationInfo::new(0.5, 10);
        assert_eq!(q.quantize(0.0), 10);
        assert_eq!(q.quantize(2.5), 15);
        assert_eq!(q.dequantize(15), 2.5);
        // Saturation at the u8 range ends.
        assert_eq!(q.quantize(1000.0), 255);
        assert_eq!(q.quantize(-1000.0), 0);
    }

    #[test]
    fn quantized_info_requires_parameters() {
        let info = TensorInfo::new(TensorShape::new([1, 3]), DType::QAsymmU8);
        assert_eq!(
            info.validate(),
            Err(TensorError::MissingQuantization {
                dtype: DType::QAsymmU8
            })
        );
        let info = info.with_quantization(QuantizationInfo::new(1.0 / 256.0, 0));
        assert!(info.validate().is_ok());
    }

    #[test]
    fn shape_accessors() {
        let shape = TensorShape::new([2, 3, 4]);
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape.element_count(), 24);
        assert_eq!(shape.to_string(), "[2x3x4]");
    }
}
