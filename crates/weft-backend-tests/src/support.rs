//! Tensor construction and comparison helpers shared by backend tests.

use weft::tensor::{DType, QuantizationInfo, TensorData, TensorHandle, TensorInfo, TensorShape};

pub fn f32_tensor(dims: &[usize], values: Vec<f32>) -> TensorHandle {
    TensorHandle::from_data(
        TensorInfo::new(TensorShape::new(dims), DType::F32),
        TensorData::F32(values),
    )
    .expect("valid f32 tensor")
}

pub fn f32_output(dims: &[usize]) -> TensorHandle {
    TensorHandle::zeroed(TensorInfo::new(TensorShape::new(dims), DType::F32))
        .expect("valid f32 output tensor")
}

pub fn si32_tensor(dims: &[usize], values: Vec<i32>) -> TensorHandle {
    TensorHandle::from_data(
        TensorInfo::new(TensorShape::new(dims), DType::Si32),
        TensorData::Si32(values),
    )
    .expect("valid i32 tensor")
}

pub fn si32_output(dims: &[usize]) -> TensorHandle {
    TensorHandle::zeroed(TensorInfo::new(TensorShape::new(dims), DType::Si32))
        .expect("valid i32 output tensor")
}

pub fn qasymm_u8_tensor(
    dims: &[usize],
    quantization: QuantizationInfo,
    values: Vec<u8>,
) -> TensorHandle {
    TensorHandle::from_data(
        TensorInfo::new(TensorShape::new(dims), DType::QAsymmU8).with_quantization(quantization),
        TensorData::QAsymmU8(values),
    )
    .expect("valid quantized tensor")
}

pub fn qasymm_u8_output(dims: &[usize], quantization: QuantizationInfo) -> TensorHandle {
    TensorHandle::zeroed(
        TensorInfo::new(TensorShape::new(dims), DType::QAsymmU8).with_quantization(quantization),
    )
    .expect("valid quantized output tensor")
}

pub fn read_f32(handle: &TensorHandle) -> Vec<f32> {
    handle
        .read()
        .as_f32()
        .expect("tensor holds f32 data")
        .to_vec()
}

pub fn read_qasymm_u8(handle: &TensorHandle) -> Vec<u8> {
    handle
        .read()
        .as_qasymm_u8()
        .expect("tensor holds u8 data")
        .to_vec()
}

/// Elementwise comparison with an absolute tolerance, reporting the first
/// diverging index.
pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "values diverge at index {i}: {a} vs {e} (tolerance {tolerance})"
        );
    }
}
