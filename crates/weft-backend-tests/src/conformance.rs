//! Conformance checks shared by every backend.
//!
//! Each check takes a factory, skips quietly when the backend's profile does
//! not cover the combination under test, and asserts reference semantics
//! otherwise. Backends instantiate the full suite with
//! [`crate::define_backend_conformance`].

use weft::descriptor::{LayerParams, QueueDescriptor};
use weft::factory::WorkloadFactory;
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::DType;

use crate::support::{assert_close, f32_output, f32_tensor, read_f32};

const TOLERANCE: f32 = 1e-5;

fn scratch() -> MemoryManager {
    MemoryManager::new(16 * 1024 * 1024)
}

fn supports(factory: &dyn WorkloadFactory, kind: LayerKind, dtype: DType) -> bool {
    factory.capability_profile().supports(kind, dtype)
}

pub fn softmax_f32_normalizes_rows(factory: &dyn WorkloadFactory) {
    if !supports(factory, LayerKind::Softmax, DType::F32) {
        return;
    }
    let input = f32_tensor(&[1, 3], vec![1.0, 2.0, 3.0]);
    let output = f32_output(&[1, 3]);
    let descriptor = QueueDescriptor::new(
        vec![input],
        vec![output.clone()],
        LayerParams::Softmax { beta: 1.0 },
    );
    let workload = factory
        .create_workload(LayerKind::Softmax, &descriptor, &scratch())
        .expect("softmax f32 supported");
    workload.execute().expect("softmax executes");

    let result = read_f32(&output);
    assert_close(&result, &[0.090_030_57, 0.244_728_48, 0.665_240_96], TOLERANCE);
    let sum: f32 = result.iter().sum();
    assert!((sum - 1.0).abs() < TOLERANCE);
}

pub fn addition_f32_adds_elementwise(factory: &dyn WorkloadFactory) {
    if !supports(factory, LayerKind::Addition, DType::F32) {
        return;
    }
    let lhs = f32_tensor(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let rhs = f32_tensor(&[2, 2], vec![10.0, 20.0, 30.0, 40.0]);
    let output = f32_output(&[2, 2]);
    let descriptor = QueueDescriptor::new(vec![lhs, rhs], vec![output.clone()], LayerParams::None);
    let workload = factory
        .create_workload(LayerKind::Addition, &descriptor, &scratch())
        .expect("addition f32 supported");
    workload.execute().expect("addition executes");
    assert_close(&read_f32(&output), &[11.0, 22.0, 33.0, 44.0], TOLERANCE);
}

pub fn multiplication_f32_multiplies_elementwise(factory: &dyn WorkloadFactory) {
    if !supports(factory, LayerKind::Multiplication, DType::F32) {
        return;
    }
    let lhs = f32_tensor(&[4], vec![1.5, -2.0, 0.0, 3.0]);
    let rhs = f32_tensor(&[4], vec![2.0, 2.0, 5.0, -1.0]);
    let output = f32_output(&[4]);
    let descriptor = QueueDescriptor::new(vec![lhs, rhs], vec![output.clone()], LayerParams::None);
    let workload = factory
        .create_workload(LayerKind::Multiplication, &descriptor, &scratch())
        .expect("multiplication f32 supported");
    workload.execute().expect("multiplication executes");
    assert_close(&read_f32(&output), &[3.0, -4.0, 0.0, -3.0], TOLERANCE);
}

pub fn fully_connected_f32_matches_reference(factory: &dyn WorkloadFactory) {
    if !supports(factory, LayerKind::FullyConnected, DType::F32) {
        return;
    }
    // [1, 2] x [3, 2]^T + bias -> [1, 3]
    let input = f32_tensor(&[1, 2], vec![1.0, 2.0]);
    let weights = f32_tensor(&[3, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let bias = f32_tensor(&[3], vec![0.5, -0.5, 0.0]);
    let output = f32_output(&[1, 3]);
    let descriptor = QueueDescriptor::new(
        vec![input, weights, bias],
        vec![output.clone()],
        LayerParams::FullyConnected(weft::descriptor::FullyConnectedParams {
            bias_enabled: true,
            transpose_weight_matrix: false,
        }),
    );
    let workload = factory
        .create_workload(LayerKind::FullyConnected, &descriptor, &scratch())
        .expect("fully connected f32 supported");
    workload.execute().expect("fully connected executes");
    assert_close(&read_f32(&output), &[1.5, 1.5, 3.0], TOLERANCE);
}

pub fn convolution2d_f32_matches_reference(factory: &dyn WorkloadFactory) {
    if !supports(factory, LayerKind::Convolution2d, DType::F32) {
        return;
    }
    // 3x3 single-channel image, 2x2 kernel of ones: each output is the sum
    // of a 2x2 patch.
    let input = f32_tensor(
        &[1, 3, 3, 1],
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
    );
    let weights = f32_tensor(&[1, 2, 2, 1], vec![1.0; 4]);
    let output = f32_output(&[1, 2, 2, 1]);
    let descriptor = QueueDescriptor::new(
        vec![input, weights],
        vec![output.clone()],
        LayerParams::Convolution2d(weft::descriptor::Convolution2dParams::default()),
    );
    let workload = factory
        .create_workload(LayerKind::Convolution2d, &descriptor, &scratch())
        .expect("convolution f32 supported");
    workload.execute().expect("convolution executes");
    assert_close(&read_f32(&output), &[12.0, 16.0, 24.0, 28.0], TOLERANCE);
}

pub fn declines_uncovered_combination(factory: &dyn WorkloadFactory) {
    // No backend covers LSTM.
    assert!(!supports(factory, LayerKind::Lstm, DType::F32));
    let input = f32_tensor(&[1, 4], vec![0.0; 4]);
    let output = f32_output(&[1, 4]);
    let descriptor = QueueDescriptor::new(vec![input], vec![output], LayerParams::None);
    let err = match factory.create_workload(LayerKind::Lstm, &descriptor, &scratch()) {
        Ok(_) => panic!("uncovered combination must be declined"),
        Err(err) => err,
    };
    assert!(err.is_not_supported(), "expected NotSupported, got {err}");
}

/// Instantiates the conformance suite for one backend.
#[macro_export]
macro_rules! define_backend_conformance {
    ($module:ident, $factory_ctor:expr) => {
        mod $module {
            use super::*;

            use $crate::conformance;

            macro_rules! conformance_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        let factory = ($factory_ctor)();
                        conformance::$name(&factory);
                    }
                };
            }

            conformance_test!(softmax_f32_normalizes_rows);
            conformance_test!(addition_f32_adds_elementwise);
            conformance_test!(multiplication_f32_multiplies_elementwise);
            conformance_test!(fully_connected_f32_matches_reference);
            conformance_test!(convolution2d_f32_matches_reference);
            conformance_test!(declines_uncovered_combination);
        }
    };
}
