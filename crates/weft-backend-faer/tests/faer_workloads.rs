use weft::descriptor::{Convolution2dParams, FullyConnectedParams, LayerParams, QueueDescriptor};
use weft::error::FactoryError;
use weft::factory::WorkloadFactory;
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::DataLayout;
use weft_backend_faer::FaerWorkloadFactory;
use weft_backend_ref::RefWorkloadFactory;
use weft_backend_tests::support::{assert_close, f32_output, f32_tensor, read_f32};

weft_backend_tests::define_backend_conformance!(faer_conformance, FaerWorkloadFactory::new);

fn scratch() -> MemoryManager {
    MemoryManager::new(16 * 1024 * 1024)
}

/// Deterministic pseudo-random values, identical for both backends.
fn ramp(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i * 37 + 11) % 101) as f32 * 0.073 - 3.5)
        .collect()
}

fn run(
    factory: &dyn WorkloadFactory,
    kind: LayerKind,
    descriptor: &QueueDescriptor,
) -> Vec<f32> {
    let workload = factory
        .create_workload(kind, descriptor, &scratch())
        .expect("workload constructs");
    workload.execute().expect("workload executes");
    read_f32(&descriptor.outputs[0])
}

#[test]
fn fully_connected_matches_reference_backend() {
    let faer = FaerWorkloadFactory::new();
    let reference = RefWorkloadFactory::new();

    for &(batch, in_f, out_f, transpose) in
        &[(1, 5, 3, false), (4, 8, 8, false), (7, 13, 9, true)]
    {
        let weight_dims = if transpose {
            [in_f, out_f]
        } else {
            [out_f, in_f]
        };
        let make_descriptor = || {
            QueueDescriptor::new(
                vec![
                    f32_tensor(&[batch, in_f], ramp(batch * in_f)),
                    f32_tensor(&weight_dims, ramp(in_f * out_f)),
                    f32_tensor(&[out_f], ramp(out_f)),
                ],
                vec![f32_output(&[batch, out_f])],
                LayerParams::FullyConnected(FullyConnectedParams {
                    bias_enabled: true,
                    transpose_weight_matrix: transpose,
                }),
            )
        };
        let got = run(&faer, LayerKind::FullyConnected, &make_descriptor());
        let want = run(&reference, LayerKind::FullyConnected, &make_descriptor());
        assert_close(&got, &want, 1e-3);
    }
}

#[test]
fn convolution_matches_reference_backend() {
    let faer = FaerWorkloadFactory::new();
    let reference = RefWorkloadFactory::new();

    // (h, w, in_c, out_c, kernel, stride, padding, dilation)
    let cases = [
        (5, 5, 3, 4, (3, 3), (1, 1), (1, 1), (1, 1)),
        (8, 6, 2, 5, (3, 3), (2, 2), (0, 0), (1, 1)),
        (7, 7, 1, 2, (3, 3), (1, 1), (2, 2), (2, 2)),
        (4, 4, 4, 4, (1, 1), (1, 1), (0, 0), (1, 1)),
    ];
    for &(h, w, in_c, out_c, kernel, stride, padding, dilation) in &cases {
        let effective =
            |k: usize, d: usize| (k - 1) * d + 1;
        let out_h = (h + 2 * padding.0 - effective(kernel.0, dilation.0)) / stride.0 + 1;
        let out_w = (w + 2 * padding.1 - effective(kernel.1, dilation.1)) / stride.1 + 1;

        let make_descriptor = || {
            QueueDescriptor::new(
                vec![
                    f32_tensor(&[2, h, w, in_c], ramp(2 * h * w * in_c)),
                    f32_tensor(
                        &[out_c, kernel.0, kernel.1, in_c],
                        ramp(out_c * kernel.0 * kernel.1 * in_c),
                    ),
                    f32_tensor(&[out_c], ramp(out_c)),
                ],
                vec![f32_output(&[2, out_h, out_w, out_c])],
                LayerParams::Convolution2d(Convolution2dParams {
                    stride,
                    padding,
                    dilation,
                    bias_enabled: true,
                    layout: DataLayout::Nhwc,
                }),
            )
        };
        let got = run(&faer, LayerKind::Convolution2d, &make_descriptor());
        let want = run(&reference, LayerKind::Convolution2d, &make_descriptor());
        assert_close(&got, &want, 1e-3);
    }
}

#[test]
fn nchw_convolution_is_declined_as_recoverable() {
    let faer = FaerWorkloadFactory::new();
    let descriptor = QueueDescriptor::new(
        vec![
            f32_tensor(&[1, 2, 4, 4], ramp(32)),
            f32_tensor(&[3, 2, 2, 2], ramp(24)),
        ],
        vec![f32_output(&[1, 3, 3, 3])],
        LayerParams::Convolution2d(Convolution2dParams {
            layout: DataLayout::Nchw,
            ..Convolution2dParams::default()
        }),
    );
    let err = match faer.create_workload(LayerKind::Convolution2d, &descriptor, &scratch()) {
        Ok(_) => panic!("NCHW must be declined"),
        Err(err) => err,
    };
    assert!(err.is_not_supported(), "expected recoverable decline, got {err}");
    assert!(matches!(err, FactoryError::UnsupportedConfiguration { .. }));
}

#[test]
fn convolution_rejects_degenerate_kernels() {
    let faer = FaerWorkloadFactory::new();
    // Zero-height kernel: no output extent exists.
    let descriptor = QueueDescriptor::new(
        vec![
            f32_tensor(&[1, 4, 4, 2], ramp(32)),
            f32_output(&[3, 0, 2, 2]),
        ],
        vec![f32_output(&[1, 5, 3, 3])],
        LayerParams::Convolution2d(Convolution2dParams::default()),
    );
    let err = match faer.create_workload(LayerKind::Convolution2d, &descriptor, &scratch()) {
        Ok(_) => panic!("degenerate kernel must be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, FactoryError::Descriptor(_)));
}

#[test]
fn convolution_scratch_is_leased_and_released() {
    let faer = FaerWorkloadFactory::new();
    let memory = MemoryManager::new(1024 * 1024);
    let descriptor = QueueDescriptor::new(
        vec![
            f32_tensor(&[1, 4, 4, 2], ramp(32)),
            f32_tensor(&[3, 2, 2, 2], ramp(24)),
        ],
        vec![f32_output(&[1, 3, 3, 3])],
        LayerParams::Convolution2d(Convolution2dParams::default()),
    );
    let workload = faer
        .create_workload(LayerKind::Convolution2d, &descriptor, &memory)
        .expect("workload constructs");
    // 3x3 positions, 2x2x2 patch each, f32.
    assert_eq!(memory.outstanding_bytes(), 9 * 8 * 4);
    drop(workload);
    assert_eq!(memory.outstanding_bytes(), 0);
}

#[test]
fn oversized_scratch_request_fails_construction_cleanly() {
    let faer = FaerWorkloadFactory::new();
    let memory = MemoryManager::new(16);
    let descriptor = QueueDescriptor::new(
        vec![
            f32_tensor(&[1, 8, 8, 4], ramp(256)),
            f32_tensor(&[4, 3, 3, 4], ramp(144)),
        ],
        vec![f32_output(&[1, 6, 6, 4])],
        LayerParams::Convolution2d(Convolution2dParams::default()),
    );
    let err = match faer.create_workload(LayerKind::Convolution2d, &descriptor, &memory) {
        Ok(_) => panic!("pool too small, construction must fail"),
        Err(err) => err,
    };
    assert!(matches!(err, FactoryError::Memory(_)));
    assert_eq!(memory.outstanding_bytes(), 0);
}
