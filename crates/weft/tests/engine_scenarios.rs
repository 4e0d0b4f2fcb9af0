//! End-to-end graph compilation and execution scenarios across backends.

use weft::capability::BackendId;
use weft::descriptor::{Convolution2dParams, LayerParams, QueueDescriptor};
use weft::engine::ExecutionEngine;
use weft::factory::WorkloadFactory;
use weft::graph::Graph;
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{DType, QuantizationInfo, TensorData};
use weft_backend_faer::FaerWorkloadFactory;
use weft_backend_tests::support::{
    assert_close, f32_output, f32_tensor, qasymm_u8_output, qasymm_u8_tensor, read_f32,
};
use weft_backend_tests::{register_mock_backend, MockKernelLibrary};

fn register_backends() {
    weft_backend_ref::register_ref_backend();
    weft_backend_faer::register_faer_backend();
}

#[test]
fn quantized_softmax_is_declined_where_unsupported_and_served_elsewhere() {
    register_backends();

    // faer carries no softmax entry at all, so the quantized descriptor is
    // declined recoverably.
    let faer = FaerWorkloadFactory::new();
    let quantization = QuantizationInfo::new(1.0 / 256.0, 0);
    let quantized = QueueDescriptor::new(
        vec![qasymm_u8_tensor(&[1, 4], quantization, vec![1, 2, 3, 4])],
        vec![qasymm_u8_output(&[1, 4], quantization)],
        LayerParams::Softmax { beta: 1.0 },
    );
    let err = match faer.create_workload(LayerKind::Softmax, &quantized, &MemoryManager::new(1024))
    {
        Ok(_) => panic!("faer has no softmax"),
        Err(err) => err,
    };
    assert!(err.is_not_supported());

    // The same graph runs once the engine may fall back to ref.
    let output = f32_output(&[1, 4]);
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Softmax,
        QueueDescriptor::new(
            vec![f32_tensor(&[1, 4], vec![0.5, 1.5, 2.5, 3.5])],
            vec![output.clone()],
            LayerParams::Softmax { beta: 1.0 },
        ),
        "faer",
    );
    let engine = ExecutionEngine::new().with_fallbacks(vec![BackendId::new("ref")]);
    let loaded = engine.load_graph(&graph).expect("ref serves softmax");
    loaded.execute().expect("softmax executes");

    let probabilities = read_f32(&output);
    let sum: f32 = probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert!(probabilities.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn chained_nodes_execute_in_dependency_order() {
    register_backends();

    let lhs = f32_tensor(&[1, 3], vec![1.0, 2.0, 3.0]);
    let rhs = f32_tensor(&[1, 3], vec![0.5, 0.5, 0.5]);
    let intermediate = f32_output(&[1, 3]);
    let output = f32_output(&[1, 3]);

    // Insert the consumer before the producer; buffer identity still forces
    // the addition to run first.
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Softmax,
        QueueDescriptor::new(
            vec![intermediate.clone()],
            vec![output.clone()],
            LayerParams::Softmax { beta: 1.0 },
        ),
        "ref",
    );
    graph.add_node(
        LayerKind::Addition,
        QueueDescriptor::new(vec![lhs, rhs], vec![intermediate.clone()], LayerParams::None),
        "ref",
    );

    let loaded = ExecutionEngine::new().load_graph(&graph).expect("compiles");
    loaded.execute().expect("executes");

    assert_close(&read_f32(&intermediate), &[1.5, 2.5, 3.5], 1e-6);
    // Softmax of [1.5, 2.5, 3.5] equals softmax of [1, 2, 3].
    assert_close(
        &read_f32(&output),
        &[0.090_030_57, 0.244_728_48, 0.665_240_96],
        1e-5,
    );
}

#[test]
fn rewriting_inputs_requires_no_rebuild() {
    register_backends();

    let input = f32_tensor(&[1, 2], vec![1.0, 1.0]);
    let output = f32_output(&[1, 2]);
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Softmax,
        QueueDescriptor::new(
            vec![input.clone()],
            vec![output.clone()],
            LayerParams::Softmax { beta: 1.0 },
        ),
        "ref",
    );
    let loaded = ExecutionEngine::new().load_graph(&graph).expect("compiles");

    loaded.execute().expect("first run");
    assert_close(&read_f32(&output), &[0.5, 0.5], 1e-6);

    *input.write() = TensorData::F32(vec![0.0, 100.0]);
    loaded.execute().expect("second run");
    let rerun = read_f32(&output);
    assert!(rerun[0] < 1e-6 && (rerun[1] - 1.0).abs() < 1e-6);
}

#[test]
fn repeated_execution_is_deterministic() {
    register_backends();

    let output = f32_output(&[2, 4]);
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Softmax,
        QueueDescriptor::new(
            vec![f32_tensor(
                &[2, 4],
                vec![0.1, -0.2, 0.3, 1.7, -3.0, 0.0, 2.2, 0.4],
            )],
            vec![output.clone()],
            LayerParams::Softmax { beta: 2.0 },
        ),
        "ref",
    );
    let loaded = ExecutionEngine::new().load_graph(&graph).expect("compiles");

    loaded.execute().expect("first run");
    let first = read_f32(&output);
    loaded.execute().expect("second run");
    assert_eq!(first, read_f32(&output));
}

#[test]
fn graph_teardown_releases_all_scratch() {
    register_backends();

    // The faer convolution leases an im2col panel from its backend pool.
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Convolution2d,
        QueueDescriptor::new(
            vec![
                f32_tensor(&[1, 4, 4, 2], vec![1.0; 32]),
                f32_tensor(&[3, 2, 2, 2], vec![0.5; 24]),
            ],
            vec![f32_output(&[1, 3, 3, 3])],
            LayerParams::Convolution2d(Convolution2dParams::default()),
        ),
        "faer",
    );
    let loaded = ExecutionEngine::new().load_graph(&graph).expect("compiles");

    let pool = loaded
        .memory_manager(&BackendId::new("faer"))
        .expect("faer participated");
    assert!(pool.outstanding_bytes() > 0);
    loaded.execute().expect("executes");
    drop(loaded);
    assert_eq!(pool.outstanding_bytes(), 0);
}

#[test]
fn declined_nodes_fall_back_in_configured_order() {
    register_backends();

    let conv_out = f32_output(&[1, 3, 3, 3]);
    let mut graph = Graph::new();
    // GEMM-shaped node: faer keeps it.
    graph.add_node(
        LayerKind::Convolution2d,
        QueueDescriptor::new(
            vec![
                f32_tensor(&[1, 4, 4, 2], vec![1.0; 32]),
                f32_tensor(&[3, 2, 2, 2], vec![0.5; 24]),
            ],
            vec![conv_out.clone()],
            LayerParams::Convolution2d(Convolution2dParams::default()),
        ),
        "faer",
    );
    // Pointwise node: faer declines, ref picks it up.
    graph.add_node(
        LayerKind::Addition,
        QueueDescriptor::new(
            vec![conv_out.clone(), conv_out.clone()],
            vec![f32_output(&[1, 3, 3, 3])],
            LayerParams::None,
        ),
        "faer",
    );

    let engine = ExecutionEngine::new().with_fallbacks(vec![BackendId::new("ref")]);
    let loaded = engine.load_graph(&graph).expect("compiles with fallback");
    let placements: Vec<(usize, String)> = loaded
        .placements()
        .map(|(node, backend)| (node, backend.to_string()))
        .collect();
    assert_eq!(
        placements,
        vec![(0, "faer".to_string()), (1, "ref".to_string())]
    );
    loaded.execute().expect("mixed-backend graph executes");
}

#[test]
fn unregistered_backend_without_fallbacks_is_an_error() {
    register_backends();

    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Addition,
        QueueDescriptor::new(
            vec![f32_tensor(&[2], vec![1.0, 2.0]), f32_tensor(&[2], vec![3.0, 4.0])],
            vec![f32_output(&[2])],
            LayerParams::None,
        ),
        "no-such-backend",
    );
    let err = match ExecutionEngine::new().load_graph(&graph) {
        Ok(_) => panic!("unknown backend must fail compilation"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        weft::error::GraphCompileError::UnknownBackend { node: 0, .. }
    ));
}

#[test]
fn no_capable_backend_reports_every_attempt() {
    register_backends();

    // No registered backend covers LSTM.
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Lstm,
        QueueDescriptor::new(
            vec![f32_tensor(&[2], vec![0.0; 2])],
            vec![f32_output(&[2])],
            LayerParams::None,
        ),
        "ref",
    );
    let err = match ExecutionEngine::new()
        .with_fallbacks(vec![BackendId::new("faer")])
        .load_graph(&graph)
    {
        Ok(_) => panic!("something claimed to serve LSTM"),
        Err(err) => err,
    };
    match err {
        weft::error::GraphCompileError::NoBackend { node, kind, attempts } => {
            assert_eq!(node, 0);
            assert_eq!(kind, LayerKind::Lstm);
            let tried: Vec<String> = attempts.iter().map(|(b, _)| b.to_string()).collect();
            assert_eq!(tried, vec!["ref".to_string(), "faer".to_string()]);
        }
        other => panic!("expected NoBackend, got {other:?}"),
    }
}

#[test]
fn mock_accelerator_records_submissions_and_propagates_failures() {
    register_backends();
    let library: MockKernelLibrary = register_mock_backend(
        "mock-gpu",
        &[
            (LayerKind::Activation, DType::F32),
            (LayerKind::Softmax, DType::F32),
        ],
    );

    let intermediate = f32_output(&[1, 3]);
    let mut graph = Graph::new();
    graph.add_node(
        LayerKind::Activation,
        QueueDescriptor::new(
            vec![f32_tensor(&[1, 3], vec![1.0, 2.0, 3.0])],
            vec![intermediate.clone()],
            LayerParams::Activation {
                function: weft::descriptor::ActivationFunction::ReLu,
                alpha: 0.0,
                beta: 0.0,
            },
        ),
        "mock-gpu",
    );
    graph.add_node(
        LayerKind::Softmax,
        QueueDescriptor::new(
            vec![intermediate],
            vec![f32_output(&[1, 3])],
            LayerParams::Softmax { beta: 1.0 },
        ),
        "mock-gpu",
    );

    let loaded = ExecutionEngine::new().load_graph(&graph).expect("compiles");
    loaded.execute().expect("mock kernels run");
    assert_eq!(
        library.executed(),
        vec![LayerKind::Activation, LayerKind::Softmax]
    );

    library.arm_failure("device lost");
    let err = loaded.execute().expect_err("armed failure propagates");
    assert_eq!(err.backend_name(), Some("mock-gpu"));
    assert!(err.to_string().contains("device lost"));

    library.disarm();
    library.clear();
    loaded.execute().expect("recovers after disarm");
    assert_eq!(
        library.executed(),
        vec![LayerKind::Activation, LayerKind::Softmax]
    );
}
