//! Pointwise activation functions, float32.

use weft::descriptor::{ActivationFunction, LayerParams, QueueDescriptor};
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{TensorData, TensorHandle};
use weft::workload::Workload;

use super::f32_slice;

const KIND: LayerKind = LayerKind::Activation;

fn apply(function: ActivationFunction, alpha: f32, beta: f32, x: f32) -> f32 {
    match function {
        ActivationFunction::ReLu => x.max(0.0),
        // alpha is the upper bound, beta the lower bound.
        ActivationFunction::BoundedReLu => x.max(beta).min(alpha),
        ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        ActivationFunction::TanH => alpha * (beta * x).tanh(),
        ActivationFunction::LeakyReLu => {
            if x > 0.0 {
                x
            } else {
                alpha * x
            }
        }
        ActivationFunction::Abs => x.abs(),
        ActivationFunction::Sqrt => x.sqrt(),
        ActivationFunction::Square => x * x,
        ActivationFunction::Linear => alpha * x + beta,
    }
}

pub struct RefActivationFloat32Workload {
    input: TensorHandle,
    output: TensorHandle,
    function: ActivationFunction,
    alpha: f32,
    beta: f32,
}

pub fn make_activation_f32(
    descriptor: &QueueDescriptor,
    _memory: &MemoryManager,
) -> Result<Box<dyn Workload>, FactoryError> {
    descriptor.ensure_inputs(KIND, 1)?;
    descriptor.ensure_outputs(KIND, 1)?;
    descriptor.ensure_same_shape(KIND, &descriptor.inputs[0], &descriptor.outputs[0])?;
    let (function, alpha, beta) =
        descriptor.expect_params(KIND, "Activation", |params| match params {
            LayerParams::Activation {
                function,
                alpha,
                beta,
            } => Some((*function, *alpha, *beta)),
            _ => None,
        })?;
    Ok(Box::new(RefActivationFloat32Workload {
        input: descriptor.inputs[0].clone(),
        output: descriptor.outputs[0].clone(),
        function,
        alpha,
        beta,
    }))
}

impl Workload for RefActivationFloat32Workload {
    fn kind(&self) -> LayerKind {
        KIND
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let input = self.input.read();
        let src = f32_slice(KIND, &input)?;
        let dst: Vec<f32> = src
            .iter()
            .map(|&x| apply(self.function, self.alpha, self.beta, x))
            .collect();
        drop(input);
        *self.output.write() = TensorData::F32(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_relu_clamps_between_beta_and_alpha() {
        assert_eq!(apply(ActivationFunction::BoundedReLu, 6.0, 0.0, -1.0), 0.0);
        assert_eq!(apply(ActivationFunction::BoundedReLu, 6.0, 0.0, 3.5), 3.5);
        assert_eq!(apply(ActivationFunction::BoundedReLu, 6.0, 0.0, 9.0), 6.0);
    }

    #[test]
    fn leaky_relu_scales_negative_side_only() {
        assert_eq!(apply(ActivationFunction::LeakyReLu, 0.1, 0.0, 2.0), 2.0);
        assert!((apply(ActivationFunction::LeakyReLu, 0.1, 0.0, -2.0) + 0.2).abs() < 1e-6);
    }
}
