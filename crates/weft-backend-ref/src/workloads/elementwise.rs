//! Elementwise binary arithmetic: Addition, Subtraction, Multiplication,
//! Division, Maximum, Minimum. Float32 and Signed32, same-shape operands.

use weft::descriptor::QueueDescriptor;
use weft::error::{ExecutionError, FactoryError};
use weft::layer::LayerKind;
use weft::memory::MemoryManager;
use weft::tensor::{TensorData, TensorHandle};
use weft::workload::Workload;

use super::exec_err;

#[derive(Clone, Copy)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

impl BinaryOp {
    fn for_kind(kind: LayerKind) -> Option<BinaryOp> {
        match kind {
            LayerKind::Addition => Some(BinaryOp::Add),
            LayerKind::Subtraction => Some(BinaryOp::Sub),
            LayerKind::Multiplication => Some(BinaryOp::Mul),
            LayerKind::Division => Some(BinaryOp::Div),
            LayerKind::Maximum => Some(BinaryOp::Max),
            LayerKind::Minimum => Some(BinaryOp::Min),
            _ => None,
        }
    }

    fn apply_f32(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Max => a.max(b),
            BinaryOp::Min => a.min(b),
        }
    }

    fn apply_si32(self, a: i32, b: i32) -> Option<i32> {
        match self {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Max => Some(a.max(b)),
            BinaryOp::Min => Some(a.min(b)),
        }
    }
}

pub struct RefBinaryWorkload {
    kind: LayerKind,
    op: BinaryOp,
    lhs: TensorHandle,
    rhs: TensorHandle,
    output: TensorHandle,
}

fn make_binary(
    kind: LayerKind,
    descriptor: &QueueDescriptor,
) -> Result<Box<dyn Workload>, FactoryError> {
    let op = BinaryOp::for_kind(kind).expect("kind routed to the elementwise constructor");
    descriptor.ensure_inputs(kind, 2)?;
    descriptor.ensure_outputs(kind, 1)?;
    descriptor.ensure_same_shape(kind, &descriptor.inputs[0], &descriptor.inputs[1])?;
    descriptor.ensure_same_shape(kind, &descriptor.inputs[0], &descriptor.outputs[0])?;
    Ok(Box::new(RefBinaryWorkload {
        kind,
        op,
        lhs: descriptor.inputs[0].clone(),
        rhs: descriptor.inputs[1].clone(),
        output: descriptor.outputs[0].clone(),
    }))
}

macro_rules! binary_constructor {
    ($name:ident, $kind:expr) => {
        pub fn $name(
            descriptor: &QueueDescriptor,
            _memory: &MemoryManager,
        ) -> Result<Box<dyn Workload>, FactoryError> {
            make_binary($kind, descriptor)
        }
    };
}

binary_constructor!(make_addition, LayerKind::Addition);
binary_constructor!(make_subtraction, LayerKind::Subtraction);
binary_constructor!(make_multiplication, LayerKind::Multiplication);
binary_constructor!(make_division, LayerKind::Division);
binary_constructor!(make_maximum, LayerKind::Maximum);
binary_constructor!(make_minimum, LayerKind::Minimum);

impl Workload for RefBinaryWorkload {
    fn kind(&self) -> LayerKind {
        self.kind
    }

    fn execute(&self) -> Result<(), ExecutionError> {
        let lhs = self.lhs.read();
        let rhs = self.rhs.read();
        let result = match (&*lhs, &*rhs) {
            (TensorData::F32(a), TensorData::F32(b)) => TensorData::F32(
                a.iter()
                    .zip(b.iter())
                    .map(|(&x, &y)| self.op.apply_f32(x, y))
                    .collect(),
            ),
            (TensorData::Si32(a), TensorData::Si32(b)) => {
                let mut values = Vec::with_capacity(a.len());
                for (&x, &y) in a.iter().zip(b.iter()) {
                    let value = self.op.apply_si32(x, y).ok_or_else(|| {
                        exec_err(self.kind, format!("integer arithmetic fault on {x} and {y}"))
                    })?;
                    values.push(value);
                }
                TensorData::Si32(values)
            }
            (a, b) => {
                return Err(exec_err(
                    self.kind,
                    format!("operand dtypes {} and {} not supported", a.dtype(), b.dtype()),
                ))
            }
        };
        drop(lhs);
        drop(rhs);
        *self.output.write() = result;
        Ok(())
    }
}
