//! The contract every backend-specific execution unit implements.

use crate::error::ExecutionError;
use crate::layer::LayerKind;

/// One backend-bound, executable operation instance.
///
/// A workload is bound to exactly one queue descriptor and one backend. Its
/// only observable effects are reading the bound input tensor handles and
/// writing the bound output tensor handles. `execute` may be called any
/// number of times and re-reads current input contents on each call; no kind
/// in the core taxonomy is stateful.
///
/// Kernel-level failures surface as [`ExecutionError::Backend`] rather than
/// silently producing wrong results.
pub trait Workload: Send {
    /// The layer kind this workload implements.
    fn kind(&self) -> LayerKind;

    /// Reads the bound inputs and writes the bound outputs.
    fn execute(&self) -> Result<(), ExecutionError>;
}
