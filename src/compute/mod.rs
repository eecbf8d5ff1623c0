//! Compute module for per-peer numeric work
//!
//! The relay hands every qualifying peer its own compute task. The heavy
//! lifting sits behind the `ComputeBackend` trait so the relay never knows
//! whether results come from a rayon pool or a test double.

mod cpu;
mod mock;
mod operands;
mod registry;
mod task;
mod traits;

pub use cpu::CpuBackend;
pub use mock::{MockBackend, MockConfig};
pub use operands::{ensure_finite, Operands};
pub use registry::*;
pub use task::{ComputeTask, DeliveryOutcome};
pub use traits::*;
