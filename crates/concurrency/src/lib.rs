//! Generic concurrency primitives the worker pool (spec.md C9/C10/C12) is
//! built from.
//!
//! Nothing in this crate knows about tensors, DAGs, or backends —
//! `strata-engine` specializes [`BlockingQueue`] as the per-device run queue
//! (`BlockingQueue<Arc<RunInfo>>`) and [`TimeoutRegistry`] as the ONNX
//! cooperative-cancellation handshake described in spec.md §4.7.

pub mod queue;
pub mod timeout_registry;

pub use queue::{BlockingQueue, ScanDecision};
pub use timeout_registry::{Cancellable, SlotState, TimeoutRegistry};
