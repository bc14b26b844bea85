//! basalt: an SSA liveness and register-allocation backend for an
//! ahead-of-time method compiler.
//!
//! The crate takes one method at a time as a CFG in SSA form ([`ir`]),
//! computes precise live intervals for every value ([`liveness`]), and
//! drives a stateful physical-register pool through the method
//! ([`regpool`], [`allocate`]), reporting every spill store, reload, and
//! register copy to an external code emitter through the [`emit::CodeSink`]
//! seam.
//!
//! # Pipeline
//!
//! ```text
//! Graph → SsaLiveness (linearize → number → ranges → fixed point)
//!       → MethodAllocator (pool + policy walk) → AllocationResult
//! ```
//!
//! Everything is per-method and single-threaded; all types are `Send`, so
//! a driver may fan independent methods out across worker threads, each
//! with its own pool.

pub mod allocate;
pub mod emit;
pub mod error;
pub mod ir;
pub mod liveness;
pub mod regpool;

pub use allocate::{AllocationResult, ClassDemands, MethodAllocator, UniformDemands};
pub use emit::{CodeSink, EmittedOp, RecordingSink};
pub use error::AllocError;
pub use ir::builder::GraphBuilder;
pub use ir::graph::{Block, Graph, LoopInfo, Terminator, Value};
pub use ir::types::{BlockId, LoopId, PhysReg, RegClass, VReg, ValueId};
pub use liveness::SsaLiveness;
pub use regpool::{Location, Place, RegisterPool, TargetConfig};

#[cfg(test)]
mod tests;
