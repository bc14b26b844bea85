//! Allocator input IR
//!
//! A method arrives as a [`Graph`]: a CFG of basic blocks holding SSA-form
//! values, with loop metadata attached by the upstream CFG builder.
//!
//! # Modules
//!
//! - `types`: dense ID newtypes and their allocators
//! - `graph`: CFG, blocks, values, loops, structural validation
//! - `builder`: builder pattern for constructing graphs

pub mod builder;
pub mod graph;
pub mod types;

pub use builder::GraphBuilder;
pub use graph::{Block, Graph, LoopInfo, Terminator, Value};
pub use types::{
    BlockId, BlockIdAllocator, LoopId, PhysReg, RegClass, VReg, ValueId, ValueIdAllocator,
};
