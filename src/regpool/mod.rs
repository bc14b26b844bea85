//! Register pool and location policy
//!
//! The stateful half of the allocator. [`pool`] tracks what every physical
//! register holds; [`policy`] moves values between frame slots, registers,
//! and register pairs on demand; [`target`] supplies the per-architecture
//! register file description.

pub mod policy;
pub mod pool;
pub mod target;

pub use policy::{evaluate, load_value, release, update, Location, Place};
pub use pool::{RegisterInfo, RegisterPool};
pub use target::TargetConfig;
