//! Core identifier types for the allocator IR
//!
//! All IR entities are referred to by dense integer IDs so that analysis
//! results can live in flat side tables instead of pointer-linked nodes.

use std::fmt;

/// Unique identifier for a basic block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Unique identifier for an SSA value (phi or regular instruction)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Unique identifier for a loop in the CFG
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

impl LoopId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// A virtual register: the frame-slot home of a value.
///
/// Wide (64-bit) values occupy two consecutive slots; the high half lives
/// at `VReg(n + 1)` relative to its low half `VReg(n)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl VReg {
    /// Sentinel for a value that never materializes; no real slot is ever
    /// numbered this high.
    pub const INVALID: VReg = VReg(u32::MAX);

    /// The slot holding the high half of a wide value homed at `self`.
    pub fn high(self) -> VReg {
        VReg(self.0 + 1)
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A physical register, identified by its target-assigned number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysReg(pub u16);

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Register class demanded at a definition or use site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// Integer registers
    Core,
    /// Floating-point registers
    Float,
    /// Either class is acceptable
    Any,
}

impl RegClass {
    /// Does a register of the given floating-point-ness satisfy this class?
    pub fn matches(self, is_fp: bool) -> bool {
        match self {
            RegClass::Core => !is_fp,
            RegClass::Float => is_fp,
            RegClass::Any => true,
        }
    }
}

/// Allocator for block IDs
#[derive(Debug, Default)]
pub struct BlockIdAllocator {
    next_id: u32,
}

impl BlockIdAllocator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    pub fn fresh(&mut self) -> BlockId {
        let id = self.next_id;
        self.next_id += 1;
        BlockId(id)
    }
}

/// Allocator for value IDs
#[derive(Debug, Default)]
pub struct ValueIdAllocator {
    next_id: u32,
}

impl ValueIdAllocator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    pub fn fresh(&mut self) -> ValueId {
        let id = self.next_id;
        self.next_id += 1;
        ValueId(id)
    }
}
