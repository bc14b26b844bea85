//! Code emitter seam
//!
//! The allocator does not produce machine code. Whenever it decides on a
//! spill store, a reload, or a register-to-register copy, it reports the
//! decision to a [`CodeSink`] owned by the external instruction encoder.

use crate::ir::types::{PhysReg, VReg};

/// Receiver for the allocator's emitted data movement.
///
/// `high` is present for wide values held in a register pair; it is `None`
/// for narrow values and for wide values held in a single double-width
/// register. `wide` disambiguates the latter case: a wide store or load
/// with `high == None` moves both frame slots through one register.
pub trait CodeSink {
    /// Store a register's value to its home frame slot
    fn store_to_frame(&mut self, vreg: VReg, reg: PhysReg, high: Option<PhysReg>, wide: bool);
    /// Load a value from its home frame slot into a register
    fn load_from_frame(&mut self, reg: PhysReg, high: Option<PhysReg>, vreg: VReg, wide: bool);
    /// Register-to-register copy (possibly across register classes)
    fn reg_copy(&mut self, dst: PhysReg, src: PhysReg);
    /// Wide register-to-register copy
    fn reg_copy_wide(&mut self, dst: (PhysReg, Option<PhysReg>), src: (PhysReg, Option<PhysReg>));
}

/// One recorded sink event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmittedOp {
    StoreFrame {
        vreg: VReg,
        reg: PhysReg,
        high: Option<PhysReg>,
        wide: bool,
    },
    LoadFrame {
        reg: PhysReg,
        high: Option<PhysReg>,
        vreg: VReg,
        wide: bool,
    },
    Copy {
        dst: PhysReg,
        src: PhysReg,
    },
    CopyWide {
        dst: (PhysReg, Option<PhysReg>),
        src: (PhysReg, Option<PhysReg>),
    },
}

/// Sink that records every event; used by tests and for debugging dumps.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub ops: Vec<EmittedOp>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copies(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, EmittedOp::Copy { .. } | EmittedOp::CopyWide { .. }))
            .count()
    }

    pub fn stores(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, EmittedOp::StoreFrame { .. }))
            .count()
    }

    pub fn loads(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, EmittedOp::LoadFrame { .. }))
            .count()
    }
}

impl CodeSink for RecordingSink {
    fn store_to_frame(&mut self, vreg: VReg, reg: PhysReg, high: Option<PhysReg>, wide: bool) {
        self.ops.push(EmittedOp::StoreFrame {
            vreg,
            reg,
            high,
            wide,
        });
    }

    fn load_from_frame(&mut self, reg: PhysReg, high: Option<PhysReg>, vreg: VReg, wide: bool) {
        self.ops.push(EmittedOp::LoadFrame {
            reg,
            high,
            vreg,
            wide,
        });
    }

    fn reg_copy(&mut self, dst: PhysReg, src: PhysReg) {
        self.ops.push(EmittedOp::Copy { dst, src });
    }

    fn reg_copy_wide(&mut self, dst: (PhysReg, Option<PhysReg>), src: (PhysReg, Option<PhysReg>)) {
        self.ops.push(EmittedOp::CopyWide { dst, src });
    }
}
