//! Target parameters
//!
//! The core is architecture-agnostic; everything target-specific enters
//! through a [`TargetConfig`]: the register-class partition, the reserved
//! and temp register lists, the wide-value pairing rule, and the word size
//! used for frame-slot layout.

use crate::ir::types::{PhysReg, VReg};

/// Per-target register file description.
#[derive(Clone, Debug)]
pub struct TargetConfig {
    /// All core (integer) registers
    pub core_regs: Vec<PhysReg>,
    /// All floating-point registers
    pub fp_regs: Vec<PhysReg>,
    /// Never allocatable (stack pointer and friends)
    pub reserved: Vec<PhysReg>,
    /// Default scratch pool; registers outside this list are candidates
    /// for method-lifetime promotion
    pub core_temps: Vec<PhysReg>,
    pub fp_temps: Vec<PhysReg>,
    /// Registers the calling convention requires the method to preserve
    pub callee_saved: Vec<PhysReg>,
    /// Wide core values take a pair of registers (narrow register file)
    /// rather than one double-width register
    pub wide_core_pairs: bool,
    /// Wide floating-point values fit one double-width register
    pub wide_fp_double: bool,
    /// Frame slot size in bytes
    pub word_size: u32,
}

impl TargetConfig {
    pub fn is_fp(&self, reg: PhysReg) -> bool {
        self.fp_regs.contains(&reg)
    }

    /// Frame offset of a virtual register's home slot.
    pub fn vreg_offset(&self, vreg: VReg) -> i32 {
        (vreg.0 * self.word_size) as i32
    }

    /// A 32-bit-word register file with eight core and eight fp registers;
    /// p0/p1 reserved, p2..p5 core temps, p6/p7 promotable, p8..p15 fp
    /// with four temps. Used by tests and documentation examples.
    pub fn narrow_test_target() -> TargetConfig {
        let core: Vec<PhysReg> = (0..8).map(PhysReg).collect();
        let fp: Vec<PhysReg> = (8..16).map(PhysReg).collect();
        TargetConfig {
            reserved: vec![PhysReg(0), PhysReg(1)],
            core_temps: (2..6).map(PhysReg).collect(),
            fp_temps: (8..12).map(PhysReg).collect(),
            callee_saved: vec![PhysReg(5), PhysReg(6), PhysReg(7)],
            core_regs: core,
            fp_regs: fp,
            wide_core_pairs: true,
            wide_fp_double: true,
            word_size: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_offsets_follow_word_size() {
        let target = TargetConfig::narrow_test_target();
        assert_eq!(target.vreg_offset(VReg(0)), 0);
        assert_eq!(target.vreg_offset(VReg(3)), 12);
        // A wide value's high half sits in the next slot.
        assert_eq!(target.vreg_offset(VReg(3).high()), 16);
        assert!(target.is_fp(PhysReg(8)));
        assert!(!target.is_fp(PhysReg(2)));
    }
}
