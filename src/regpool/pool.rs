//! Physical register pool
//!
//! One pool per method compilation. Each physical register has a record
//! tracking what it holds right now (`live`, `vreg`), whether the
//! in-register copy differs from the home frame slot (`dirty`), whether it
//! belongs to the scratch pool (`is_temp`) or is promotable/promoted, and
//! its pairing state for wide values on a narrow register file.
//!
//! Pool exhaustion is recoverable by construction: when no free temp is
//! left, a live but unlocked register is flushed (if dirty) and clobbered.
//! Worst case every value round-trips through its frame slot on every use,
//! which is slow but never incorrect.

use std::collections::HashMap;

use crate::emit::CodeSink;
use crate::error::AllocError;
use crate::ir::types::{PhysReg, RegClass, VReg};
use crate::regpool::target::TargetConfig;

/// Bookkeeping record for one physical register.
#[derive(Clone, Debug)]
pub struct RegisterInfo {
    pub reg: PhysReg,
    pub is_fp: bool,
    /// Member of the scratch pool; non-temp registers are candidates for
    /// method-lifetime promotion
    pub is_temp: bool,
    /// Reserved, locked for a call sequence, or held for the instruction
    /// currently being assembled; never evicted while set
    pub in_use: bool,
    /// Currently holds a value
    pub live: bool,
    /// In-register copy differs from the home frame slot
    pub dirty: bool,
    /// Half of a register pair
    pub pair: bool,
    pub partner: Option<PhysReg>,
    /// Virtual register held, when live
    pub vreg: Option<VReg>,
    /// Holds the high half of `vreg`'s wide value
    pub holds_high: bool,
    /// Holds a whole wide value in one double-width register
    pub wide: bool,
}

impl RegisterInfo {
    fn new(reg: PhysReg, is_fp: bool) -> Self {
        Self {
            reg,
            is_fp,
            is_temp: false,
            in_use: false,
            live: false,
            dirty: false,
            pair: false,
            partner: None,
            vreg: None,
            holds_high: false,
            wide: false,
        }
    }

    fn reset(&mut self) {
        self.live = false;
        self.dirty = false;
        self.pair = false;
        self.partner = None;
        self.vreg = None;
        self.holds_high = false;
        self.wide = false;
    }
}

/// Per-method register pool, partitioned into core and floating-point
/// classes. Constructed fresh for every method; methods never share one.
#[derive(Debug)]
pub struct RegisterPool {
    regs: Vec<RegisterInfo>,
    index: HashMap<PhysReg, usize>,
    /// Most-recently-freed temps, per class; a cheap locality tie-break
    /// with no correctness obligation
    freed_core: Vec<PhysReg>,
    freed_fp: Vec<PhysReg>,
    /// Every register handed out at least once
    used_mask: u64,
    callee_saved_mask: u64,
    wide_core_pairs: bool,
    wide_fp_double: bool,
}

impl RegisterPool {
    pub fn new(target: &TargetConfig) -> RegisterPool {
        let mut regs = Vec::new();
        let mut index = HashMap::new();
        for &reg in &target.core_regs {
            debug_assert!(reg.0 < 64);
            index.insert(reg, regs.len());
            regs.push(RegisterInfo::new(reg, false));
        }
        for &reg in &target.fp_regs {
            debug_assert!(reg.0 < 64);
            index.insert(reg, regs.len());
            regs.push(RegisterInfo::new(reg, true));
        }
        let mut pool = RegisterPool {
            regs,
            index,
            freed_core: Vec::new(),
            freed_fp: Vec::new(),
            used_mask: 0,
            callee_saved_mask: target
                .callee_saved
                .iter()
                .fold(0, |mask, reg| mask | 1 << reg.0),
            wide_core_pairs: target.wide_core_pairs,
            wide_fp_double: target.wide_fp_double,
        };
        // Keep special registers from being allocated.
        for &reg in &target.reserved {
            pool.info_mut(reg).in_use = true;
        }
        // Mark temps; everything else not reserved is promotable.
        for &reg in target.core_temps.iter().chain(target.fp_temps.iter()) {
            pool.info_mut(reg).is_temp = true;
        }
        pool
    }

    pub fn info(&self, reg: PhysReg) -> &RegisterInfo {
        &self.regs[self.index[&reg]]
    }

    fn info_mut(&mut self, reg: PhysReg) -> &mut RegisterInfo {
        let i = self.index[&reg];
        &mut self.regs[i]
    }

    pub fn is_fp(&self, reg: PhysReg) -> bool {
        self.info(reg).is_fp
    }

    /// Allocate a free temp of one concrete class, evicting if necessary.
    fn alloc_temp_of(&mut self, fp: bool, sink: &mut dyn CodeSink) -> Result<PhysReg, AllocError> {
        // Prefer the most recently freed temp that is still free.
        loop {
            let popped = if fp {
                self.freed_fp.pop()
            } else {
                self.freed_core.pop()
            };
            let reg = match popped {
                Some(reg) => reg,
                None => break,
            };
            let info = self.info(reg);
            if info.is_temp && !info.in_use && !info.live {
                return Ok(self.take(reg));
            }
        }
        if let Some(reg) = self
            .regs
            .iter()
            .find(|r| r.is_fp == fp && r.is_temp && !r.in_use && !r.live)
            .map(|r| r.reg)
        {
            return Ok(self.take(reg));
        }
        // Exhausted: flush-then-evict one unlocked live temp.
        let victim = self
            .regs
            .iter()
            .find(|r| r.is_fp == fp && r.is_temp && !r.in_use && r.live)
            .map(|r| r.reg)
            .ok_or(AllocError::ExhaustedRegisterClass {
                class: if fp { RegClass::Float } else { RegClass::Core },
            })?;
        tracing::trace!(reg = %victim, "evicting register");
        self.flush(victim, sink);
        self.clobber(victim);
        Ok(self.take(victim))
    }

    fn take(&mut self, reg: PhysReg) -> PhysReg {
        self.used_mask |= 1 << reg.0;
        // Taking one half of a pair must invalidate the partner's pairing,
        // or a later flush of the partner would emit a wide store naming an
        // unrelated register.
        self.clobber(reg);
        self.info_mut(reg).in_use = true;
        reg
    }

    /// Allocate a scratch register satisfying `class`; `fp_hint` breaks
    /// the tie when either class is acceptable.
    pub fn alloc_typed_temp(
        &mut self,
        fp_hint: bool,
        class: RegClass,
        sink: &mut dyn CodeSink,
    ) -> Result<PhysReg, AllocError> {
        let fp = class == RegClass::Float || (class == RegClass::Any && fp_hint);
        self.alloc_temp_of(fp, sink)
    }

    /// Allocate storage for a wide value: a marked pair of core registers,
    /// or one double-width fp register when the target allows it.
    pub fn alloc_typed_temp_wide(
        &mut self,
        fp_hint: bool,
        class: RegClass,
        sink: &mut dyn CodeSink,
    ) -> Result<(PhysReg, Option<PhysReg>), AllocError> {
        let fp = class == RegClass::Float || (class == RegClass::Any && fp_hint);
        if fp && self.wide_fp_double {
            return Ok((self.alloc_temp_of(true, sink)?, None));
        }
        if !self.wide_core_pairs {
            return Ok((self.alloc_temp_of(fp, sink)?, None));
        }
        let low = self.alloc_temp_of(fp, sink)?;
        let high = self.alloc_temp_of(fp, sink)?;
        self.mark_pair(low, high);
        Ok((low, Some(high)))
    }

    /// Unpin a register; the record itself (liveness, dirtiness) is
    /// untouched, the register merely becomes evictable again.
    pub fn free_temp(&mut self, reg: PhysReg) {
        let info = self.info_mut(reg);
        if !info.in_use {
            return;
        }
        info.in_use = false;
        if info.is_temp {
            let is_fp = info.is_fp;
            if is_fp {
                self.freed_fp.push(reg);
            } else {
                self.freed_core.push(reg);
            }
        }
    }

    /// Pin a temp for explicit register management (call sequences).
    pub fn lock_temp(&mut self, reg: PhysReg) {
        let info = self.info_mut(reg);
        debug_assert!(info.is_temp);
        info.in_use = true;
        info.live = false;
    }

    pub fn unlock_temp(&mut self, reg: PhysReg) {
        let info = self.info_mut(reg);
        debug_assert!(info.is_temp);
        info.in_use = false;
    }

    /// Bind a register to a value identity. Any other register holding the
    /// same half of the same virtual register is clobbered first, so one
    /// value never lives in two places.
    pub fn mark_live(&mut self, reg: PhysReg, vreg: VReg, high: bool) {
        if let Some(other) = self.find_live(vreg, high) {
            if other != reg {
                self.clobber(other);
            }
        }
        let info = self.info_mut(reg);
        info.live = true;
        info.vreg = Some(vreg);
        info.holds_high = high;
        info.wide = false;
    }

    /// Bind one double-width register to a whole wide value.
    pub fn mark_live_wide(&mut self, reg: PhysReg, vreg: VReg) {
        self.mark_live(reg, vreg, false);
        self.info_mut(reg).wide = true;
    }

    pub fn mark_dirty(&mut self, reg: PhysReg) {
        let info = self.info_mut(reg);
        if info.live {
            info.dirty = true;
        }
    }

    pub fn mark_pair(&mut self, low: PhysReg, high: PhysReg) {
        let low_info = self.info_mut(low);
        low_info.pair = true;
        low_info.partner = Some(high);
        let high_info = self.info_mut(high);
        high_info.pair = true;
        high_info.partner = Some(low);
    }

    /// Unbind a register. Clobbering one half of a pair invalidates the
    /// partner's pairing, but not the partner's liveness, to prevent
    /// silent aliasing of a stale pair.
    pub fn clobber(&mut self, reg: PhysReg) {
        let partner = {
            let info = self.info_mut(reg);
            let partner = if info.pair { info.partner } else { None };
            info.reset();
            partner
        };
        if let Some(partner) = partner {
            let info = self.info_mut(partner);
            info.pair = false;
            info.partner = None;
        }
    }

    /// Clobber every register a call may overwrite.
    pub fn clobber_caller_save(&mut self) {
        let caller_save: Vec<PhysReg> = self
            .regs
            .iter()
            .filter(|r| r.live && self.callee_saved_mask & (1 << r.reg.0) == 0)
            .map(|r| r.reg)
            .collect();
        for reg in caller_save {
            self.clobber(reg);
        }
    }

    /// Clobber the whole scratch pool; promoted registers survive. Used at
    /// block boundaries, where values live on only in their frame slots.
    pub fn clobber_temps(&mut self) {
        let temps: Vec<PhysReg> = self
            .regs
            .iter()
            .filter(|r| r.is_temp && r.live)
            .map(|r| r.reg)
            .collect();
        for reg in temps {
            self.clobber(reg);
        }
    }

    /// Find the register currently holding the given half of a value.
    pub fn find_live(&self, vreg: VReg, high: bool) -> Option<PhysReg> {
        self.regs
            .iter()
            .find(|r| r.live && r.vreg == Some(vreg) && r.holds_high == high)
            .map(|r| r.reg)
    }

    /// Find and pin the register holding a value, if the class fits.
    pub fn alloc_live(&mut self, vreg: VReg, class: RegClass, high: bool) -> Option<PhysReg> {
        let reg = self.find_live(vreg, high)?;
        if !class.matches(self.is_fp(reg)) {
            return None;
        }
        self.info_mut(reg).in_use = true;
        self.used_mask |= 1 << reg.0;
        Some(reg)
    }

    /// If live and dirty, store the register to its home frame slot and
    /// clear dirty. Pairs are flushed through their low half with one wide
    /// store.
    pub fn flush(&mut self, reg: PhysReg, sink: &mut dyn CodeSink) {
        let info = self.info(reg).clone();
        let vreg = match (info.live, info.vreg) {
            (true, Some(vreg)) => vreg,
            _ => return,
        };
        if info.pair {
            let partner = match info.partner {
                Some(partner) => partner,
                None => return,
            };
            let partner_dirty = self.info(partner).dirty;
            if !info.dirty && !partner_dirty {
                return;
            }
            let (low, high) = if info.holds_high { (partner, reg) } else { (reg, partner) };
            let low_vreg = match self.info(low).vreg {
                Some(low_vreg) => low_vreg,
                None => vreg,
            };
            sink.store_to_frame(low_vreg, low, Some(high), true);
            self.info_mut(low).dirty = false;
            self.info_mut(high).dirty = false;
        } else if info.dirty {
            sink.store_to_frame(vreg, reg, None, info.wide);
            self.info_mut(reg).dirty = false;
        }
    }

    /// Flush every dirty register.
    pub fn flush_all(&mut self, sink: &mut dyn CodeSink) {
        let dirty: Vec<PhysReg> = self
            .regs
            .iter()
            .filter(|r| r.live && r.dirty)
            .map(|r| r.reg)
            .collect();
        for reg in dirty {
            self.flush(reg, sink);
        }
    }

    /// Bind a promotable (non-temp, non-reserved) register to a virtual
    /// register for the remainder of the method.
    pub fn promote(&mut self, reg: PhysReg, vreg: VReg, high: bool) {
        debug_assert!(!self.info(reg).is_temp && !self.info(reg).in_use);
        self.used_mask |= 1 << reg.0;
        let info = self.info_mut(reg);
        info.live = true;
        info.vreg = Some(vreg);
        info.holds_high = high;
        tracing::trace!(reg = %reg, vreg = %vreg, "promoted virtual register");
    }

    /// Callee-saved registers the method touched; these must be preserved
    /// across the method's calls.
    pub fn spill_mask(&self) -> u64 {
        self.used_mask & self.callee_saved_mask
    }

    pub fn num_spills(&self) -> u32 {
        self.spill_mask().count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{EmittedOp, RecordingSink};

    fn pool() -> RegisterPool {
        RegisterPool::new(&TargetConfig::narrow_test_target())
    }

    #[test]
    fn reserved_registers_never_allocated() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let reg = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
            assert!(reg != PhysReg(0) && reg != PhysReg(1), "reserved reg handed out");
            seen.push(reg);
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn exhaustion_flushes_then_evicts_exactly_one() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        // Fill all four core temps with live, dirty values.
        for i in 0..4u32 {
            let reg = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
            pool.mark_live(reg, VReg(i), false);
            pool.mark_dirty(reg);
            pool.free_temp(reg);
        }
        assert_eq!(sink.stores(), 0);

        // One more request: exactly one flush, one eviction, no deadlock.
        let reg = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        assert_eq!(sink.stores(), 1);
        assert!(!pool.info(reg).live);
    }

    #[test]
    fn locked_temps_are_not_evictable() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        let mut locked = Vec::new();
        for _ in 0..4 {
            let reg = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
            locked.push(reg);
        }
        // All core temps pinned: the class is genuinely exhausted.
        assert_eq!(
            pool.alloc_typed_temp(false, RegClass::Core, &mut sink),
            Err(AllocError::ExhaustedRegisterClass {
                class: RegClass::Core
            })
        );
        pool.free_temp(locked[0]);
        assert!(pool.alloc_typed_temp(false, RegClass::Core, &mut sink).is_ok());
    }

    #[test]
    fn prefers_most_recently_freed() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        let a = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        let b = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        pool.free_temp(a);
        pool.free_temp(b);
        let next = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        assert_eq!(next, b);
    }

    #[test]
    fn clobbering_pair_half_unpairs_partner_but_keeps_it_live() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        let (low, high) = pool
            .alloc_typed_temp_wide(false, RegClass::Core, &mut sink)
            .unwrap();
        let high = high.unwrap();
        pool.mark_live(low, VReg(4), false);
        pool.mark_live(high, VReg(4), true);

        pool.clobber(low);
        let partner = pool.info(high);
        assert!(!partner.pair, "stale pairing survived clobber");
        assert!(partner.partner.is_none());
        assert!(partner.live, "partner liveness must survive");
    }

    #[test]
    fn reallocating_half_of_a_released_pair_unpairs_the_other() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        // A wide pair handed out and released without ever being bound.
        let (low, high) = pool
            .alloc_typed_temp_wide(false, RegClass::Core, &mut sink)
            .unwrap();
        let high = high.unwrap();
        pool.free_temp(low);
        pool.free_temp(high);

        // Reallocating one half must dissolve the leftover pairing.
        let taken = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        assert_eq!(taken, high);
        let other = pool.info(low);
        assert!(!other.pair, "stale pairing survived reallocation");
        assert!(other.partner.is_none());

        // Unrelated narrow values in the two registers flush independently.
        pool.mark_live(low, VReg(5), false);
        pool.mark_dirty(low);
        pool.mark_live(high, VReg(9), false);
        pool.flush(low, &mut sink);
        assert_eq!(
            sink.ops,
            vec![EmittedOp::StoreFrame {
                vreg: VReg(5),
                reg: low,
                high: None,
                wide: false,
            }]
        );
    }

    #[test]
    fn one_value_never_lives_in_two_registers() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        let a = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        let b = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        pool.mark_live(a, VReg(3), false);
        pool.mark_live(b, VReg(3), false);
        assert!(!pool.info(a).live);
        assert_eq!(pool.find_live(VReg(3), false), Some(b));
    }

    #[test]
    fn flush_wide_pair_emits_single_wide_store() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        let (low, high) = pool
            .alloc_typed_temp_wide(false, RegClass::Core, &mut sink)
            .unwrap();
        let high = high.unwrap();
        pool.mark_live(low, VReg(6), false);
        pool.mark_live(high, VReg(6), true);
        pool.mark_dirty(low);
        pool.mark_dirty(high);

        pool.flush(low, &mut sink);
        assert_eq!(
            sink.ops,
            vec![EmittedOp::StoreFrame {
                vreg: VReg(6),
                reg: low,
                high: Some(high),
                wide: true,
            }]
        );
        assert!(!pool.info(low).dirty && !pool.info(high).dirty);
        // A second flush is a no-op.
        pool.flush(low, &mut sink);
        assert_eq!(sink.stores(), 1);
    }

    #[test]
    fn call_sequence_pins_arguments_and_clobbers_caller_save() {
        let mut pool = pool();
        let mut sink = RecordingSink::new();
        pool.promote(PhysReg(6), VReg(9), false);

        // An argument register is locked while the call is assembled: even
        // under pressure it must not be handed out.
        let arg = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
        pool.free_temp(arg);
        pool.lock_temp(arg);
        for i in 0..2u32 {
            let reg = pool.alloc_typed_temp(false, RegClass::Core, &mut sink).unwrap();
            assert_ne!(reg, arg);
            pool.mark_live(reg, VReg(i), false);
            pool.free_temp(reg);
        }
        pool.unlock_temp(arg);

        // After the call, everything not callee-saved is gone; the
        // promoted callee-saved register survives.
        pool.clobber_caller_save();
        assert_eq!(pool.find_live(VReg(0), false), None);
        assert_eq!(pool.find_live(VReg(1), false), None);
        assert_eq!(pool.find_live(VReg(9), false), Some(PhysReg(6)));
    }

    #[test]
    fn promoted_registers_survive_temp_clobber_and_feed_spill_mask() {
        let mut pool = pool();
        // p6 and p7 are promotable and callee-saved in the test target.
        pool.promote(PhysReg(6), VReg(9), false);
        pool.clobber_temps();
        assert_eq!(pool.find_live(VReg(9), false), Some(PhysReg(6)));
        assert_eq!(pool.spill_mask(), 1 << 6);
        assert_eq!(pool.num_spills(), 1);
    }
}
