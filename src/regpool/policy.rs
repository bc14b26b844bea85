//! Value location policy
//!
//! A [`Location`] describes where a value resides right now: its home frame
//! slot, one register, or a register pair. The operations here move values
//! between those states on demand, consulting the pool so that a value
//! already held live in a register is reused instead of reloaded.
//!
//! Location records held by a driver can go stale (a block boundary
//! clobbers the scratch pool); the pool's liveness bookkeeping is the
//! single source of truth, and [`update`] rebuilds the record from it.

use crate::emit::CodeSink;
use crate::error::AllocError;
use crate::ir::types::{PhysReg, RegClass, VReg};
use crate::regpool::pool::RegisterPool;

/// Physical residence of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Place {
    /// Home frame slot only
    Frame,
    /// One register; for a wide value this is a double-width register
    /// holding both halves
    Reg(PhysReg),
    /// Low and high halves in a marked register pair
    RegPair(PhysReg, PhysReg),
}

/// Where a value lives, plus what kind of value it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub place: Place,
    pub wide: bool,
    /// Class preference when either class is acceptable
    pub fp: bool,
    /// Home frame slot; wide values also own the next slot
    pub vreg: VReg,
}

impl Location {
    pub fn frame(vreg: VReg, wide: bool, fp: bool) -> Location {
        Location {
            place: Place::Frame,
            wide,
            fp,
            vreg,
        }
    }

    pub fn in_register(&self) -> bool {
        self.place != Place::Frame
    }

    /// Registers this location occupies, low half first.
    pub fn regs(&self) -> impl Iterator<Item = PhysReg> {
        let (low, high) = match self.place {
            Place::Frame => (None, None),
            Place::Reg(reg) => (Some(reg), None),
            Place::RegPair(low, high) => (Some(low), Some(high)),
        };
        low.into_iter().chain(high)
    }
}

/// Rebuild a location from the pool's current state. If the value is held
/// live somewhere, the register (or pair) is pinned and returned; otherwise
/// the location demotes to the frame slot. Stale register claims in the
/// input are ignored.
pub fn update(pool: &mut RegisterPool, loc: Location) -> Location {
    if loc.wide {
        return update_wide(pool, loc);
    }
    match pool.alloc_live(loc.vreg, RegClass::Any, false) {
        Some(reg) => Location {
            place: Place::Reg(reg),
            fp: pool.is_fp(reg),
            ..loc
        },
        None => Location {
            place: Place::Frame,
            ..loc
        },
    }
}

/// Wide variant of [`update`]. A consistent residence is either one
/// double-width register or both halves of a pair; a lone half is useless
/// and gets clobbered so the value reloads cleanly from its frame slots.
pub fn update_wide(pool: &mut RegisterPool, loc: Location) -> Location {
    let frame = Location {
        place: Place::Frame,
        ..loc
    };
    let low = match pool.alloc_live(loc.vreg, RegClass::Any, false) {
        Some(low) => low,
        None => {
            if let Some(high) = pool.alloc_live(loc.vreg, RegClass::Any, true) {
                pool.clobber(high);
                pool.free_temp(high);
            }
            return frame;
        }
    };
    if pool.info(low).wide {
        return Location {
            place: Place::Reg(low),
            fp: pool.is_fp(low),
            ..loc
        };
    }
    match pool.alloc_live(loc.vreg, RegClass::Any, true) {
        Some(high) => {
            // Re-establish pairing in case an eviction dropped it.
            pool.mark_pair(low, high);
            Location {
                place: Place::RegPair(low, high),
                fp: pool.is_fp(low),
                ..loc
            }
        }
        None => {
            pool.clobber(low);
            pool.free_temp(low);
            frame
        }
    }
}

/// Ensure the value has a register of the demanded class, emitting at most
/// one register-to-register copy and no frame traffic. With
/// `commit = false` the allocation is speculative: a fresh register is
/// handed out without binding it, for results that are about to be
/// overwritten.
pub fn evaluate(
    pool: &mut RegisterPool,
    sink: &mut dyn CodeSink,
    loc: Location,
    class: RegClass,
    commit: bool,
) -> Result<Location, AllocError> {
    if loc.wide {
        return evaluate_wide(pool, sink, loc, class, commit);
    }
    let loc = update(pool, loc);
    match loc.place {
        Place::Reg(reg) => {
            if class.matches(pool.is_fp(reg)) {
                return Ok(loc);
            }
            // Wrong class: one copy, binding transferred, old register
            // released.
            let new_reg = pool.alloc_typed_temp(loc.fp, class, sink)?;
            sink.reg_copy(new_reg, reg);
            let dirty = pool.info(reg).dirty;
            pool.clobber(reg);
            pool.free_temp(reg);
            pool.mark_live(new_reg, loc.vreg, false);
            if dirty {
                pool.mark_dirty(new_reg);
            }
            Ok(Location {
                place: Place::Reg(new_reg),
                fp: pool.is_fp(new_reg),
                ..loc
            })
        }
        Place::Frame => {
            let reg = pool.alloc_typed_temp(loc.fp, class, sink)?;
            if commit {
                pool.mark_live(reg, loc.vreg, false);
            }
            Ok(Location {
                place: Place::Reg(reg),
                fp: pool.is_fp(reg),
                ..loc
            })
        }
        Place::RegPair(..) => Err(AllocError::malformed(format!(
            "narrow value {} resident in a register pair",
            loc.vreg
        ))),
    }
}

/// Wide variant of [`evaluate`]. Class changes move the whole value with
/// one wide copy: a core pair collapses into a double-width fp register,
/// and a double expands into a freshly allocated pair.
pub fn evaluate_wide(
    pool: &mut RegisterPool,
    sink: &mut dyn CodeSink,
    loc: Location,
    class: RegClass,
    commit: bool,
) -> Result<Location, AllocError> {
    let loc = update_wide(pool, loc);
    match loc.place {
        Place::Reg(reg) => {
            if class.matches(pool.is_fp(reg)) {
                return Ok(loc);
            }
            let dirty = pool.info(reg).dirty;
            let (new_low, new_high) = pool.alloc_typed_temp_wide(loc.fp, class, sink)?;
            sink.reg_copy_wide((new_low, new_high), (reg, None));
            pool.clobber(reg);
            pool.free_temp(reg);
            rebind_wide(pool, loc.vreg, new_low, new_high, dirty);
            Ok(finish_wide(pool, loc, new_low, new_high))
        }
        Place::RegPair(low, high) => {
            if class.matches(pool.is_fp(low)) {
                return Ok(loc);
            }
            let dirty = pool.info(low).dirty || pool.info(high).dirty;
            let (new_low, new_high) = pool.alloc_typed_temp_wide(loc.fp, class, sink)?;
            sink.reg_copy_wide((new_low, new_high), (low, Some(high)));
            pool.clobber(low);
            pool.clobber(high);
            pool.free_temp(low);
            pool.free_temp(high);
            rebind_wide(pool, loc.vreg, new_low, new_high, dirty);
            Ok(finish_wide(pool, loc, new_low, new_high))
        }
        Place::Frame => {
            let (low, high) = pool.alloc_typed_temp_wide(loc.fp, class, sink)?;
            if commit {
                rebind_wide(pool, loc.vreg, low, high, false);
            }
            Ok(finish_wide(pool, loc, low, high))
        }
    }
}

fn rebind_wide(
    pool: &mut RegisterPool,
    vreg: VReg,
    low: PhysReg,
    high: Option<PhysReg>,
    dirty: bool,
) {
    match high {
        Some(high) => {
            pool.mark_live(low, vreg, false);
            pool.mark_live(high, vreg, true);
            if dirty {
                pool.mark_dirty(low);
                pool.mark_dirty(high);
            }
        }
        None => {
            pool.mark_live_wide(low, vreg);
            if dirty {
                pool.mark_dirty(low);
            }
        }
    }
}

fn finish_wide(pool: &RegisterPool, loc: Location, low: PhysReg, high: Option<PhysReg>) -> Location {
    Location {
        place: match high {
            Some(high) => Place::RegPair(low, high),
            None => Place::Reg(low),
        },
        fp: pool.is_fp(low),
        ..loc
    }
}

/// Materialize a value for a use site: ensure it sits in a register of the
/// demanded class, reloading from the frame only when no live copy exists.
pub fn load_value(
    pool: &mut RegisterPool,
    sink: &mut dyn CodeSink,
    loc: Location,
    class: RegClass,
) -> Result<Location, AllocError> {
    let updated = update(pool, loc);
    let was_resident = updated.in_register();
    let loc = evaluate(pool, sink, updated, class, true)?;
    if !was_resident {
        match loc.place {
            Place::Reg(reg) => sink.load_from_frame(reg, None, loc.vreg, loc.wide),
            Place::RegPair(low, high) => {
                sink.load_from_frame(low, Some(high), loc.vreg, true)
            }
            Place::Frame => {}
        }
    }
    Ok(loc)
}

/// Release every register a location pins; the value stays live and
/// evictable, later uses can still find it.
pub fn release(pool: &mut RegisterPool, loc: &Location) {
    for reg in loc.regs() {
        pool.free_temp(reg);
    }
}
