//! Per-method allocation driver
//!
//! Walks one method in linear block order and drives the pool/policy pair:
//! operands are materialized in their demanded register classes, results
//! are defined and marked dirty against their frame homes, and registers
//! holding dead values are reclaimed as the walk passes their last use.
//! Values cross block boundaries through their frame slots only, except
//! for virtual registers promoted to a callee-saved register for the whole
//! method.
//!
//! # Pipeline
//!
//! ```text
//! Graph → SsaLiveness → block walk (evaluate / define / reclaim) → AllocationResult
//! ```

use std::collections::HashMap;

use crate::emit::CodeSink;
use crate::error::AllocError;
use crate::ir::graph::Graph;
use crate::ir::types::{PhysReg, RegClass, VReg, ValueId};
use crate::liveness::SsaLiveness;
use crate::regpool::policy::{self, Location, Place};
use crate::regpool::pool::RegisterPool;
use crate::regpool::target::TargetConfig;

/// Register-class requirements, supplied by the instruction set upstream.
pub trait ClassDemands {
    /// Class the value's own result must live in.
    fn result_class(&self, value: ValueId) -> RegClass;

    /// Class demanded of operand `index` at `user`'s site. Defaults to the
    /// operand's own result class.
    fn operand_class(&self, user: ValueId, index: usize, operand: ValueId) -> RegClass {
        let _ = (user, index);
        self.result_class(operand)
    }
}

/// Every value in the same class; enough for single-bank instruction sets
/// and for tests.
pub struct UniformDemands(pub RegClass);

impl ClassDemands for UniformDemands {
    fn result_class(&self, _value: ValueId) -> RegClass {
        self.0
    }
}

/// What allocation decided for one method.
#[derive(Debug)]
pub struct AllocationResult {
    /// Home location per value, indexed by [`ValueId`]: the promoted
    /// register for promoted virtual registers, the frame slot otherwise
    pub homes: Vec<Location>,
    /// Callee-saved registers the method used; the prologue must preserve
    /// them
    pub spill_mask: u64,
    pub num_spills: u32,
    /// Frame bytes: virtual-register slots, compiler-temp slots, and
    /// spill slots
    pub frame_size: u32,
}

/// Allocator for one method. Build, optionally register promotions, run.
pub struct MethodAllocator<'a> {
    graph: &'a Graph,
    target: &'a TargetConfig,
    promotions: Vec<(VReg, PhysReg)>,
}

impl<'a> MethodAllocator<'a> {
    pub fn new(graph: &'a Graph, target: &'a TargetConfig) -> MethodAllocator<'a> {
        MethodAllocator {
            graph,
            target,
            promotions: Vec::new(),
        }
    }

    /// Bind a virtual register to a promotable physical register for the
    /// whole method. The promotion decision (use counts, loop depth) is
    /// made upstream; the register's class must match every demand placed
    /// on the virtual register.
    pub fn promote(&mut self, vreg: VReg, reg: PhysReg) -> &mut Self {
        self.promotions.push((vreg, reg));
        self
    }

    pub fn run(
        &self,
        demands: &dyn ClassDemands,
        sink: &mut dyn CodeSink,
    ) -> Result<AllocationResult, AllocError> {
        let liveness = SsaLiveness::analyze(self.graph)?;
        let mut pool = RegisterPool::new(self.target);

        let promoted: HashMap<VReg, PhysReg> = self.promotions.iter().copied().collect();
        for (&vreg, &reg) in &promoted {
            pool.promote(reg, vreg, false);
        }

        // Frame layout: named virtual-register slots first, then synthetic
        // slots for transient values that may need to spill.
        let named_slots = self
            .graph
            .values
            .iter()
            .filter_map(|v| v.vreg.map(|r| r.0 + if v.wide { 2 } else { 1 }))
            .max()
            .unwrap_or(0);
        let mut next_slot = named_slots;
        let mut locations: Vec<Location> = self
            .graph
            .values
            .iter()
            .map(|value| {
                let vreg = match value.vreg {
                    Some(vreg) => vreg,
                    None if value.has_uses() => {
                        let slot = VReg(next_slot);
                        next_slot += if value.wide { 2 } else { 1 };
                        slot
                    }
                    // Unused values never materialize and own no slot.
                    None => VReg::INVALID,
                };
                let fp = demands.result_class(value.id) == RegClass::Float;
                Location::frame(vreg, value.wide, fp)
            })
            .collect();

        for block_id in liveness.order().linear() {
            let block = self.graph.block(block_id);
            for &instr in &block.instructions {
                let value = self.graph.value(instr);
                let mut pinned: Vec<Location> = Vec::with_capacity(value.inputs.len() + 1);

                for (index, &input) in value.inputs.iter().enumerate() {
                    let class = demands.operand_class(instr, index, input);
                    let loc =
                        policy::load_value(&mut pool, sink, locations[input.index()], class)?;
                    locations[input.index()] = loc;
                    pinned.push(loc);
                }

                if value.has_uses() {
                    let class = demands.result_class(instr);
                    let loc =
                        policy::evaluate(&mut pool, sink, locations[instr.index()], class, true)?;
                    // A promoted register IS the value's home; there is no
                    // frame copy to keep in sync.
                    if !promoted.contains_key(&loc.vreg) {
                        for reg in loc.regs() {
                            pool.mark_dirty(reg);
                        }
                    }
                    locations[instr.index()] = loc;
                    pinned.push(loc);
                }

                for loc in &pinned {
                    policy::release(&mut pool, loc);
                }

                // Reclaim registers whose value just died; a dead value's
                // dirty bits are irrelevant, so no flush.
                let position = liveness.numbering().position(instr);
                for &input in &value.inputs {
                    let ended = liveness
                        .interval_of(input)
                        .map_or(true, |interval| interval.end() <= position + 1);
                    if !ended {
                        continue;
                    }
                    let loc = locations[input.index()];
                    if promoted.contains_key(&loc.vreg) {
                        continue;
                    }
                    for reg in loc.regs() {
                        pool.clobber(reg);
                        pool.free_temp(reg);
                    }
                    locations[input.index()] = Location {
                        place: Place::Frame,
                        ..loc
                    };
                }
            }

            // Values survive block boundaries only in their frame slots or
            // in promoted registers.
            pool.flush_all(sink);
            pool.clobber_temps();
            for loc in locations.iter_mut() {
                *loc = Location {
                    place: Place::Frame,
                    ..*loc
                };
            }
        }

        let homes = self
            .graph
            .values
            .iter()
            .map(|value| {
                let loc = locations[value.id.index()];
                match value.vreg.and_then(|vreg| promoted.get(&vreg)) {
                    Some(&reg) => Location {
                        place: Place::Reg(reg),
                        ..loc
                    },
                    None => loc,
                }
            })
            .collect();

        let num_spills = pool.num_spills();
        let frame_size = (next_slot + num_spills) * self.target.word_size;
        tracing::debug!(
            blocks = liveness.order().len(),
            values = liveness.num_ssa_values(),
            num_spills,
            frame_size,
            "allocated method"
        );
        Ok(AllocationResult {
            homes,
            spill_mask: pool.spill_mask(),
            num_spills,
            frame_size,
        })
    }
}
