//! Live range construction
//!
//! Two phases build one live interval per indexed SSA value.
//!
//! # Phase A: per-block backward scan
//!
//! Blocks are visited in linear-post order (reverse of the allocation
//! order). For each block: union every successor's live-in set into the
//! working set and mark this block's values referenced by successor phis
//! live; add a range covering the whole block to every interval in the
//! working set; then walk regular instructions backward, killing
//! definitions (shrinking the interval's start down to the definition) and
//! marking every code and environment input live with a use record. Phis
//! defined here are killed without a full-block range: their effective
//! start is the block entry, already captured by their position. If the
//! block is a loop header, everything still live gets one extra range
//! covering the entire loop body through the back edge, so a loop-carried
//! value never needs a mid-loop reload.
//!
//! # Phase B: global fixed point
//!
//! Phase A's single backward walk assumes forward-only dataflow and cannot
//! see back edges. A fixed-point iteration over the plain block order
//! propagates `live_out(B) = ∪ live_in(S)` and
//! `live_in(B) ∪= live_out(B) \ kill(B)` until nothing changes; the sets
//! grow monotonically and are bounded by the value count, so termination
//! is guaranteed.

use crate::error::AllocError;
use crate::ir::graph::Graph;
use crate::ir::types::BlockId;
use crate::liveness::bitvec::BitVector;
use crate::liveness::interval::LiveInterval;
use crate::liveness::linearize::LinearOrder;
use crate::liveness::numbering::Numbering;

/// Per-block liveness sets, indexed by SSA index.
#[derive(Clone, Debug)]
pub struct BlockLiveness {
    pub live_in: BitVector,
    pub live_out: BitVector,
    /// Values defined in this block
    pub kill: BitVector,
}

impl BlockLiveness {
    pub fn new(num_ssa_values: usize) -> Self {
        Self {
            live_in: BitVector::new(num_ssa_values),
            live_out: BitVector::new(num_ssa_values),
            kill: BitVector::new(num_ssa_values),
        }
    }
}

/// Phase A. Fills `intervals` and the initial `live_in`/`kill` sets; the
/// live-in sets are not yet correct across back edges.
pub fn compute_live_ranges(
    graph: &Graph,
    order: &LinearOrder,
    numbering: &Numbering,
    intervals: &mut [LiveInterval],
    liveness: &mut [BlockLiveness],
) -> Result<(), AllocError> {
    for block_id in order.post() {
        let block = graph.block(block_id);
        let block_start = numbering.block_start(block_id);
        let block_end = numbering.block_end(block_id);

        let mut live_in = std::mem::replace(
            &mut liveness[block_id.index()].live_in,
            BitVector::new(0),
        );
        let kill = &mut liveness[block_id.index()].kill;

        // Successor live-ins, and this block's phi contributions to them.
        for successor_id in block.successors() {
            let successor = graph.block(successor_id);
            // A one-block loop names itself as successor; its live-in is
            // the working set already.
            if successor_id != block_id {
                live_in.union(&liveness[successor_id.index()].live_in);
            }
            let phi_input_index = successor
                .predecessor_index_of(block_id)
                .ok_or_else(|| {
                    AllocError::malformed(format!(
                        "{} not a predecessor of {}",
                        block_id, successor_id
                    ))
                })?;
            for &phi in &successor.phis {
                let input = graph.value(phi).inputs[phi_input_index];
                let ssa = numbering.ssa_index(input).ok_or_else(|| {
                    AllocError::malformed(format!("phi input {input} has no reaching definition"))
                })?;
                live_in.set(ssa as usize);
            }
        }

        // Everything live because of successors covers the whole block.
        for ssa in live_in.iter() {
            intervals[ssa].add_range(block_start, block_end);
        }

        for &instr in block.instructions.iter().rev() {
            let value = graph.value(instr);
            let position = numbering.position(instr);

            if let Some(ssa) = numbering.ssa_index(instr) {
                // Kill the definition and shorten its interval.
                kill.set(ssa as usize);
                live_in.clear(ssa as usize);
                intervals[ssa as usize].set_from(position);
            }

            for &input in &value.inputs {
                let ssa = numbering.ssa_index(input).ok_or_else(|| {
                    AllocError::malformed(format!("{input} used at {instr} without a definition"))
                })?;
                live_in.set(ssa as usize);
                intervals[ssa as usize].add_use(instr, position, block_start, false);
            }

            // Environment values must stay live for introspection.
            for &env in &value.environment {
                let ssa = numbering.ssa_index(env).ok_or_else(|| {
                    AllocError::malformed(format!(
                        "{env} referenced by environment of {instr} without a definition"
                    ))
                })?;
                live_in.set(ssa as usize);
                intervals[ssa as usize].add_use(instr, position, block_start, true);
            }
        }

        // Kill phis defined in this block; no full-block range for them.
        for &phi in &block.phis {
            if let Some(ssa) = numbering.ssa_index(phi) {
                kill.set(ssa as usize);
                live_in.clear(ssa as usize);
            }
        }

        // Values live at a loop header entry stay live through the whole
        // loop body, up to the back edge's exit.
        if let Some(info) = block.loop_info.map(|l| graph.loop_info(l)) {
            if info.header == block_id {
                for &back_edge in &info.back_edges {
                    let loop_end = numbering.block_end(back_edge);
                    for ssa in live_in.iter() {
                        intervals[ssa].add_loop_range(block_start, loop_end);
                    }
                }
            }
        }

        liveness[block_id.index()].live_in = live_in;
    }
    Ok(())
}

/// Phase B. Returns the number of full passes until the fixed point.
pub fn compute_live_in_and_out(graph: &Graph, liveness: &mut [BlockLiveness]) -> usize {
    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;

        for block in &graph.blocks {
            // Unreachable blocks have no sets to propagate.
            if liveness[block.id.index()].live_in.capacity() == 0 {
                continue;
            }

            let mut live_out = std::mem::replace(
                &mut liveness[block.id.index()].live_out,
                BitVector::new(0),
            );
            let mut out_changed = false;
            for successor in block.successors() {
                out_changed |= live_out.union(&liveness[successor.index()].live_in);
            }
            let entry = &mut liveness[block.id.index()];
            entry.live_out = live_out;

            // live_in only depends on live_out and the fixed kill set, so
            // it needs updating only when live_out grew.
            if out_changed && entry.live_in.union_if_not_in(&entry.live_out, &entry.kill) {
                changed = true;
            }
        }

        if !changed {
            tracing::debug!(passes, "liveness fixed point reached");
            return passes;
        }
    }
}

/// Build fresh per-block set storage. Unreachable blocks get zero-capacity
/// sets, marking them ignorable to the fixed point.
pub fn make_block_liveness(
    graph: &Graph,
    order: &LinearOrder,
    num_ssa_values: usize,
) -> Vec<BlockLiveness> {
    let mut liveness: Vec<BlockLiveness> = (0..graph.blocks.len())
        .map(|_| BlockLiveness::new(0))
        .collect();
    for block_id in order.linear() {
        liveness[block_id.index()] = BlockLiveness::new(num_ssa_values);
    }
    liveness
}
