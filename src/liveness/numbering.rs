//! Lifetime numbering
//!
//! A single forward pass over the linear order stamps a dense, strictly
//! increasing position on every block entry, every regular instruction,
//! and every block exit. Phis share their block's entry position: they are
//! available from the very top of the block. Values with zero uses are
//! skipped for SSA indexing and consume no position of their own.

use crate::ir::graph::Graph;
use crate::ir::types::{BlockId, ValueId};
use crate::liveness::interval::LiveInterval;
use crate::liveness::linearize::LinearOrder;

/// Position tables produced by numbering.
#[derive(Clone, Debug)]
pub struct Numbering {
    /// Lifetime position of each block's entry, indexed by block; zero for
    /// unreachable blocks
    block_start: Vec<u32>,
    /// Lifetime position of each block's exit
    block_end: Vec<u32>,
    /// Lifetime position of each value; zero for values in unreachable code
    positions: Vec<u32>,
    /// Dense SSA index of each value with at least one use
    ssa_indices: Vec<Option<u32>>,
    /// Values ordered by SSA index
    values_by_ssa_index: Vec<ValueId>,
}

impl Numbering {
    pub fn block_start(&self, block: BlockId) -> u32 {
        self.block_start[block.index()]
    }

    pub fn block_end(&self, block: BlockId) -> u32 {
        self.block_end[block.index()]
    }

    pub fn position(&self, value: ValueId) -> u32 {
        self.positions[value.index()]
    }

    pub fn ssa_index(&self, value: ValueId) -> Option<u32> {
        self.ssa_indices[value.index()]
    }

    pub fn value_at_ssa_index(&self, ssa_index: usize) -> ValueId {
        self.values_by_ssa_index[ssa_index]
    }

    /// Total count of indexed values; sizes every liveness bit-vector.
    pub fn num_ssa_values(&self) -> usize {
        self.values_by_ssa_index.len()
    }
}

/// Stamp positions and SSA indices over the linear order. Returns the
/// tables plus one empty interval per indexed value.
pub fn number_instructions(graph: &Graph, order: &LinearOrder) -> (Numbering, Vec<LiveInterval>) {
    let mut numbering = Numbering {
        block_start: vec![0; graph.blocks.len()],
        block_end: vec![0; graph.blocks.len()],
        positions: vec![0; graph.values.len()],
        ssa_indices: vec![None; graph.values.len()],
        values_by_ssa_index: Vec::new(),
    };
    let mut position: u32 = 0;

    for block_id in order.linear() {
        let block = graph.block(block_id);
        position += 1;
        numbering.block_start[block_id.index()] = position;

        for &phi in &block.phis {
            if graph.value(phi).has_uses() {
                numbering.ssa_indices[phi.index()] =
                    Some(numbering.values_by_ssa_index.len() as u32);
                numbering.values_by_ssa_index.push(phi);
            }
            numbering.positions[phi.index()] = position;
        }

        for &instr in &block.instructions {
            if graph.value(instr).has_uses() {
                position += 1;
                numbering.ssa_indices[instr.index()] =
                    Some(numbering.values_by_ssa_index.len() as u32);
                numbering.values_by_ssa_index.push(instr);
            }
            // Unused values consume no position slot; they are not
            // observable to allocation.
            numbering.positions[instr.index()] = position;
        }

        position += 1;
        numbering.block_end[block_id.index()] = position;
    }

    let intervals = vec![LiveInterval::new(); numbering.num_ssa_values()];
    tracing::debug!(
        ssa_values = numbering.num_ssa_values(),
        last_position = position,
        "numbered instructions"
    );
    (numbering, intervals)
}
