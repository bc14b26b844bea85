//! SSA liveness analysis
//!
//! This module turns a method's CFG into the liveness information the
//! register pool consumes: a linear block order, dense lifetime positions,
//! and one live interval per SSA value.
//!
//! # Pipeline
//!
//! ```text
//! Graph → Linearize → Number instructions → Live ranges → Fixed point
//! ```

pub mod bitvec;
pub mod interval;
pub mod linearize;
pub mod numbering;
pub mod ranges;

pub use bitvec::BitVector;
pub use interval::{LiveInterval, LiveRange, UsePosition};
pub use linearize::{linearize, LinearOrder};
pub use numbering::{number_instructions, Numbering};
pub use ranges::BlockLiveness;

use crate::error::AllocError;
use crate::ir::graph::Graph;
use crate::ir::types::{BlockId, ValueId};

/// The complete liveness picture of one method.
///
/// Owns every analysis product; dropping it reclaims the whole method's
/// analysis memory at once.
#[derive(Debug)]
pub struct SsaLiveness {
    order: LinearOrder,
    numbering: Numbering,
    intervals: Vec<LiveInterval>,
    block_liveness: Vec<BlockLiveness>,
    fixed_point_passes: usize,
}

impl SsaLiveness {
    /// Run the full analysis: validation, linearization, numbering, range
    /// construction, and the back-edge fixed point.
    pub fn analyze(graph: &Graph) -> Result<SsaLiveness, AllocError> {
        graph.validate()?;
        let order = linearize::linearize(graph);
        let (numbering, mut intervals) = numbering::number_instructions(graph, &order);
        let mut block_liveness =
            ranges::make_block_liveness(graph, &order, numbering.num_ssa_values());
        ranges::compute_live_ranges(graph, &order, &numbering, &mut intervals, &mut block_liveness)?;
        let fixed_point_passes = ranges::compute_live_in_and_out(graph, &mut block_liveness);
        Ok(SsaLiveness {
            order,
            numbering,
            intervals,
            block_liveness,
            fixed_point_passes,
        })
    }

    pub fn order(&self) -> &LinearOrder {
        &self.order
    }

    pub fn numbering(&self) -> &Numbering {
        &self.numbering
    }

    pub fn num_ssa_values(&self) -> usize {
        self.numbering.num_ssa_values()
    }

    pub fn interval(&self, ssa_index: usize) -> &LiveInterval {
        &self.intervals[ssa_index]
    }

    /// Interval of a value, if the value is observable to allocation.
    pub fn interval_of(&self, value: ValueId) -> Option<&LiveInterval> {
        self.numbering
            .ssa_index(value)
            .map(|ssa| &self.intervals[ssa as usize])
    }

    pub fn live_in(&self, block: BlockId) -> &BitVector {
        &self.block_liveness[block.index()].live_in
    }

    pub fn live_out(&self, block: BlockId) -> &BitVector {
        &self.block_liveness[block.index()].live_out
    }

    pub fn kill(&self, block: BlockId) -> &BitVector {
        &self.block_liveness[block.index()].kill
    }

    /// Full passes the fixed point needed; proportional to loop nesting
    /// depth for well-nested loops.
    pub fn fixed_point_passes(&self) -> usize {
        self.fixed_point_passes
    }
}
