//! CFG and SSA value definitions
//!
//! A [`Graph`] is the allocator's view of one method: basic blocks holding
//! phis and regular instructions, block terminators, and loop metadata. It
//! arrives fully built from the upstream SSA construction stage; the
//! allocator never changes its topology.

use crate::error::AllocError;
use crate::ir::types::{BlockId, LoopId, VReg, ValueId};

/// Block terminator; successors are derived from it.
///
/// Higher-arity control flow (switches) is modeled upstream as chained
/// two-way blocks, so a block has 0, 1, or exactly 2 successors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// Leave the method; no successors
    Return,
    /// Unconditional jump
    Goto(BlockId),
    /// Two-way conditional branch
    Branch { taken: BlockId, fallthrough: BlockId },
}

impl Terminator {
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        let pair: [Option<BlockId>; 2] = match *self {
            Terminator::Return => [None, None],
            Terminator::Goto(target) => [Some(target), None],
            Terminator::Branch { taken, fallthrough } => [Some(taken), Some(fallthrough)],
        };
        pair.into_iter().flatten()
    }
}

/// A basic block: ordered phis, ordered regular instructions, a terminator,
/// and optional membership in the innermost enclosing loop.
#[derive(Clone, Debug)]
pub struct Block {
    pub id: BlockId,
    /// Phi values at block entry (SSA merge points)
    pub phis: Vec<ValueId>,
    /// Regular instructions in program order
    pub instructions: Vec<ValueId>,
    pub terminator: Terminator,
    /// Predecessor blocks, in the order phi inputs are keyed on
    pub predecessors: Vec<BlockId>,
    /// Innermost enclosing loop, if any
    pub loop_info: Option<LoopId>,
}

impl Block {
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.terminator.successors()
    }

    /// Index of `pred` in this block's predecessor list; phi inputs are
    /// keyed on this index.
    pub fn predecessor_index_of(&self, pred: BlockId) -> Option<usize> {
        self.predecessors.iter().position(|&p| p == pred)
    }
}

/// A natural loop: its header block and the block(s) closing it with a
/// back edge. Owned by the upstream CFG builder; queried, never mutated.
#[derive(Clone, Debug)]
pub struct LoopInfo {
    pub header: BlockId,
    pub back_edges: Vec<BlockId>,
    /// Enclosing loop, if this loop is nested
    pub parent: Option<LoopId>,
}

/// One SSA value: a single definition point with zero or more inputs.
///
/// `environment` is the secondary, non-code list of values that must stay
/// live for introspection (e.g. exception state capture). Values with
/// `use_count == 0` are invisible to allocation: they receive no SSA index
/// and no live interval.
#[derive(Clone, Debug)]
pub struct Value {
    pub id: ValueId,
    /// Defining block
    pub block: BlockId,
    pub is_phi: bool,
    /// Code inputs (other SSA values)
    pub inputs: Vec<ValueId>,
    /// Introspection inputs; kept live but not register operands
    pub environment: Vec<ValueId>,
    /// Virtual-register home, if the value has one; transient values spill
    /// to compiler temps instead
    pub vreg: Option<VReg>,
    /// Occupies two machine registers on a narrow register file
    pub wide: bool,
    /// Number of value/environment lists this value appears in
    pub use_count: u32,
}

impl Value {
    pub fn has_uses(&self) -> bool {
        self.use_count > 0
    }
}

/// The CFG of one method, in SSA form with resolved types.
#[derive(Clone, Debug)]
pub struct Graph {
    pub entry: BlockId,
    pub blocks: Vec<Block>,
    pub values: Vec<Value>,
    pub loops: Vec<LoopInfo>,
}

impl Graph {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn loop_info(&self, id: LoopId) -> &LoopInfo {
        &self.loops[id.index()]
    }

    /// Is `inner` nested inside (or equal to) `outer`?
    ///
    /// The walk is bounded by the loop count, so a malformed cyclic parent
    /// chain terminates with `false` instead of spinning.
    pub fn loop_is_in(&self, inner: LoopId, outer: LoopId) -> bool {
        let mut current = Some(inner);
        for _ in 0..=self.loops.len() {
            match current {
                Some(id) if id == outer => return true,
                Some(id) => current = self.loop_info(id).parent,
                None => return false,
            }
        }
        false
    }

    /// Structural validation of upstream invariants.
    ///
    /// The core operates on already-verified SSA; a violation here is a
    /// contract bug in the IR producer, reported so the driver can skip the
    /// method rather than abort the whole compilation run.
    pub fn validate(&self) -> Result<(), AllocError> {
        if self.entry.index() >= self.blocks.len() {
            return Err(AllocError::malformed("entry block out of range"));
        }
        for block in &self.blocks {
            for succ in block.successors() {
                if succ.index() >= self.blocks.len() {
                    return Err(AllocError::malformed(format!(
                        "{} branches to out-of-range {}",
                        block.id, succ
                    )));
                }
                if self.block(succ).predecessor_index_of(block.id).is_none() {
                    return Err(AllocError::malformed(format!(
                        "{} missing from predecessor list of {}",
                        block.id, succ
                    )));
                }
            }
            for &phi in &block.phis {
                let value = self.value(phi);
                if !value.is_phi {
                    return Err(AllocError::malformed(format!("{phi} in phi list is not a phi")));
                }
                if value.inputs.len() != block.predecessors.len() {
                    return Err(AllocError::malformed(format!(
                        "{} has {} inputs for {} predecessors of {}",
                        phi,
                        value.inputs.len(),
                        block.predecessors.len(),
                        block.id
                    )));
                }
            }
        }
        for (index, info) in self.loops.iter().enumerate() {
            let id = LoopId(index as u32);
            // A parent chain longer than the loop count must revisit a loop.
            let mut current = info.parent;
            for steps in 0.. {
                match current {
                    None => break,
                    Some(parent) if parent.index() >= self.loops.len() => {
                        return Err(AllocError::malformed(format!(
                            "{id} nested under out-of-range {parent}"
                        )));
                    }
                    Some(_) if steps >= self.loops.len() => {
                        return Err(AllocError::malformed(format!(
                            "parent chain of {id} is cyclic"
                        )));
                    }
                    Some(parent) => current = self.loop_info(parent).parent,
                }
            }
            match self.block(info.header).loop_info {
                Some(header_loop) if self.loop_is_in(header_loop, id) => {}
                _ => {
                    return Err(AllocError::malformed(format!(
                        "header {} is not a member of {}",
                        info.header, id
                    )))
                }
            }
            if info.back_edges.is_empty() {
                return Err(AllocError::malformed(format!("{id} has no back edge")));
            }
            for &back_edge in &info.back_edges {
                let in_loop = self
                    .block(back_edge)
                    .loop_info
                    .is_some_and(|l| self.loop_is_in(l, id));
                if !in_loop {
                    return Err(AllocError::malformed(format!(
                        "back edge {} of {} lies outside the loop",
                        back_edge, id
                    )));
                }
            }
        }
        Ok(())
    }
}
