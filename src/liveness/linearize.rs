//! Block linearization
//!
//! Orders basic blocks for allocation so that every loop's blocks stay
//! contiguous in the final linear order.
//!
//! # Algorithm
//!
//! Recursive post-order from the entry block. At a two-successor block the
//! traversal order is a local decision:
//!
//! - outside any loop, successors are visited in original order;
//! - when one successor exits the current loop and the other stays inside,
//!   the staying successor is visited first (so the exit path lands later
//!   in post-order and the loop body stays contiguous once reversed);
//! - when one successor opens an inner loop and the other does not, the
//!   inner loop is visited last in post-order.
//!
//! The published linear order is the reverse of the post-order. Unreachable
//! blocks are never visited: they receive no lifetime positions and no
//! intervals, and allocation simply ignores them.

use crate::ir::graph::Graph;
use crate::ir::types::{BlockId, LoopId};
use crate::liveness::bitvec::BitVector;

/// The computed block order, stored as a post-order.
#[derive(Clone, Debug)]
pub struct LinearOrder {
    post_order: Vec<BlockId>,
}

impl LinearOrder {
    /// Blocks in allocation (linear) order: reverse post-order.
    pub fn linear(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.post_order.iter().rev().copied()
    }

    /// Blocks in linear-post order (the reverse of [`Self::linear`]); this
    /// is the direction the backward range builder walks.
    pub fn post(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.post_order.iter().copied()
    }

    /// Number of reachable blocks.
    pub fn len(&self) -> usize {
        self.post_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.post_order.is_empty()
    }
}

/// `to` is either not part of a loop, or `current` is an inner loop of `to`.
fn is_loop_exit(graph: &Graph, current: LoopId, to: Option<LoopId>) -> bool {
    match to {
        None => true,
        Some(to) => current != to && graph.loop_is_in(current, to),
    }
}

fn in_same_loop(first: Option<LoopId>, second: Option<LoopId>) -> bool {
    first == second
}

fn is_inner_loop(graph: &Graph, outer: Option<LoopId>, inner: Option<LoopId>) -> bool {
    match (outer, inner) {
        (Some(outer), Some(inner)) => inner != outer && graph.loop_is_in(inner, outer),
        _ => false,
    }
}

fn visit_block(graph: &Graph, block: BlockId, order: &mut Vec<BlockId>, visited: &mut BitVector) {
    if visited.get(block.index()) {
        return;
    }
    visited.set(block.index());
    let successors: Vec<BlockId> = graph.block(block).successors().collect();
    match successors.len() {
        0 => {}
        1 => visit_block(graph, successors[0], order, visited),
        2 => {
            let mut first = successors[0];
            let mut second = successors[1];
            let my_loop = graph.block(block).loop_info;
            let first_loop = graph.block(first).loop_info;
            let second_loop = graph.block(second).loop_info;

            if let Some(my_loop) = my_loop {
                if is_loop_exit(graph, my_loop, second_loop) && in_same_loop(Some(my_loop), first_loop)
                {
                    // Visit the loop exit first in post order.
                    std::mem::swap(&mut first, &mut second);
                } else if is_inner_loop(graph, Some(my_loop), first_loop)
                    && !is_inner_loop(graph, Some(my_loop), second_loop)
                {
                    // Visit the inner loop last in post order.
                    std::mem::swap(&mut first, &mut second);
                }
            }
            visit_block(graph, first, order, visited);
            visit_block(graph, second, order, visited);
        }
        n => unreachable!("block {} has {} successors", block, n),
    }
    order.push(block);
}

/// Compute the allocation order for a graph.
pub fn linearize(graph: &Graph) -> LinearOrder {
    let mut post_order = Vec::with_capacity(graph.blocks.len());
    let mut visited = BitVector::new(graph.blocks.len());
    visit_block(graph, graph.entry, &mut post_order, &mut visited);
    tracing::debug!(
        blocks = post_order.len(),
        total = graph.blocks.len(),
        "linearized graph"
    );
    LinearOrder { post_order }
}
