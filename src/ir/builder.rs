//! Graph builder utilities
//!
//! This module provides a builder pattern for constructing allocator input
//! graphs. Use counts are wired as values are connected, so the builder is
//! the single source of truth for which values are observable to allocation.

use crate::ir::graph::{Block, Graph, LoopInfo, Terminator, Value};
use crate::ir::types::{BlockId, BlockIdAllocator, LoopId, VReg, ValueId, ValueIdAllocator};

/// Builder for constructing an allocator input [`Graph`]
pub struct GraphBuilder {
    block_alloc: BlockIdAllocator,
    value_alloc: ValueIdAllocator,
    blocks: Vec<Block>,
    values: Vec<Value>,
    loops: Vec<LoopInfo>,
    /// Block currently being built
    current_block: Option<BlockId>,
    current_phis: Vec<ValueId>,
    current_instructions: Vec<ValueId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            block_alloc: BlockIdAllocator::new(),
            value_alloc: ValueIdAllocator::new(),
            blocks: Vec::new(),
            values: Vec::new(),
            loops: Vec::new(),
            current_block: None,
            current_phis: Vec::new(),
            current_instructions: Vec::new(),
        }
    }

    /// Reserve a new block ID without starting to build it
    pub fn new_block(&mut self) -> BlockId {
        let id = self.block_alloc.fresh();
        self.blocks.push(Block {
            id,
            phis: Vec::new(),
            instructions: Vec::new(),
            terminator: Terminator::Return,
            predecessors: Vec::new(),
            loop_info: None,
        });
        id
    }

    /// Start filling in a previously reserved block
    pub fn start_block(&mut self, id: BlockId) {
        assert!(
            self.current_block.is_none(),
            "Must finish current block before starting a new one"
        );
        self.current_block = Some(id);
        self.current_phis.clear();
        self.current_instructions.clear();
    }

    /// Add a phi to the current block. Inputs must follow the order of the
    /// block's predecessor list.
    pub fn add_phi(&mut self, inputs: Vec<ValueId>) -> ValueId {
        let block = self.current_block.expect("No block started");
        let id = self.new_value(block, true, inputs, Vec::new());
        self.current_phis.push(id);
        id
    }

    /// Add a regular instruction to the current block
    pub fn add_instr(&mut self, inputs: Vec<ValueId>) -> ValueId {
        let block = self.current_block.expect("No block started");
        let id = self.new_value(block, false, inputs, Vec::new());
        self.current_instructions.push(id);
        id
    }

    /// Add a regular instruction carrying an environment (introspection)
    /// value list in addition to its code inputs
    pub fn add_instr_with_env(&mut self, inputs: Vec<ValueId>, env: Vec<ValueId>) -> ValueId {
        let block = self.current_block.expect("No block started");
        let id = self.new_value(block, false, inputs, env);
        self.current_instructions.push(id);
        id
    }

    /// Append a phi input after the fact. Loop-carried phis reference
    /// values that do not exist yet while the header is being built; wire
    /// the back-edge input once the loop body is done.
    pub fn push_phi_input(&mut self, phi: ValueId, input: ValueId) {
        debug_assert!(self.values[phi.index()].is_phi);
        self.values[input.index()].use_count += 1;
        self.values[phi.index()].inputs.push(input);
    }

    /// Give a value a virtual-register home (frame slot identity)
    pub fn set_vreg(&mut self, value: ValueId, vreg: VReg) {
        self.values[value.index()].vreg = Some(vreg);
    }

    /// Mark a value as wide (64-bit on a narrow register file)
    pub fn set_wide(&mut self, value: ValueId) {
        self.values[value.index()].wide = true;
    }

    /// Finish the current block with a terminator and its predecessor list
    pub fn finish_block(&mut self, terminator: Terminator, predecessors: Vec<BlockId>) {
        let id = self.current_block.take().expect("No block to finish");
        let block = &mut self.blocks[id.index()];
        block.phis = std::mem::take(&mut self.current_phis);
        block.instructions = std::mem::take(&mut self.current_instructions);
        block.terminator = terminator;
        block.predecessors = predecessors;
    }

    /// Register a loop; returns its ID for nesting and membership marking
    pub fn add_loop(
        &mut self,
        header: BlockId,
        back_edges: Vec<BlockId>,
        parent: Option<LoopId>,
    ) -> LoopId {
        let id = LoopId(self.loops.len() as u32);
        self.loops.push(LoopInfo {
            header,
            back_edges,
            parent,
        });
        id
    }

    /// Mark a block as belonging to its innermost enclosing loop
    pub fn set_block_loop(&mut self, block: BlockId, loop_id: LoopId) {
        self.blocks[block.index()].loop_info = Some(loop_id);
    }

    /// Finish the graph with the given entry block
    pub fn finish(self, entry: BlockId) -> Graph {
        assert!(self.current_block.is_none(), "Unfinished block");
        Graph {
            entry,
            blocks: self.blocks,
            values: self.values,
            loops: self.loops,
        }
    }

    fn new_value(
        &mut self,
        block: BlockId,
        is_phi: bool,
        inputs: Vec<ValueId>,
        environment: Vec<ValueId>,
    ) -> ValueId {
        let id = self.value_alloc.fresh();
        for &input in inputs.iter().chain(environment.iter()) {
            self.values[input.index()].use_count += 1;
        }
        self.values.push(Value {
            id,
            block,
            is_phi,
            inputs,
            environment,
            vreg: None,
            wide: false,
            use_count: 0,
        });
        id
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
