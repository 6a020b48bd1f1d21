//! A control flow graph: per-block predecessor and successor sets,
//! computed on demand from the `Layout` by scanning every block's
//! terminator (spec.md §4.2).
//!
//! Successors are ordinary blocks; predecessors are `(block, branching
//! instruction)` pairs, since a block may reach the same successor through
//! more than one instruction only by having more than one terminator,
//! which the verifier forbids — so in practice each predecessor tuple is
//! unique per edge. `try_call`'s exception edge is tracked separately from
//! its ordinary (fallthrough) successor so critical-edge and dominance
//! analysis can treat them uniformly while the ABI/emit layers still know
//! which is which.

use crate::ir::{Block, Function, Inst};
use retarget_entity::SecondaryMap;

/// A basic block denoted by its enclosing `Block` and terminator.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BasicBlock {
    pub block: Block,
    pub inst: Inst,
}

#[derive(Clone, Default)]
struct CFGNode {
    predecessors: Vec<(Inst, Block)>,
    successors: Vec<Block>,
    exception_successors: Vec<Block>,
}

/// Predecessor/successor maps for every block in a function, plus
/// exception-edge tracking for `try_call`.
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CFGNode>,
    valid: bool,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self {
            data: SecondaryMap::new(),
            valid: false,
        }
    }

    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    pub fn compute(&mut self, func: &Function) {
        self.data = SecondaryMap::new();
        self.valid = false;

        for block in func.layout.blocks() {
            if let Some(inst) = func.layout.last_inst(block) {
                let data = func.dfg.inst_data(inst);
                for dest in data.branch_destinations() {
                    self.add_edge(block, inst, dest.block, false);
                }
                // `try_call`'s exception edge is the second destination
                // `branch_destinations` reports; everything else there
                // (Jump, BranchZ) is ordinary control flow.
                if matches!(data.opcode(), crate::ir::Opcode::TryCall) {
                    let dests = data.branch_destinations();
                    if dests.len() == 2 {
                        // Already recorded as an ordinary successor above;
                        // promote the second edge to "exception" as well
                        // so callers that want only normal successors can
                        // filter it out.
                        self.mark_exception(block, dests[1].block);
                    }
                }
                if let crate::ir::InstructionData::BranchTable { table, .. } = data {
                    for dest in func.dfg.jump_table(*table).all_branches() {
                        self.add_edge(block, inst, dest.block, false);
                    }
                }
            }
        }

        self.valid = true;
    }

    fn add_edge(&mut self, from: Block, inst: Inst, to: Block, exception: bool) {
        self.data[from].successors.push(to);
        self.data[to].predecessors.push((inst, from));
        if exception {
            self.data[from].exception_successors.push(to);
        }
    }

    fn mark_exception(&mut self, from: Block, to: Block) {
        self.data[from].exception_successors.push(to);
    }

    pub fn succ_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.data[block].successors.iter().copied()
    }

    pub fn exception_succ_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.data[block].exception_successors.iter().copied()
    }

    pub fn pred_iter(&self, block: Block) -> impl Iterator<Item = BasicBlock> + '_ {
        self.data[block]
            .predecessors
            .iter()
            .map(|&(inst, block)| BasicBlock { block, inst })
    }

    pub fn num_preds(&self, block: Block) -> usize {
        self.data[block].predecessors.len()
    }

    pub fn num_succs(&self, block: Block) -> usize {
        self.data[block].successors.len()
    }

    /// An edge `A->B` is critical iff `A` has more than one successor and
    /// `B` has more than one predecessor.
    pub fn is_critical_edge(&self, from: Block, to: Block) -> bool {
        self.num_succs(from) > 1 && self.num_preds(to) > 1
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
