//! Block order and per-block instruction order.
//!
//! Kept separate from `DataFlowGraph` so a client can create instructions
//! before deciding (or while still deciding) where they land. Internally
//! this is a `Vec<Block>` plus one `Vec<Inst>` per block rather than the
//! teacher's intrusive doubly-linked list: this crate never needs mid-pass
//! instruction insertion/removal the way a legalizer or GVN pass would (out
//! of scope per spec.md §1), so the simpler representation is cheaper to
//! get right. `Block` ordering is the client's choice; it influences branch
//! polarity and range (see `machinst::lower`).

use crate::ir::entities::{Block, Inst};
use retarget_entity::SecondaryMap;

#[derive(Clone, Debug, Default)]
struct BlockLayout {
    insts: Vec<Inst>,
}

#[derive(Default)]
pub struct Layout {
    block_order: Vec<Block>,
    blocks: SecondaryMap<Block, BlockLayout>,
    inst_block: SecondaryMap<Inst, Option<Block>>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_block(&mut self, block: Block) {
        self.block_order.push(block);
    }

    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        self.blocks[block].insts.push(inst);
        self.inst_block[inst] = Some(block);
    }

    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block].insts
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        *self.inst_block.get(inst)
    }

    /// Blocks in layout order (the order `append_block` established).
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.block_order.iter().copied()
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.block_order.first().copied()
    }

    /// Position of `inst` within its block's instruction list.
    pub fn inst_position(&self, inst: Inst, block: Block) -> Option<usize> {
        self.blocks[block].insts.iter().position(|&i| i == inst)
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].insts.last().copied()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_order.len()
    }
}
