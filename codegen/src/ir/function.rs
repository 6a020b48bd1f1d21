//! `Function`: the top-level IR unit this crate compiles one of at a time.

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::StackSlot;
use crate::ir::layout::Layout;
use crate::ir::signature::Signature;
use core::fmt;
use retarget_entity::PrimaryMap;

/// A symbolic stack slot's size and alignment; resolved to a concrete
/// frame offset by the ABI layer once the frame is finalized (spill slot
/// count is only known after register allocation).
#[derive(Copy, Clone, Debug)]
pub struct StackSlotData {
    pub size: u32,
    pub align_shift: u8,
}

impl StackSlotData {
    pub fn new(size: u32, align_shift: u8) -> Self {
        Self { size, align_shift }
    }
}

/// A function body: owns its `DataFlowGraph` (instruction/value/block
/// arenas), its `Layout` (block order, per-block instruction order), its
/// own external signature, and its stack slots. Destroying the `Function`
/// frees all of them; nothing outlives it by reference.
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub stack_slots: PrimaryMap<StackSlot, StackSlotData>,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            stack_slots: PrimaryMap::new(),
        }
    }

    pub fn create_stack_slot(&mut self, data: StackSlotData) -> StackSlot {
        self.stack_slots.push(data)
    }

    pub fn entry_block(&self) -> Option<crate::ir::entities::Block> {
        self.layout.entry_block()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        crate::ir::write::write_function(f, self)
    }
}
