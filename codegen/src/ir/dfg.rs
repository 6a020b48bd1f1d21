//! The data-flow graph: instruction payloads and the value def/use graph.
//!
//! `DataFlowGraph` owns every `Value`, `Inst`, `Block`, `Signature`,
//! `FuncRef`, and `JumpTable` in a `Function`. It knows nothing about
//! block *order* or per-block instruction *order* — that's `Layout`'s job
//! (kept as a separate struct so construction can create instructions
//! before deciding where they land, exactly as the teacher's DFG/Layout
//! split allows).

use crate::ir::entities::{
    AnyEntity, Block, ExternalName, FuncRef, Inst, JumpTable, JumpTableData, Linkage, SigRef,
    Value,
};
use crate::ir::instructions::InstructionData;
use crate::ir::signature::Signature;
use crate::ir::types::Type;
use retarget_entity::{entity_impl, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

/// How a `Value` came to exist: either an instruction result or a block
/// parameter. Either way it carries its own type so `dfg.value_type(v)` is
/// an O(1) lookup with no need to walk back to the defining instruction
/// and recompute it.
#[derive(Clone, Debug, PartialEq)]
enum ValueData {
    Inst { ty: Type, inst: Inst, num: u16 },
    Param { ty: Type, block: Block, num: u16 },
}

/// An external function reference: its name, signature, and linkage.
#[derive(Clone, Debug)]
pub struct ExtFuncData {
    pub name: ExternalName,
    pub signature: SigRef,
    pub linkage: Linkage,
}

#[derive(Clone, Debug, Default)]
struct BlockData {
    params: Vec<Value>,
    is_landing_pad: bool,
    /// Frozen after the verifier runs; catches late `append_block_param`
    /// calls that would otherwise silently desync call-site argument
    /// counts that were already checked.
    params_frozen: bool,
}

/// A unique id handed out per inserted instruction, independent of the
/// `Inst` entity itself, so `InstKey` can be used as `PrimaryMap` storage
/// shape without import cycles. (Kept distinct from `Inst` to mirror the
/// teacher's own separation of "inst data" storage from "inst identity".)
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct InstKeyMarker(u32);
entity_impl!(InstKeyMarker);

/// Owns all SSA values, instructions, blocks, signatures, external
/// function refs, and jump tables of one `Function`.
#[derive(Default)]
pub struct DataFlowGraph {
    insts: PrimaryMap<Inst, InstructionData>,
    results: SecondaryMap<Inst, SmallVec<[Value; 2]>>,
    values: PrimaryMap<Value, ValueDataSlot>,
    blocks: PrimaryMap<Block, BlockData>,
    signatures: PrimaryMap<SigRef, Signature>,
    ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,
    jump_tables: PrimaryMap<JumpTable, JumpTableData>,
}

#[derive(Clone, Debug, Default)]
struct ValueDataSlot(Option<ValueData>);

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- blocks ----

    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        &self.blocks[block].params
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        assert!(
            !self.blocks[block].params_frozen,
            "block parameter list is frozen after verification"
        );
        let num = self.blocks[block].params.len() as u16;
        let value = self.values.push(ValueDataSlot(Some(ValueData::Param {
            ty,
            block,
            num,
        })));
        self.blocks[block].params.push(value);
        value
    }

    pub fn set_block_params(&mut self, block: Block, types: &[Type]) {
        assert!(self.blocks[block].params.is_empty());
        for &ty in types {
            self.append_block_param(block, ty);
        }
    }

    pub fn freeze_block_params(&mut self, block: Block) {
        self.blocks[block].params_frozen = true;
    }

    pub fn freeze_all_block_params(&mut self) {
        for (_, data) in self.blocks.iter_mut() {
            data.params_frozen = true;
        }
    }

    pub fn set_landing_pad(&mut self, block: Block, is_landing_pad: bool) {
        self.blocks[block].is_landing_pad = is_landing_pad;
    }

    pub fn is_landing_pad(&self, block: Block) -> bool {
        self.blocks[block].is_landing_pad
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    // ---- instructions ----

    /// Create an instruction from its payload. It is not yet attached to
    /// any block — that happens via `Layout::append_inst`.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        self.insts.push(data)
    }

    pub fn inst_data(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    pub fn inst_data_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    pub fn replace_inst(&mut self, inst: Inst, data: InstructionData) {
        self.insts[inst] = data;
    }

    /// Append a result value to `inst`. The opcode determines result arity
    /// (see `opcode_result_arity`); calling this more times than the
    /// opcode's arity allows is a `ConstructionError` the builder rejects
    /// before ever reaching here.
    pub fn append_result(&mut self, inst: Inst, ty: Type) -> Value {
        let num = self.results[inst].len() as u16;
        let value = self.values.push(ValueDataSlot(Some(ValueData::Inst {
            ty,
            inst,
            num,
        })));
        self.results[inst].push(value);
        value
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        &self.results[inst]
    }

    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst][0]
    }

    // ---- values ----

    pub fn value_type(&self, value: Value) -> Type {
        match self.values[value].0.as_ref().expect("stale Value") {
            ValueData::Inst { ty, .. } => *ty,
            ValueData::Param { ty, .. } => *ty,
        }
    }

    /// The block that dominates every use of `value`: the block the
    /// defining instruction lives in (resolved via `Layout`), or the block
    /// the parameter belongs to.
    pub fn value_def_block(&self, value: Value, layout: &crate::ir::layout::Layout) -> Block {
        match self.values[value].0.as_ref().expect("stale Value") {
            ValueData::Inst { inst, .. } => layout
                .inst_block(*inst)
                .expect("value's defining instruction is not laid out"),
            ValueData::Param { block, .. } => *block,
        }
    }

    pub fn value_def_inst(&self, value: Value) -> Option<Inst> {
        match self.values[value].0.as_ref().expect("stale Value") {
            ValueData::Inst { inst, .. } => Some(*inst),
            ValueData::Param { .. } => None,
        }
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    // ---- signatures / external functions / jump tables ----

    pub fn import_signature(&mut self, sig: Signature) -> SigRef {
        self.signatures.push(sig)
    }

    pub fn signature(&self, sig_ref: SigRef) -> &Signature {
        &self.signatures[sig_ref]
    }

    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.ext_funcs.push(data)
    }

    pub fn ext_func(&self, func_ref: FuncRef) -> &ExtFuncData {
        &self.ext_funcs[func_ref]
    }

    pub fn func_signature(&self, func_ref: FuncRef) -> &Signature {
        &self.signatures[self.ext_funcs[func_ref].signature]
    }

    pub fn create_jump_table(&mut self, data: JumpTableData) -> JumpTable {
        self.jump_tables.push(data)
    }

    pub fn jump_table(&self, jt: JumpTable) -> &JumpTableData {
        &self.jump_tables[jt]
    }

    pub fn display_entity(&self, e: impl Into<AnyEntity>) -> AnyEntity {
        e.into()
    }
}
