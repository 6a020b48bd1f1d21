//! `Context`: the single-function compile pipeline (spec.md §4.9, §6).
//!
//! `Backend` is the per-ISA plug point — everything that differs between
//! x64 and AArch64 (rule table, register pools, prologue/epilogue shape,
//! unwind encoding) is gathered here behind one non-object-safe trait.
//! `isa::TargetIsa` erases `Backend::Inst`/`Backend::Abi` so a `Context`
//! can hold a target without naming it at the type level.

use std::collections::HashMap;

use retarget_entity::EntityRef;

use crate::binemit::buffer::MachBuffer;
use crate::binemit::reloc::{Reloc, RelocKind};
use crate::binemit::unwind::UnwindInfo;
use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, CallConv, Function, StackSlot};
use crate::machinst::abi::{assign_arguments, AbiMachineSpec, ArgLoc, FrameLayout};
use crate::machinst::lower::{lower_function, LowerCtx, RuleTable};
use crate::machinst::reg::{PReg, RegClass, RegRef};
use crate::machinst::vcode::{BranchTarget, MachInst, ParallelMove, VCode};
use crate::regalloc;
use crate::result::CodegenResult;
use crate::settings::Flags;
use crate::verifier::verify_function;

/// Everything `compile_with_backend` needs from one target ISA. Not
/// object-safe (associated types) — `isa::TargetIsa` is the object-safe
/// wrapper clients actually hold.
pub trait Backend {
    type Inst: MachInst;
    type Abi: AbiMachineSpec;

    fn rule_table() -> RuleTable<Self::Inst>;
    fn allocatable_int() -> &'static [PReg];
    fn allocatable_float() -> &'static [PReg];
    fn scratch_int() -> PReg;

    /// The register a `try_call`'s callee leaves the exception value in on
    /// the exception edge — the same register an ordinary call's first
    /// integer return value comes back in (RAX / X0), per this target's
    /// calling convention. `bind_landing_pads` moves out of it into the
    /// landing pad's exception-value vreg.
    fn exception_value_reg() -> PReg;

    /// Registers a prologue/epilogue may need to save beyond the frame
    /// pointer (which every backend here handles unconditionally via its
    /// own dedicated push/pop or `stp`/`ldp`). `compile_with_backend` only
    /// saves the ones actually referenced in the final `VCode`.
    fn callee_saved_candidates() -> &'static [PReg];

    fn is_return(inst: &Self::Inst) -> bool;
    fn gen_jump(target: BranchTarget) -> Self::Inst;
    fn gen_prologue(frame: &FrameLayout) -> Vec<Self::Inst>;
    fn gen_epilogue(frame: &FrameLayout) -> Vec<Self::Inst>;

    /// Rewrite every `MachInst::load_incoming_stack_arg` placeholder left
    /// by `bind_incoming_args` into a real load, now that `frame` (and so
    /// the frame-pointer-relative base those placeholders are measured
    /// from) is finalized. Runs once, right after register allocation and
    /// before `splice_prologue_epilogue`.
    fn finalize_incoming_stack_args(vcode: &mut VCode<Self::Inst>, frame: &FrameLayout);
    fn unwind_info(frame: &FrameLayout, call_conv: CallConv) -> Option<UnwindInfo>;
    fn reloc_kind_hint() -> RelocKind;
}

/// The final product of one `compile_function` call (spec.md §4.9).
#[derive(Clone, Debug)]
pub struct CompiledCode {
    pub bytes: Vec<u8>,
    pub relocs: Vec<Reloc>,
    pub unwind: Option<UnwindInfo>,
    pub code_size: u32,
}

fn round_up(x: u32, align: u32) -> u32 {
    if align == 0 {
        x
    } else {
        (x + align - 1) / align * align
    }
}

/// Frame-relative offsets for a function's declared stack slots, assigned
/// in declaration order (spec.md §4.3 "Stack slots"). Spill slots are
/// assigned later, by the register allocator, starting right after this
/// region.
fn compute_stack_slot_offsets(func: &Function) -> (HashMap<StackSlot, i32>, u32) {
    let mut offsets = HashMap::new();
    let mut cursor: u32 = 0;
    for (ss, data) in func.stack_slots.iter() {
        let align = 1u32 << data.align_shift;
        cursor = round_up(cursor, align);
        offsets.insert(ss, cursor as i32);
        cursor += data.size;
    }
    (offsets, cursor)
}

/// `assign_arguments` only places arguments; the incoming stack-argument
/// area a callee's frame must reserve is the high-water mark of whatever
/// it placed on the stack. Non-zero once a signature has more scalar
/// arguments than the calling convention has registers for (`bind_incoming_args`
/// reads the same placement to load each one). Outgoing call/return
/// arguments are a separate, still-unsupported case — see `DESIGN.md`.
fn compute_incoming_stack_arg_area<B: Backend>(func: &Function, call_conv: CallConv) -> u32 {
    let assigns = assign_arguments::<B::Abi>(&func.signature.params, call_conv, None);
    let mut max_end = 0u32;
    for a in &assigns {
        for loc in &a.locs {
            let stack_off = match loc {
                ArgLoc::Stack(off) => Some(*off),
                ArgLoc::StackByRef(inner) => match inner.as_ref() {
                    ArgLoc::Stack(off) => Some(*off),
                    ArgLoc::Reg(_) | ArgLoc::StackByRef(_) => None,
                },
                ArgLoc::Reg(_) => None,
            };
            if let Some(off) = stack_off {
                max_end = max_end.max(off + B::Abi::word_bytes());
            }
        }
    }
    max_end
}

fn used_callee_saved<B: Backend>(vcode: &VCode<B::Inst>) -> Vec<PReg> {
    let candidates = B::callee_saved_candidates();
    let mut used = Vec::new();
    for inst in &vcode.insts {
        for r in inst.uses().into_iter().chain(inst.defs()) {
            if let Some(p) = r.as_preg() {
                if candidates.contains(&p) && !used.contains(&p) {
                    used.push(p);
                }
            }
        }
    }
    used
}

/// Splice `B::gen_prologue` at the start of the entry block (the first
/// block in layout order) and `B::gen_epilogue` immediately before every
/// return instruction. Done as one linear rebuild rather than repeated
/// `Vec::insert`s so there's no index bookkeeping to get wrong across
/// multiple insertions.
fn splice_prologue_epilogue<B: Backend>(vcode: &mut VCode<B::Inst>, frame: &FrameLayout) {
    let prologue = B::gen_prologue(frame);
    let old_insts = std::mem::take(&mut vcode.insts);
    let old_ranges = std::mem::take(&mut vcode.block_ranges);

    let mut new_insts = Vec::with_capacity(old_insts.len() + prologue.len());
    let mut new_ranges = Vec::with_capacity(old_ranges.len());

    for (i, (block, start, end)) in old_ranges.into_iter().enumerate() {
        let range_start = new_insts.len();
        if i == 0 {
            new_insts.extend(prologue.iter().cloned());
        }
        for inst in &old_insts[start..end] {
            if B::is_return(inst) {
                new_insts.extend(B::gen_epilogue(frame));
            }
            new_insts.push(inst.clone());
        }
        new_ranges.push((block, range_start, new_insts.len()));
    }

    vcode.insts = new_insts;
    vcode.block_ranges = new_ranges;
}

/// Turn one block-argument parallel-move set into an ordered list of
/// simple register moves, breaking any permutation cycle through
/// `B::scratch_int()`. Moves whose source is never read as someone else's
/// destination just get emitted as soon as they're found; what's left
/// after that drains is, by construction, one or more pure cycles.
fn sequentialize<B: Backend>(moves: &[ParallelMove]) -> Vec<B::Inst> {
    let mut pending: Vec<(RegRef, RegRef, RegClass)> = moves
        .iter()
        .map(|m| (m.dst, m.src, m.class))
        .filter(|&(d, s, _)| d != s)
        .collect();
    let mut ordered: Vec<(RegRef, RegRef, RegClass)> = Vec::new();

    while !pending.is_empty() {
        let free = pending.iter().enumerate().position(|(i, &(d, _, _))| {
            !pending
                .iter()
                .enumerate()
                .any(|(j, &(_, s, _))| j != i && s == d)
        });
        match free {
            Some(i) => ordered.push(pending.remove(i)),
            None => {
                // A pure cycle: park its first edge's source in the scratch
                // register, repoint anyone else reading that source at the
                // scratch, then requeue the freed destination to be filled
                // from the scratch once the rest of the cycle has drained.
                let (d0, s0, c0) = pending.remove(0);
                let scratch = RegRef::Physical(B::scratch_int());
                ordered.push((scratch, s0, c0));
                for m in pending.iter_mut() {
                    if m.1 == s0 {
                        m.1 = scratch;
                    }
                }
                pending.push((d0, scratch, c0));
            }
        }
    }

    ordered
        .into_iter()
        .map(|(d, s, c)| B::Inst::gen_move(d, s, c))
        .collect()
}

/// Materialize `VCode::edge_moves` into real instructions (spec.md §4.7
/// "Parallel moves"). A predecessor with a single successor gets its
/// moves spliced right before its terminator. A predecessor with more
/// than one successor (a fused compare-and-branch, say) can have a
/// *different* move set per edge, so splicing both into the same
/// instruction stream would collide them; those edges instead get routed
/// through a freshly synthesized trampoline block — just the sequenced
/// moves followed by a jump to the true target — appended after every
/// real block. `MachBuffer`'s labels resolve by block identity, not
/// position, so appending trampolines at the end of `insts` rather than
/// between their `from`/`to` blocks is harmless.
fn materialize_edge_moves<B: Backend>(func: &Function, vcode: &mut VCode<B::Inst>) {
    if vcode.edge_moves.is_empty() {
        return;
    }

    let mut succ_count: HashMap<Block, u32> = HashMap::new();
    for &(from, _) in vcode.edge_moves.keys() {
        *succ_count.entry(from).or_insert(0) += 1;
    }

    let mut before_terminator: HashMap<Block, Vec<B::Inst>> = HashMap::new();
    let mut redirects: HashMap<Block, Vec<(Block, Block)>> = HashMap::new();
    let mut trampolines: Vec<(Block, Vec<B::Inst>)> = Vec::new();
    let mut next_block_index = func.dfg.num_blocks();

    for ((from, to), moves) in std::mem::take(&mut vcode.edge_moves) {
        let insts = sequentialize::<B>(&moves);
        if insts.is_empty() {
            continue;
        }
        if succ_count.get(&from).copied().unwrap_or(1) <= 1 {
            before_terminator.entry(from).or_default().extend(insts);
        } else {
            let trampoline = Block::new(next_block_index);
            next_block_index += 1;
            redirects.entry(from).or_default().push((to, trampoline));
            let mut body = insts;
            body.push(B::gen_jump(BranchTarget::Label(to)));
            trampolines.push((trampoline, body));
        }
    }

    let old_insts = std::mem::take(&mut vcode.insts);
    let old_ranges = std::mem::take(&mut vcode.block_ranges);
    let mut new_insts = Vec::with_capacity(old_insts.len());
    let mut new_ranges = Vec::with_capacity(old_ranges.len() + trampolines.len());

    for (block, start, end) in old_ranges {
        let range_start = new_insts.len();
        let block_redirects = redirects.get(&block);
        let last = end.saturating_sub(1);
        for (idx, inst) in old_insts[start..end].iter().enumerate() {
            if start + idx == last {
                if let Some(extra) = before_terminator.get(&block) {
                    new_insts.extend(extra.iter().cloned());
                }
            }
            let mut rewritten = inst.clone();
            if let Some(rs) = block_redirects {
                for &(old_to, trampoline) in rs {
                    if rewritten.branch_target() == Some(BranchTarget::Label(old_to)) {
                        rewritten = rewritten.with_branch_target(BranchTarget::Label(trampoline));
                    }
                }
            }
            new_insts.push(rewritten);
        }
        new_ranges.push((block, range_start, new_insts.len()));
    }

    for (block, insts) in trampolines {
        let start = new_insts.len();
        new_insts.extend(insts);
        new_ranges.push((block, start, new_insts.len()));
    }

    vcode.insts = new_insts;
    vcode.block_ranges = new_ranges;
}

fn emit_vcode<I: MachInst>(vcode: &VCode<I>, buf: &mut MachBuffer) {
    for &(block, start, end) in &vcode.block_ranges {
        let label = buf.label_for_block(block);
        buf.bind_label(label);
        for inst in &vcode.insts[start..end] {
            inst.emit(buf);
        }
    }
}

/// Prepend moves from the incoming calling-convention registers into the
/// entry block's parameter vregs, so the function body can reference its
/// own parameters like any other value. Runs before register allocation,
/// so these are ordinary virtual-register-destination moves the allocator
/// sees like any other instruction (the incoming physical registers are
/// simply live-in at the first program point).
fn bind_incoming_args<B: Backend>(ctx: &mut LowerCtx<B::Inst>, func: &Function) -> CodegenResult<()> {
    let entry_block = match func.entry_block() {
        Some(b) => b,
        None => return Ok(()),
    };
    let assigns = assign_arguments::<B::Abi>(&func.signature.params, func.signature.call_conv, None);
    let params = func.dfg.block_params(entry_block).to_vec();
    let mut binds = Vec::new();
    for (assign, &val) in assigns.iter().zip(params.iter()) {
        if let [ArgLoc::Reg(preg)] = assign.locs.as_slice() {
            let class = crate::machinst::lower::reg_class_for(func.dfg.value_type(val));
            let dst = RegRef::Virtual(ctx.value_reg(val));
            binds.push(B::Inst::gen_move(dst, RegRef::Physical(*preg), class));
        } else if let [ArgLoc::Stack(off)] = assign.locs.as_slice() {
            let ty = func.dfg.value_type(val);
            let dst = RegRef::Virtual(ctx.value_reg(val));
            binds.push(B::Inst::load_incoming_stack_arg(dst, *off as i32, ty));
        }
        // Struct/HFA incoming arguments (`ArgLoc::StackByRef`, or multiple
        // `locs` entries) aren't wired up yet (DESIGN.md).
    }
    if binds.is_empty() {
        return Ok(());
    }

    let old_insts = std::mem::take(&mut ctx.vcode.insts);
    let old_ranges = std::mem::take(&mut ctx.vcode.block_ranges);
    let mut new_insts = Vec::with_capacity(old_insts.len() + binds.len());
    let mut new_ranges = Vec::with_capacity(old_ranges.len());
    for (block, start, end) in old_ranges {
        let range_start = new_insts.len();
        if block == entry_block {
            new_insts.extend(binds.iter().cloned());
        }
        new_insts.extend_from_slice(&old_insts[start..end]);
        new_ranges.push((block, range_start, new_insts.len()));
    }
    ctx.vcode.insts = new_insts;
    ctx.vcode.block_ranges = new_ranges;
    Ok(())
}

/// Prepend, to every block flagged `is_landing_pad`, a move from this
/// target's exception-value register into the vreg for that block's first
/// parameter (spec.md §3, "Blocks flagged `is_landing_pad` receive the
/// exception value as an implicit parameter"). Same splice shape as
/// `bind_incoming_args` — these are ordinary vreg-destination moves the
/// allocator treats like any other instruction, with the physical
/// register live-in at the landing pad's first program point instead of
/// the function's.
///
/// This only delivers the exception value itself. The exception edge's
/// other `BlockCall` arguments (if the landing pad declares more
/// parameters beyond the first) have no real sender: nothing in this
/// crate ever transfers control to a landing pad at runtime (see
/// `DESIGN.md` "Honest gaps" — no personality routine or per-call-site
/// exception table is emitted), so there's no edge-move to materialize
/// for them.
fn bind_landing_pads<B: Backend>(ctx: &mut LowerCtx<B::Inst>, func: &Function) -> CodegenResult<()> {
    let mut binds: HashMap<Block, Vec<B::Inst>> = HashMap::new();
    for block in func.layout.blocks() {
        if !func.dfg.is_landing_pad(block) {
            continue;
        }
        let params = func.dfg.block_params(block);
        let exc_val = match params.first() {
            Some(&v) => v,
            None => continue,
        };
        let class = crate::machinst::lower::reg_class_for(func.dfg.value_type(exc_val));
        let dst = RegRef::Virtual(ctx.value_reg(exc_val));
        binds.entry(block).or_default().push(B::Inst::gen_move(
            dst,
            RegRef::Physical(B::exception_value_reg()),
            class,
        ));
    }
    if binds.is_empty() {
        return Ok(());
    }

    let old_insts = std::mem::take(&mut ctx.vcode.insts);
    let old_ranges = std::mem::take(&mut ctx.vcode.block_ranges);
    let mut new_insts = Vec::with_capacity(old_insts.len() + binds.len());
    let mut new_ranges = Vec::with_capacity(old_ranges.len());
    for (block, start, end) in old_ranges {
        let range_start = new_insts.len();
        if let Some(extra) = binds.get(&block) {
            new_insts.extend(extra.iter().cloned());
        }
        new_insts.extend_from_slice(&old_insts[start..end]);
        new_ranges.push((block, range_start, new_insts.len()));
    }
    ctx.vcode.insts = new_insts;
    ctx.vcode.block_ranges = new_ranges;
    Ok(())
}

/// Run the full pipeline for one function against one target: verify,
/// lower, allocate registers, build the frame, splice in the prologue/
/// epilogue and resolved block-argument moves, then emit.
pub fn compile_with_backend<B: Backend>(
    func: &Function,
    flags: &Flags,
) -> CodegenResult<CompiledCode> {
    log::debug!("compiling {}", func.name);

    let cfg = ControlFlowGraph::with_function(func);
    if flags.enable_verifier {
        let domtree = DominatorTree::with_function(func, &cfg);
        verify_function(func, &cfg, &domtree)?;
    }

    log::debug!("lowering {}", func.name);
    let (stack_slot_offsets, stack_slots_size) = compute_stack_slot_offsets(func);
    let mut ctx = LowerCtx::<B::Inst>::new(func, &cfg);
    ctx.stack_slot_offsets = stack_slot_offsets;
    ctx.vcode.reloc_kind_hint = B::reloc_kind_hint();
    ctx.trace_cfg = flags.machine_code_cfg_info;
    let rules = B::rule_table();
    lower_function(&mut ctx, &rules)?;
    bind_incoming_args::<B>(&mut ctx, func)?;
    bind_landing_pads::<B>(&mut ctx, func)?;

    let LowerCtx {
        mut vcode,
        mut vreg_alloc,
        ..
    } = ctx;

    log::debug!("register allocating {}", func.name);
    let call_conv = func.signature.call_conv;
    let spill_area_base = round_up(stack_slots_size, 8) as i32;
    let alloc_result = regalloc::allocate(
        vcode,
        &cfg,
        &mut vreg_alloc,
        B::allocatable_int(),
        B::allocatable_float(),
        spill_area_base,
    )?;
    vcode = alloc_result.vcode;
    let spill_slot_area_size = alloc_result.spill_area_end - spill_area_base as u32;

    let frame = FrameLayout {
        callee_saved: used_callee_saved::<B>(&vcode),
        spill_slot_area_size,
        incoming_stack_arg_area: compute_incoming_stack_arg_area::<B>(func, call_conv),
        outgoing_call_area: 0,
        has_frame_pointer: true,
        stack_slots_size,
    };
    log::debug!(
        "frame for {}: {} bytes locals, {} callee-saved",
        func.name,
        frame.locals_size(),
        frame.callee_saved.len()
    );

    B::finalize_incoming_stack_args(&mut vcode, &frame);
    splice_prologue_epilogue::<B>(&mut vcode, &frame);
    materialize_edge_moves::<B>(func, &mut vcode);

    log::debug!("emitting {}", func.name);
    let mut buf = MachBuffer::new();
    buf.unwind = if flags.unwind_info {
        B::unwind_info(&frame, call_conv)
    } else {
        None
    };
    emit_vcode(&vcode, &mut buf);
    let finished = buf.finish()?;

    Ok(CompiledCode {
        code_size: finished.data.len() as u32,
        bytes: finished.data,
        relocs: finished.relocs,
        unwind: finished.unwind,
    })
}
