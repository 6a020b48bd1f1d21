//! `VCode`: the linear sequence of target `MachInst`s the lowering engine
//! produces, before and after register allocation (spec.md §4.4, §4.8).

use crate::binemit::buffer::MachBuffer;
use crate::binemit::reloc::RelocKind;
use crate::ir::{Block, Type};
use crate::machinst::reg::{PReg, RegClass, RegRef};
use smallvec::SmallVec;
use std::fmt;

/// A symbolic branch target, resolved to a concrete offset by the emitter
/// once every block's start label is known (spec.md §4.4, "Branch/
/// terminator lowering").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchTarget {
    Label(Block),
    ResolvedOffset(i32),
}

/// Everything a target's concrete instruction enum must expose so the
/// generic register allocator and emitter can do their job without
/// knowing the target.
pub trait MachInst: Clone + fmt::Debug {
    /// Registers this instruction reads. Order matters only for
    /// diagnostics; the allocator treats this as a set.
    fn uses(&self) -> SmallVec<[RegRef; 4]>;

    /// Registers this instruction writes. Two-result instructions (divmod,
    /// wide multiply) report both as simultaneous defs (spec.md §9).
    fn defs(&self) -> SmallVec<[RegRef; 2]>;

    /// `Some((dst, src))` if this is a register-to-register move the
    /// coalescer may try to elide.
    fn is_move(&self) -> Option<(RegRef, RegRef)> {
        None
    }

    /// Rewrite every register operand through `map`, used both to
    /// renumber virtual registers during spill-rewrite and to install the
    /// final physical-register assignment.
    fn rewrite_regs(&mut self, map: &mut dyn FnMut(RegRef) -> RegRef);

    /// Physical registers this instruction clobbers beyond its declared
    /// defs (e.g. a call's caller-saved set). These become interferences
    /// for anything live across the instruction (spec.md §4.6, §9
    /// "Call-clobber modeling").
    fn clobbers(&self) -> &[PReg] {
        &[]
    }

    fn is_call(&self) -> bool {
        false
    }

    /// `Some(target)` if this instruction's control transfer should be
    /// retargetable post-hoc (used by the emitter's branch-island pass);
    /// most non-branch instructions return `None`.
    fn branch_target(&self) -> Option<BranchTarget> {
        None
    }

    fn with_branch_target(&self, target: BranchTarget) -> Self;

    /// Append this instruction's encoded bytes to `buf`, registering any
    /// fixups/relocations/labels it needs.
    fn emit(&self, buf: &mut MachBuffer);

    /// A reload from a spill slot (`slot_offset` bytes, frame-pointer
    /// relative) into `dst`, used by the allocator's spill-rewrite pass
    /// (spec.md §4.7). Target-specific since the spill base register and
    /// memory-operand encoding differ per ISA.
    fn spill_load(dst: RegRef, slot_offset: i32, class: RegClass) -> Self;

    /// The mirror of `spill_load`: store `src` out to its spill slot.
    fn spill_store(src: RegRef, slot_offset: i32, class: RegClass) -> Self;

    /// A plain register-to-register move, used to materialize block-argument
    /// parallel moves (`VCode::edge_moves`) into real instructions once
    /// register allocation has resolved them to physical registers.
    fn gen_move(dst: RegRef, src: RegRef, class: RegClass) -> Self;

    /// A marker for a stack-passed incoming parameter (spec.md §4.5): `off`
    /// is its byte offset within the stack-argument area, as placed by
    /// `machinst::abi::assign_arguments`. The frame-pointer-relative base
    /// that offset is measured from depends on the finished frame's size,
    /// which isn't known until after register allocation, so this produces
    /// a placeholder `context::compile_with_backend` resolves into a real
    /// load via `Backend::finalize_incoming_stack_args` once the frame is
    /// built.
    fn load_incoming_stack_arg(dst: RegRef, off: i32, ty: Type) -> Self;
}

/// One entry in the block-argument parallel-move worklist the lowering
/// engine leaves for edge resolution (spec.md §4.7 "Parallel moves").
#[derive(Clone, Debug)]
pub struct ParallelMove {
    pub dst: RegRef,
    pub src: RegRef,
    pub class: RegClass,
}

/// The sequence of `MachInst`s produced by lowering, grouped by the IR
/// block they came from (in reverse-lowering order internally, but stored
/// forward so downstream passes don't have to think about the walk
/// direction lowering used).
pub struct VCode<I: MachInst> {
    pub insts: Vec<I>,
    /// `(block, start_index, end_index)` in `insts`, in final emission
    /// order (== IR layout order; block-layout ordering is the client's
    /// choice per spec.md §9).
    pub block_ranges: Vec<(Block, usize, usize)>,
    /// Parallel moves to splice in at the end of each predecessor block,
    /// keyed by `(from_block, to_block)`.
    pub edge_moves: std::collections::HashMap<(Block, Block), Vec<ParallelMove>>,
    pub reloc_kind_hint: RelocKind,
}

impl<I: MachInst> VCode<I> {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            block_ranges: Vec::new(),
            edge_moves: std::collections::HashMap::new(),
            reloc_kind_hint: RelocKind::Abs8,
        }
    }

    /// Program point of instruction `idx`, for liveness (spec.md §4.6):
    /// simply `2*idx`, leaving odd numbers free for "after this
    /// instruction" half-open interval endpoints.
    pub fn program_point(idx: usize) -> u32 {
        (idx * 2) as u32
    }

    pub fn block_of_point(&self, point: u32) -> Option<Block> {
        let idx = (point / 2) as usize;
        self.block_ranges
            .iter()
            .find(|&&(_, s, e)| idx >= s && idx < e)
            .map(|&(b, _, _)| b)
    }
}

impl<I: MachInst> Default for VCode<I> {
    fn default() -> Self {
        Self::new()
    }
}
