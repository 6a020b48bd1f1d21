//! Calling-convention argument placement shared across targets (spec.md
//! §4.5). Each ISA supplies an `AbiMachineSpec` describing its register
//! sequences and alignment rules; the placement algorithm itself — the
//! GPR/FP/stack cursor walk, struct/HFA handling — lives here once.

use crate::ir::signature::{AbiParam, CallConv, Signature};
use crate::ir::types::Type;
use crate::machinst::reg::PReg;

/// Where one argument or return value lives once placed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArgLoc {
    Reg(PReg),
    /// Byte offset from the start of the stack-argument area.
    Stack(u32),
    /// A `> 16`-byte struct passed by hidden pointer; the pointer itself
    /// occupies the GPR/stack slot named by the nested `ArgLoc`.
    StackByRef(Box<ArgLoc>),
}

#[derive(Clone, Debug)]
pub struct ArgAssignment {
    pub param_index: usize,
    pub locs: Vec<ArgLoc>,
}

/// Per-target register sequences and rounding rules the placement
/// algorithm needs. Implemented once per ISA in `isa::<arch>::abi`.
pub trait AbiMachineSpec {
    fn int_arg_regs(cc: CallConv) -> &'static [PReg];
    fn float_arg_regs(cc: CallConv) -> &'static [PReg];
    fn int_return_regs(cc: CallConv) -> &'static [PReg];
    fn float_return_regs(cc: CallConv) -> &'static [PReg];
    /// Round a stack argument's size up to its slot alignment (8 bytes on
    /// AAPCS64, natural alignment on SysV).
    fn stack_slot_align(cc: CallConv, size: u32, natural_align: u32) -> u32;
    /// Final stack-argument area alignment (16 bytes on AArch64).
    fn stack_area_align(cc: CallConv) -> u32;
    fn word_bytes() -> u32;
}

/// Assign argument locations in declaration order, spec.md §4.5 steps
/// 1-7. `params` is either a signature's `params` (incoming direction) or
/// its `returns` (outgoing-from-callee direction) — the same walk serves
/// both, since a `Signature` is direction-agnostic.
pub fn assign_arguments<S: AbiMachineSpec>(
    params: &[AbiParam],
    cc: CallConv,
    varargs_from: Option<usize>,
) -> Vec<ArgAssignment> {
    let int_regs = S::int_arg_regs(cc);
    let float_regs = S::float_arg_regs(cc);
    let mut gi = 0usize;
    let mut fv = 0usize;
    let mut so: u32 = 0;
    let mut out = Vec::with_capacity(params.len());

    for (idx, param) in params.iter().enumerate() {
        let is_vararg = varargs_from.map_or(false, |from| idx >= from);
        let locs = if let Some(layout) = &param.struct_layout {
            assign_struct::<S>(layout, cc, &mut gi, &mut fv, &mut so, int_regs, float_regs)
        } else if param.value_type.is_float() && !is_vararg {
            assign_scalar(
                param.value_type,
                float_regs,
                &mut fv,
                &mut so,
                cc,
            )
        } else {
            assign_scalar(param.value_type, int_regs, &mut gi, &mut so, cc)
        };
        out.push(ArgAssignment {
            param_index: idx,
            locs,
        });
    }

    out
}

fn assign_scalar(
    ty: Type,
    regs: &'static [PReg],
    cursor: &mut usize,
    so: &mut u32,
    cc: CallConv,
) -> Vec<ArgLoc> {
    if *cursor < regs.len() {
        let r = regs[*cursor];
        *cursor += 1;
        vec![ArgLoc::Reg(r)]
    } else {
        let align = natural_align(ty, cc);
        *so = round_up(*so, align);
        let off = *so;
        *so += ty.bytes().max(align);
        vec![ArgLoc::Stack(off)]
    }
}

fn natural_align(ty: Type, cc: CallConv) -> u32 {
    match cc {
        CallConv::Aapcs64 | CallConv::AppleAarch64 => 8,
        _ => ty.bytes().max(1),
    }
}

fn round_up(x: u32, align: u32) -> u32 {
    if align == 0 {
        return x;
    }
    (x + align - 1) / align * align
}

/// Structs `<= 16` bytes pack into 1-2 GPRs (or up to 4 FP regs if HFA);
/// structs `> 16` bytes pass by hidden pointer in the next GPR, spilling to
/// stack if GPRs are exhausted. HFAs that don't fully fit in remaining FP
/// registers spill to stack whole, never splitting across reg/stack
/// (spec.md §4.5 steps 4-5).
fn assign_struct<S: AbiMachineSpec>(
    layout: &crate::ir::types::StructLayout,
    cc: CallConv,
    gi: &mut usize,
    fv: &mut usize,
    so: &mut u32,
    int_regs: &'static [PReg],
    float_regs: &'static [PReg],
) -> Vec<ArgLoc> {
    if layout.is_hfa() {
        let n = layout.fields.len();
        if *fv + n <= float_regs.len() {
            let locs = float_regs[*fv..*fv + n].iter().map(|&r| ArgLoc::Reg(r)).collect();
            *fv += n;
            return locs;
        }
        *so = round_up(*so, 8);
        let off = *so;
        *so += layout.size;
        return vec![ArgLoc::Stack(off)];
    }

    if layout.size <= 16 {
        let num_gprs = ((layout.size + 7) / 8).max(1) as usize;
        if *gi + num_gprs <= int_regs.len() {
            let locs = int_regs[*gi..*gi + num_gprs].iter().map(|&r| ArgLoc::Reg(r)).collect();
            *gi += num_gprs;
            return locs;
        }
        *so = round_up(*so, 8);
        let off = *so;
        *so += (layout.size + 7) / 8 * 8;
        return vec![ArgLoc::Stack(off)];
    }

    // Hidden-pointer case: caller allocates the backing storage in its own
    // frame and passes a pointer to it like any other scalar GPR argument.
    let ptr_ty = match cc {
        CallConv::Aapcs64 | CallConv::AppleAarch64 => crate::ir::types::I64,
        _ => crate::ir::types::I64,
    };
    let inner = assign_scalar(ptr_ty, int_regs, gi, so, cc);
    vec![ArgLoc::StackByRef(Box::new(inner[0]))]
}

/// The finalized frame plan for one function (spec.md §4.5 "Frame plan").
/// `spill_slot_area_size` is only known after register allocation; this
/// struct is built in two passes (provisional during lowering for the
/// incoming/outgoing areas, finalized once the allocator reports its spill
/// count).
#[derive(Clone, Debug, Default)]
pub struct FrameLayout {
    pub callee_saved: Vec<PReg>,
    pub spill_slot_area_size: u32,
    pub incoming_stack_arg_area: u32,
    pub outgoing_call_area: u32,
    pub has_frame_pointer: bool,
    pub stack_slots_size: u32,
}

impl FrameLayout {
    /// Total bytes the prologue subtracts from SP for locals + spill
    /// slots + outgoing call area, 16-byte aligned.
    pub fn locals_size(&self) -> u32 {
        round_up(
            self.spill_slot_area_size + self.outgoing_call_area + self.stack_slots_size,
            16,
        )
    }
}
