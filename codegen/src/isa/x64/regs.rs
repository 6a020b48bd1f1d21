//! x86-64 physical register numbering, matching the Intel SDM's own
//! register field encoding so `PReg::hw_enc()` can be used directly as a
//! ModR/M/SIB/REX register bit-field without a second lookup table.

use crate::machinst::reg::{PReg, RegClass};

pub const RAX: PReg = PReg::new(0, RegClass::Int);
pub const RCX: PReg = PReg::new(1, RegClass::Int);
pub const RDX: PReg = PReg::new(2, RegClass::Int);
pub const RBX: PReg = PReg::new(3, RegClass::Int);
pub const RSP: PReg = PReg::new(4, RegClass::Int);
pub const RBP: PReg = PReg::new(5, RegClass::Int);
pub const RSI: PReg = PReg::new(6, RegClass::Int);
pub const RDI: PReg = PReg::new(7, RegClass::Int);
pub const R8: PReg = PReg::new(8, RegClass::Int);
pub const R9: PReg = PReg::new(9, RegClass::Int);
pub const R10: PReg = PReg::new(10, RegClass::Int);
pub const R11: PReg = PReg::new(11, RegClass::Int);
pub const R12: PReg = PReg::new(12, RegClass::Int);
pub const R13: PReg = PReg::new(13, RegClass::Int);
pub const R14: PReg = PReg::new(14, RegClass::Int);
pub const R15: PReg = PReg::new(15, RegClass::Int);

pub const XMM0: PReg = PReg::new(0, RegClass::Float);
pub const XMM1: PReg = PReg::new(1, RegClass::Float);
pub const XMM2: PReg = PReg::new(2, RegClass::Float);
pub const XMM3: PReg = PReg::new(3, RegClass::Float);
pub const XMM4: PReg = PReg::new(4, RegClass::Float);
pub const XMM5: PReg = PReg::new(5, RegClass::Float);
pub const XMM6: PReg = PReg::new(6, RegClass::Float);
pub const XMM7: PReg = PReg::new(7, RegClass::Float);

/// SysV argument registers, in order (spec.md §4.5).
pub const SYSV_INT_ARGS: &[PReg] = &[RDI, RSI, RDX, RCX, R8, R9];
pub const SYSV_FLOAT_ARGS: &[PReg] = &[XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7];
pub const SYSV_INT_RETURNS: &[PReg] = &[RAX, RDX];
pub const SYSV_FLOAT_RETURNS: &[PReg] = &[XMM0, XMM1];

pub const WIN_FASTCALL_INT_ARGS: &[PReg] = &[RCX, RDX, R8, R9];
pub const WIN_FASTCALL_FLOAT_ARGS: &[PReg] = &[XMM0, XMM1, XMM2, XMM3];
pub const WIN_FASTCALL_INT_RETURNS: &[PReg] = &[RAX];
pub const WIN_FASTCALL_FLOAT_RETURNS: &[PReg] = &[XMM0];

/// Registers a SysV callee must preserve across a call.
pub const SYSV_CALLEE_SAVED: &[PReg] = &[RBX, RBP, R12, R13, R14, R15];
/// Registers a call clobbers beyond its declared result (spec.md §4.6
/// "Call-clobber modeling").
pub const SYSV_CALLER_SAVED: &[PReg] = &[
    RAX, RCX, RDX, RSI, RDI, R8, R9, R10, R11, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7,
];

/// Registers the allocator may hand out. RSP is reserved for the stack
/// pointer, RBP for the frame pointer, and R11 as the parallel-move scratch
/// register (below), so none of the three are in the general pool.
pub const ALLOCATABLE_INT: &[PReg] =
    &[RAX, RCX, RDX, RBX, RSI, RDI, R8, R9, R10, R12, R13, R14, R15];
pub const ALLOCATABLE_FLOAT: &[PReg] =
    &[XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7];

/// Held out of the allocatable set so the parallel-move sequencer
/// (`context::sequentialize`) always has a free register to break a move
/// cycle through. R11 is caller-saved and conventionally corruptible (it's
/// the register PLT stubs clobber), so reserving it costs nothing a callee
/// wasn't already free to ignore.
pub const SCRATCH_INT: PReg = R11;

pub fn int_class_capacity() -> usize {
    ALLOCATABLE_INT.len()
}
