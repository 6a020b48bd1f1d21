//! AArch64 physical register numbering. `PReg::hw_enc()` is the 5-bit
//! register field the ARM ARM uses directly in every instruction encoding;
//! `31` is context-dependent (`SP` in most addressing forms, `XZR`/`WZR` in
//! most data-processing forms) and is never handed out by the allocator.

use crate::machinst::reg::{PReg, RegClass};

pub const X0: PReg = PReg::new(0, RegClass::Int);
pub const X1: PReg = PReg::new(1, RegClass::Int);
pub const X2: PReg = PReg::new(2, RegClass::Int);
pub const X3: PReg = PReg::new(3, RegClass::Int);
pub const X4: PReg = PReg::new(4, RegClass::Int);
pub const X5: PReg = PReg::new(5, RegClass::Int);
pub const X6: PReg = PReg::new(6, RegClass::Int);
pub const X7: PReg = PReg::new(7, RegClass::Int);
pub const X8: PReg = PReg::new(8, RegClass::Int);
pub const X9: PReg = PReg::new(9, RegClass::Int);
pub const X18: PReg = PReg::new(18, RegClass::Int);
pub const X19: PReg = PReg::new(19, RegClass::Int);
pub const X20: PReg = PReg::new(20, RegClass::Int);
pub const X21: PReg = PReg::new(21, RegClass::Int);
pub const X22: PReg = PReg::new(22, RegClass::Int);
pub const X23: PReg = PReg::new(23, RegClass::Int);
pub const X24: PReg = PReg::new(24, RegClass::Int);
pub const X25: PReg = PReg::new(25, RegClass::Int);
pub const X26: PReg = PReg::new(26, RegClass::Int);
pub const X27: PReg = PReg::new(27, RegClass::Int);
pub const X28: PReg = PReg::new(28, RegClass::Int);
/// Frame pointer, AAPCS64 callee-saved.
pub const FP: PReg = PReg::new(29, RegClass::Int);
/// Link register.
pub const LR: PReg = PReg::new(30, RegClass::Int);

/// Encoding `31`, context-dependent (`SP` in addressing forms, `XZR` in
/// data-processing forms). Used directly as a fixed operand (e.g. `cmp` is
/// `subs xzr, rn, rm`); the allocator never hands either of these out.
pub const ZR: PReg = PReg::new(31, RegClass::Int);
pub const SP: PReg = PReg::new(31, RegClass::Int);

pub const V0: PReg = PReg::new(0, RegClass::Float);
pub const V1: PReg = PReg::new(1, RegClass::Float);
pub const V2: PReg = PReg::new(2, RegClass::Float);
pub const V3: PReg = PReg::new(3, RegClass::Float);
pub const V4: PReg = PReg::new(4, RegClass::Float);
pub const V5: PReg = PReg::new(5, RegClass::Float);
pub const V6: PReg = PReg::new(6, RegClass::Float);
pub const V7: PReg = PReg::new(7, RegClass::Float);

pub const AAPCS64_INT_ARGS: &[PReg] = &[X0, X1, X2, X3, X4, X5, X6, X7];
pub const AAPCS64_FLOAT_ARGS: &[PReg] = &[V0, V1, V2, V3, V4, V5, V6, V7];
pub const AAPCS64_INT_RETURNS: &[PReg] = &[X0, X1];
pub const AAPCS64_FLOAT_RETURNS: &[PReg] = &[V0, V1];

/// Registers a call clobbers beyond its declared result (spec.md §4.6
/// "Call-clobber modeling"): X0-X18 are caller-saved under AAPCS64, plus the
/// argument/result vector registers.
pub const AAPCS64_CALLER_SAVED: &[PReg] = &[
    X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, V0, V1, V2, V3, V4, V5, V6, V7,
];
pub const AAPCS64_CALLEE_SAVED: &[PReg] =
    &[X19, X20, X21, X22, X23, X24, X25, X26, X27, X28, FP, LR];

/// Registers the allocator may hand out: X0-X8 and X19-X28. X18 is the
/// platform register on some targets, X9 is reserved below as the parallel-
/// move scratch register, and FP/LR are needed for frame setup and returns
/// — none of those four are in the general pool.
pub const AAPCS64_ALLOCATABLE_INT: &[PReg] =
    &[X0, X1, X2, X3, X4, X5, X6, X7, X8, X19, X20, X21, X22, X23, X24, X25, X26, X27, X28];
pub const AAPCS64_ALLOCATABLE_FLOAT: &[PReg] = &[V0, V1, V2, V3, V4, V5, V6, V7];

/// Held out of the allocatable set so the parallel-move sequencer
/// (`context::sequentialize`) always has a free register to break a move
/// cycle through. X9 is AAPCS64's first "temp" register, already
/// caller-saved and conventionally corruptible across calls.
pub const SCRATCH_INT: PReg = X9;

pub fn int_class_capacity() -> usize {
    AAPCS64_ALLOCATABLE_INT.len()
}
