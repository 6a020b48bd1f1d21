//! Unwind metadata describing how to reverse a function's prologue during
//! stack walking (spec.md §4.8, §6). The frame plan in `isa::abi` produces
//! this deterministically; we don't encode down to raw `.eh_frame`/`.pdata`
//! bytes (that's an object-file concern, out of scope per spec.md §1) —
//! just the structured steps an object writer would encode from.

use crate::machinst::reg::PReg;

/// One step of prologue unwinding, in the order the prologue performed
/// them (so undoing them in reverse order restores the caller's frame).
#[derive(Clone, Debug, PartialEq)]
pub enum UnwindCode {
    PushReg { offset_from_sp: u32, reg: PReg },
    SaveReg { offset_from_fp: i32, reg: PReg },
    SetFramePointer,
    StackAlloc { size: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnwindInfo {
    /// DWARF `.eh_frame` CIE/FDE-equivalent steps (System V).
    SystemV { codes: Vec<UnwindCode>, frame_size: u32 },
    /// Windows x64 `UNWIND_INFO` unwind codes.
    WindowsX64 { codes: Vec<UnwindCode>, frame_size: u32 },
    /// Windows ARM64 `.pdata` packed frame descriptor.
    WindowsArm64Pdata { frame_size: u32, saved_regs: u32 },
}
