//! Compile-time knobs threaded through `Context` (spec.md §4.9, §6).
//!
//! The teacher's `settings` crate compiles a textual key=value DSL into a
//! `Flags` struct via a build-time code generator; there's no such
//! generator in this crate's dependency stack, so this is the same idea
//! expressed directly as a plain struct with a builder, matching in spirit
//! rather than byte-for-byte (see `DESIGN.md`).

use crate::ir::signature::CallConv;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl Default for OptLevel {
    fn default() -> Self {
        OptLevel::Speed
    }
}

/// Resolved configuration for one `Context`. Cheap to clone; a `Context`
/// owns one and never mutates it mid-compile.
#[derive(Clone, Debug)]
pub struct Flags {
    pub opt_level: OptLevel,
    pub default_call_conv: CallConv,
    /// Run `verifier::verify_function` before lowering. Left on by default;
    /// embedders that have already verified a function upstream (e.g. a
    /// shared IR cache) can turn this off to skip the repeat walk.
    pub enable_verifier: bool,
    /// Build `UnwindInfo` during `compile_function`.
    pub unwind_info: bool,
    /// Emit a `log::trace!` line for every instruction the lowering engine
    /// visits (block, opcode, and the `MachInst`s it produced) — noisy
    /// enough that it's worth gating separately from `RUST_LOG`, read by
    /// `machinst::lower::lower_function`.
    pub machine_code_cfg_info: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            default_call_conv: CallConv::SystemV,
            enable_verifier: true,
            unwind_info: true,
            machine_code_cfg_info: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FlagsBuilder {
    flags: Flags,
}

impl FlagsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opt_level(mut self, level: OptLevel) -> Self {
        self.flags.opt_level = level;
        self
    }

    pub fn default_call_conv(mut self, cc: CallConv) -> Self {
        self.flags.default_call_conv = cc;
        self
    }

    pub fn enable_verifier(mut self, yes: bool) -> Self {
        self.flags.enable_verifier = yes;
        self
    }

    pub fn unwind_info(mut self, yes: bool) -> Self {
        self.flags.unwind_info = yes;
        self
    }

    pub fn machine_code_cfg_info(mut self, yes: bool) -> Self {
        self.flags.machine_code_cfg_info = yes;
        self
    }

    pub fn finish(self) -> Flags {
        self.flags
    }
}
