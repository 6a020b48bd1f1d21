//! A retargetable code generator: lowers a typed SSA IR to native machine
//! code for x86-64 and AArch64 (spec.md §1).
//!
//! The pipeline, front to back:
//!
//! - [`ir`]: the function representation clients build (values, blocks,
//!   typed instructions, stack slots).
//! - [`verifier`]: structural and dominance checks run before lowering.
//! - [`flowgraph`] / [`dominator_tree`]: the control-flow analyses the
//!   verifier and lowering engine both need.
//! - [`machinst`]: target-independent lowering machinery — the `VCode`
//!   container, ABI argument placement, and the rule-driven instruction
//!   selector.
//! - [`isa`]: per-target backends (`x64`, `aarch64`) plugged into that
//!   machinery via [`context::Backend`].
//! - [`regalloc`]: Chaitin-Briggs graph coloring with iterated coalescing.
//! - [`binemit`]: the fixed-up byte buffer, relocations, and unwind info
//!   the final machine code comes out as.
//! - [`context`]: wires all of the above into one `compile_function` call
//!   per `Backend`, plus the `Context`/`ContextBuilder` entry point.
//! - [`settings`]: the `Flags` compile-time configuration threaded through
//!   a `Context`.

pub mod binemit;
pub mod context;
pub mod dominator_tree;
pub mod flowgraph;
pub mod ir;
pub mod isa;
pub mod machinst;
pub mod regalloc;
pub mod result;
pub mod settings;
pub mod verifier;

use target_lexicon::Triple;

use crate::context::CompiledCode;
use crate::ir::{CallConv, Function};
use crate::result::CodegenResult;
use crate::settings::{Flags, FlagsBuilder, OptLevel};

/// Builds a [`Context`] bound to one target and one set of [`Flags`]
/// (spec.md §6).
pub struct ContextBuilder {
    triple: Option<Triple>,
    flags: FlagsBuilder,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            triple: None,
            flags: FlagsBuilder::new(),
        }
    }

    /// Target an explicit triple, e.g. for cross-compilation.
    pub fn target(mut self, triple: Triple) -> Self {
        self.triple = Some(triple);
        self
    }

    /// Target the machine this process is running on.
    pub fn target_native(mut self) -> Self {
        self.triple = Some(Triple::host());
        self
    }

    pub fn opt_level(mut self, level: OptLevel) -> Self {
        self.flags = self.flags.opt_level(level);
        self
    }

    pub fn call_conv(mut self, cc: CallConv) -> Self {
        self.flags = self.flags.default_call_conv(cc);
        self
    }

    pub fn verify(mut self, yes: bool) -> Self {
        self.flags = self.flags.enable_verifier(yes);
        self
    }

    /// Reserved for a future instruction-scheduling/peephole pass; carried
    /// here so the public builder surface doesn't have to change shape
    /// when that lands. No-op today.
    pub fn optimize(self, _yes: bool) -> Self {
        self
    }

    pub fn finish(self) -> CodegenResult<Context> {
        let triple = self.triple.unwrap_or_else(Triple::host);
        let isa = isa::lookup(triple)?;
        Ok(Context {
            isa,
            flags: self.flags.finish(),
        })
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A compile session bound to one target and one set of flags. Stateless
/// beyond that binding — `compile_function` may be called repeatedly,
/// concurrently, on unrelated functions (spec.md §6).
pub struct Context {
    isa: Box<dyn isa::TargetIsa>,
    flags: Flags,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn target_name(&self) -> &'static str {
        self.isa.name()
    }

    pub fn compile_function(&self, func: &Function) -> CodegenResult<CompiledCode> {
        self.isa.compile_function(func, &self.flags)
    }
}
