//! Target dispatch (spec.md §4.9, §6): `lookup` maps a `target_lexicon`
//! triple to a `Box<dyn TargetIsa>`. `TargetIsa` is deliberately
//! object-safe — no associated types — so a `Context` can hold one
//! without knowing which backend built it; the real per-backend `Inst`/
//! `Abi` types stay behind `context::Backend`, implemented here by the
//! zero-sized `X64Isa`/`Aarch64Isa` markers.

pub mod aarch64;
pub mod x64;

use target_lexicon::{Architecture, Triple};

use crate::context::{compile_with_backend, CompiledCode};
use crate::ir::{CallConv, Function};
use crate::result::{CodegenError, CodegenResult};
use crate::settings::Flags;

pub trait TargetIsa: Send + Sync {
    fn name(&self) -> &'static str;
    fn triple(&self) -> &Triple;
    fn default_call_conv(&self) -> CallConv;
    fn compile_function(&self, func: &Function, flags: &Flags) -> CodegenResult<CompiledCode>;
}

fn is_apple(triple: &Triple) -> bool {
    let os = triple.operating_system.to_string();
    os.contains("darwin") || os.contains("ios") || os.contains("macos")
}

fn is_windows(triple: &Triple) -> bool {
    triple.operating_system.to_string().contains("windows")
}

#[cfg(feature = "x64")]
pub struct X64Isa {
    triple: Triple,
}

#[cfg(feature = "x64")]
impl X64Isa {
    pub fn new(triple: Triple) -> Self {
        Self { triple }
    }
}

#[cfg(feature = "x64")]
impl TargetIsa for X64Isa {
    fn name(&self) -> &'static str {
        "x64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn default_call_conv(&self) -> CallConv {
        if is_windows(&self.triple) {
            CallConv::WindowsFastcall
        } else {
            CallConv::SystemV
        }
    }

    fn compile_function(&self, func: &Function, flags: &Flags) -> CodegenResult<CompiledCode> {
        compile_with_backend::<x64::X64Backend>(func, flags)
    }
}

#[cfg(feature = "aarch64")]
pub struct Aarch64Isa {
    triple: Triple,
}

#[cfg(feature = "aarch64")]
impl Aarch64Isa {
    pub fn new(triple: Triple) -> Self {
        Self { triple }
    }
}

#[cfg(feature = "aarch64")]
impl TargetIsa for Aarch64Isa {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn default_call_conv(&self) -> CallConv {
        if is_apple(&self.triple) {
            CallConv::AppleAarch64
        } else {
            CallConv::Aapcs64
        }
    }

    fn compile_function(&self, func: &Function, flags: &Flags) -> CodegenResult<CompiledCode> {
        compile_with_backend::<aarch64::Aarch64Backend>(func, flags)
    }
}

/// Look up a `TargetIsa` for `triple`. Fails (rather than panicking) for
/// an architecture this crate has no backend for, or one whose backend
/// was compiled out via Cargo features.
pub fn lookup(triple: Triple) -> CodegenResult<Box<dyn TargetIsa>> {
    match triple.architecture {
        #[cfg(feature = "x64")]
        Architecture::X86_64 => Ok(Box::new(X64Isa::new(triple))),
        #[cfg(feature = "aarch64")]
        Architecture::Aarch64(..) => Ok(Box::new(Aarch64Isa::new(triple))),
        arch => Err(CodegenError::Signature(format!(
            "no backend registered for architecture `{}` (enable the `x64`/`aarch64`/`all-arch` feature)",
            arch
        ))),
    }
}

/// `lookup(Triple::host())`, for the common "compile for the machine
/// running this process" case.
pub fn target_native() -> CodegenResult<Box<dyn TargetIsa>> {
    lookup(Triple::host())
}
