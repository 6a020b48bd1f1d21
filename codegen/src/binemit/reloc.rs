//! Relocation records the host linker or JIT resolver applies after this
//! crate has finished emitting bytes (spec.md §6 "Relocations").

use crate::ir::ExternalName;
use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelocKind {
    Abs8,
    Abs4,
    X86PCRel4,
    X86CallPCRel4,
    Arm64Call,
    Arm64PCRel21,
    Arm64PCRel26,
}

impl fmt::Display for RelocKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A symbol reference, a kind, an offset into `CompiledCode::code`, and an
/// addend.
#[derive(Clone, Debug)]
pub struct Reloc {
    pub offset: u32,
    pub kind: RelocKind,
    pub name: ExternalName,
    pub addend: i64,
}
