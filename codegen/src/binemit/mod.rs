//! The machine-code emitter: a fixed-up byte stream with relocation and
//! unwind metadata (spec.md §4.8).

pub mod buffer;
pub mod reloc;
pub mod unwind;

pub use buffer::{FixupKind, MachBuffer, MachLabel};
pub use reloc::{Reloc, RelocKind};
pub use unwind::{UnwindCode, UnwindInfo};
