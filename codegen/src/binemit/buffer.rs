//! `MachBuffer`: an append-only byte stream with deferred label/branch
//! fixups, a constant pool, and outgoing relocations (spec.md §4.8).

use crate::binemit::reloc::{Reloc, RelocKind};
use crate::binemit::unwind::UnwindInfo;
use crate::ir::{Block, ExternalName};
use crate::result::{CodegenError, CodegenResult};
use std::collections::HashMap;

/// A label is either bound to a known offset already, or still pending.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MachLabel(pub u32);

/// The range a fixup's immediate field can reach, used to decide whether a
/// branch island is needed once the target offset is known.
#[derive(Copy, Clone, Debug)]
pub enum FixupKind {
    /// x86-64 `rel32`: full 32-bit range, never needs a veneer in practice.
    X86Rel32,
    /// AArch64 conditional branch / CBZ: ±1MiB, 4-byte-aligned.
    Arm64CondBr19,
    /// AArch64 unconditional branch: ±128MiB.
    Arm64Br26,
    /// AArch64 `TBZ`/`TBNZ`: ±32KiB.
    Arm64Tbz14,
    /// AArch64 `ADR`: ±1MiB, byte-granular (used by jump-table address
    /// computation; a table placed further than that from its `adr` would
    /// need an `ADRP`+`ADD` pair this backend doesn't build).
    Arm64Adr21,
}

impl FixupKind {
    fn range_bytes(self) -> i64 {
        match self {
            FixupKind::X86Rel32 => i32::MAX as i64,
            FixupKind::Arm64CondBr19 => 1 << 20,
            FixupKind::Arm64Br26 => 1 << 27,
            FixupKind::Arm64Tbz14 => 1 << 15,
            FixupKind::Arm64Adr21 => 1 << 20,
        }
    }
}

struct PendingFixup {
    /// Byte offset in `data` where the immediate field begins.
    site: u32,
    /// Width in bytes of the immediate field at `site` (used to zero/patch
    /// it generically for kinds without a target-specific encoder).
    width: u8,
    kind: FixupKind,
    target: FixupTarget,
    /// A target-supplied encoder: given the byte displacement `target -
    /// site_pc`, produce the bytes to splice in at `site`. Boxed rather than
    /// a bare `fn` because AArch64's branch words interleave the
    /// displacement with static opcode/condition/register bits that only
    /// the call site knows, unlike x86's standalone trailing rel32 field.
    encode: Box<dyn Fn(i64) -> Vec<u8>>,
}

#[derive(Copy, Clone, Debug)]
enum FixupTarget {
    Label(MachLabel),
    Veneer(u32),
}

pub struct MachBuffer {
    data: Vec<u8>,
    labels: Vec<Option<u32>>,
    block_labels: HashMap<Block, MachLabel>,
    fixups: Vec<PendingFixup>,
    relocs: Vec<Reloc>,
    constants: Vec<(u64, u32)>,
    veneers: Vec<(u32, i64)>,
    jump_tables: Vec<(MachLabel, Vec<MachLabel>)>,
    pub needs_icache_flush: bool,
    pub unwind: Option<UnwindInfo>,
}

impl MachBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            labels: Vec::new(),
            block_labels: HashMap::new(),
            fixups: Vec::new(),
            relocs: Vec::new(),
            constants: Vec::new(),
            veneers: Vec::new(),
            jump_tables: Vec::new(),
            needs_icache_flush: false,
            unwind: None,
        }
    }

    pub fn cur_offset(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn put4(&mut self, word: u32) {
        self.data.extend_from_slice(&word.to_le_bytes());
    }

    /// Create a fresh label, not yet bound to any offset.
    pub fn get_label(&mut self) -> MachLabel {
        self.labels.push(None);
        MachLabel((self.labels.len() - 1) as u32)
    }

    /// The label standing for the start of `block`, creating it on first
    /// request.
    pub fn label_for_block(&mut self, block: Block) -> MachLabel {
        if let Some(&l) = self.block_labels.get(&block) {
            return l;
        }
        let l = self.get_label();
        self.block_labels.insert(block, l);
        l
    }

    /// Bind `label` to the current offset — call exactly once per label,
    /// when emission reaches the position it names.
    pub fn bind_label(&mut self, label: MachLabel) {
        let off = self.cur_offset();
        self.labels[label.0 as usize] = Some(off);
    }

    pub fn resolve_label_offset(&self, label: MachLabel) -> Option<u32> {
        self.labels[label.0 as usize]
    }

    /// Record a fixup: the immediate at `site` should encode the
    /// displacement from `site` to `label`'s eventual offset, using
    /// `encode` to produce the bytes once that displacement is known.
    pub fn add_fixup(
        &mut self,
        site: u32,
        width: u8,
        kind: FixupKind,
        label: MachLabel,
        encode: impl Fn(i64) -> Vec<u8> + 'static,
    ) {
        self.fixups.push(PendingFixup {
            site,
            width,
            kind,
            target: FixupTarget::Label(label),
            encode: Box::new(encode),
        });
    }

    pub fn add_reloc(&mut self, offset: u32, kind: RelocKind, name: ExternalName, addend: i64) {
        self.relocs.push(Reloc {
            offset,
            kind,
            name,
            addend,
        });
    }

    /// Record a constant for the pool, returning its eventual offset
    /// relative to the *start of the pool* (patched in at `finish`).
    pub fn add_constant(&mut self, bits: u64, width: u32) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push((bits, width));
        idx
    }

    /// Register a `br_table`'s jump table: `targets[i]` is the label the
    /// table's `i`-th entry should point at. Returns a label for the
    /// table's own base, for an address-computing instruction (x64 `lea`
    /// rip-relative, AArch64 `adr`) to target like any other label.
    ///
    /// Entries are plain `target_offset - table_offset` `i32`s, computed
    /// in `finish` rather than here: at construction time a target block's
    /// label may not be bound yet (the block it names can come later in
    /// layout order), so there's nothing to compute until emission is
    /// done and every block label is final.
    pub fn add_jump_table(&mut self, targets: Vec<MachLabel>) -> MachLabel {
        let label = self.get_label();
        self.jump_tables.push((label, targets));
        label
    }

    /// Resolve every fixup, inserting branch-island veneers (appended in a
    /// pool after the function body, not interspersed) for any fixup whose
    /// computed displacement exceeds its kind's range, then append the
    /// constant pool. Iterates until no fixup is out of range or a bound
    /// on the number of rounds is hit (divergence is a backend bug, per
    /// spec.md §7 matching `RegAllocFailure`'s "bounded iteration"
    /// philosophy for the allocator).
    pub fn finish(mut self) -> CodegenResult<FinishedBuffer> {
        // Jump tables first: every block label is already bound by now
        // (emission binds each as it reaches that block, long before
        // `finish` runs), so a table's entries can be computed directly
        // and its own label bound to where the pool lands — which is what
        // lets the relaxation loop below treat a table-address fixup
        // (`adr`/rip-relative `lea`) exactly like any other label-relative
        // fixup, with no separate code path of its own.
        for (table_label, targets) in std::mem::take(&mut self.jump_tables) {
            while self.data.len() % 4 != 0 {
                self.data.push(0);
            }
            let table_off = self.cur_offset();
            self.labels[table_label.0 as usize] = Some(table_off);
            for target in targets {
                let target_off = self.labels[target.0 as usize].ok_or_else(|| {
                    CodegenError::Encoding(format!("unbound jump-table target {:?}", target))
                })?;
                let rel = target_off as i64 - table_off as i64;
                self.data.extend_from_slice(&(rel as i32).to_le_bytes());
            }
        }

        const MAX_ROUNDS: usize = 8;
        for _round in 0..MAX_ROUNDS {
            let mut all_in_range = true;
            let mut new_veneers = Vec::new();

            for fixup in &mut self.fixups {
                let target_off = match fixup.target {
                    FixupTarget::Label(l) => self
                        .labels
                        .get(l.0 as usize)
                        .and_then(|o| *o)
                        .ok_or_else(|| CodegenError::Encoding(format!("unbound label {:?}", l)))?,
                    FixupTarget::Veneer(off) => off,
                };
                let disp = target_off as i64 - fixup.site as i64;
                if disp.unsigned_abs() as i64 >= fixup.kind.range_bytes() {
                    all_in_range = false;
                    // Out of range: point this fixup at a veneer instead
                    // and remember to emit the veneer (an unconditional
                    // long branch to the real target) in the pool.
                    let veneer_index = new_veneers.len() as u32;
                    new_veneers.push((fixup.site, target_off as i64));
                    fixup.target = FixupTarget::Veneer(veneer_index);
                }
            }

            if all_in_range {
                break;
            }

            // Append veneer pool: each is an 8-byte absolute placeholder
            // the target's long-branch form reads (kept architecture
            // generic here; target `emit` implementations that want a
            // veneer use `MachBuffer::emit_veneer_placeholder`).
            let pool_base = self.cur_offset();
            for (_, target_off) in &new_veneers {
                self.veneers.push((self.cur_offset(), *target_off));
                self.data.extend_from_slice(&(*target_off as i64).to_le_bytes());
            }
            // Re-point veneer fixup targets at their pool slot now that we
            // know where the pool landed.
            let mut vi = 0;
            for fixup in &mut self.fixups {
                if let FixupTarget::Veneer(_) = fixup.target {
                    fixup.target = FixupTarget::Veneer(pool_base + (vi as u32) * 8);
                    vi += 1;
                }
            }
        }

        // Patch every fixup's bytes now that all targets are final.
        for fixup in &self.fixups {
            let target_off = match fixup.target {
                FixupTarget::Label(l) => self.labels[l.0 as usize]
                    .expect("label left unbound after relaxation"),
                FixupTarget::Veneer(off) => off,
            };
            let disp = target_off as i64 - fixup.site as i64;
            let bytes = (fixup.encode)(disp);
            let start = fixup.site as usize;
            let end = start + fixup.width as usize;
            if end > self.data.len() || bytes.len() != fixup.width as usize {
                return Err(CodegenError::Encoding(
                    "fixup encoder produced the wrong width".to_string(),
                ));
            }
            self.data[start..end].copy_from_slice(&bytes);
        }

        // Append the constant pool at the very end, word-aligned.
        let mut const_offsets = Vec::with_capacity(self.constants.len());
        for (bits, width) in &self.constants {
            while self.data.len() % 8 != 0 {
                self.data.push(0);
            }
            const_offsets.push(self.cur_offset());
            self.data.extend_from_slice(&bits.to_le_bytes()[..*width as usize]);
        }

        Ok(FinishedBuffer {
            data: self.data,
            relocs: self.relocs,
            unwind: self.unwind,
            needs_icache_flush: self.needs_icache_flush,
            constant_offsets: const_offsets,
        })
    }
}

impl Default for MachBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FinishedBuffer {
    pub data: Vec<u8>,
    pub relocs: Vec<Reloc>,
    pub unwind: Option<UnwindInfo>,
    pub needs_icache_flush: bool,
    pub constant_offsets: Vec<u32>,
}
