//! AArch64 machine instructions: fixed 4-byte words, one variant per
//! encoded form, matching the ARM Architecture Reference Manual's bit
//! layout exactly (spec.md §4.8). Unlike x64, every form here is a single
//! `u32` with no variable-length prefix/ModRM machinery.

use crate::binemit::buffer::{FixupKind, MachBuffer, MachLabel};
use crate::binemit::reloc::RelocKind;
use crate::ir::entities::ExternalName;
use crate::machinst::reg::{PReg, RegClass, RegRef};
use crate::machinst::vcode::{BranchTarget, MachInst};
use smallvec::{smallvec, SmallVec};

use super::regs::ZR;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandSize {
    S32,
    S64,
}

impl OperandSize {
    /// The `sf` bit: 1 selects the 64-bit register/operation variant.
    fn sf(self) -> u32 {
        match self {
            OperandSize::S32 => 0,
            OperandSize::S64 => 1,
        }
    }

    fn bits(self) -> u32 {
        match self {
            OperandSize::S32 => 32,
            OperandSize::S64 => 64,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    /// `SUBS` with the result discarded (`rd` forced to `xzr`): the `CMP`
    /// alias.
    SubS,
    /// `ANDS` with the result discarded: the `TST` alias, used to turn a
    /// raw truthiness value into flags without clobbering it.
    AndS,
    And,
    Orr,
    Eor,
    /// `ORN rd, rn, rm` (`rd = rn | ~rm`); with `rn = xzr` this is the `MVN`
    /// (bitwise-not) alias. Same shifted-register class as `Orr`, just with
    /// the `N` invert bit set.
    Orn,
    SDiv,
    UDiv,
}

impl AluOp {
    /// `top11` bits (31-21) for the `Rd = Rn op Rm` (shifted-register)
    /// encoding.
    fn rrr_top11(self) -> u32 {
        match self {
            AluOp::Add => 0b00001011_000,
            AluOp::Sub => 0b01001011_000,
            AluOp::SubS => 0b01101011_000,
            AluOp::AndS => 0b01101010_000,
            AluOp::And => 0b00001010_000,
            AluOp::Orr => 0b00101010_000,
            AluOp::Eor => 0b01001010_000,
            AluOp::Orn => 0b00101010_001,
            AluOp::SDiv => 0b10011010_110,
            AluOp::UDiv => 0b10011010_110,
        }
    }

    /// `bits15_10` for the two-operand data-processing forms that need a
    /// secondary opcode field beyond the primary `top11` (`SDIV`/`UDIV`);
    /// every other op leaves this field as a plain shift-amount of zero.
    fn rrr_bits15_10(self) -> u32 {
        match self {
            AluOp::SDiv => 0b000011,
            AluOp::UDiv => 0b000010,
            _ => 0,
        }
    }

    /// `top8` bits (31-24, pre-`sf`) for the `imm12` immediate-group form;
    /// only `Add`/`Sub` have one (no `ANDS`/`EOR` #imm in this backend).
    fn imm12_top8(self) -> u32 {
        match self {
            AluOp::Add => 0b000_10001,
            AluOp::Sub => 0b010_10001,
            _ => unreachable!("{:?} has no #imm12 form", self),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
}

/// `Jcc`/`B.cond`/`CCMP`/`CSEL`/`CSINC` share the same 4-bit condition
/// field (ARM ARM C1.2.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Hs,
    Lo,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Cond {
    fn bits(self) -> u32 {
        match self {
            Cond::Eq => 0x0,
            Cond::Ne => 0x1,
            Cond::Hs => 0x2,
            Cond::Lo => 0x3,
            Cond::Mi => 0x4,
            Cond::Pl => 0x5,
            Cond::Vs => 0x6,
            Cond::Vc => 0x7,
            Cond::Hi => 0x8,
            Cond::Ls => 0x9,
            Cond::Ge => 0xA,
            Cond::Lt => 0xB,
            Cond::Gt => 0xC,
            Cond::Le => 0xD,
            Cond::Al => 0xE,
        }
    }

    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Al,
        }
    }

    pub fn from_int_cc(cc: crate::ir::condcodes::IntCC) -> Self {
        use crate::ir::condcodes::IntCC;
        match cc {
            IntCC::Equal => Cond::Eq,
            IntCC::NotEqual => Cond::Ne,
            IntCC::SignedLessThan => Cond::Lt,
            IntCC::SignedGreaterThanOrEqual => Cond::Ge,
            IntCC::SignedGreaterThan => Cond::Gt,
            IntCC::SignedLessThanOrEqual => Cond::Le,
            IntCC::UnsignedLessThan => Cond::Lo,
            IntCC::UnsignedGreaterThanOrEqual => Cond::Hs,
            IntCC::UnsignedGreaterThan => Cond::Hi,
            IntCC::UnsignedLessThanOrEqual => Cond::Ls,
        }
    }
}

/// A `base + scaled-uimm12` memory operand (the `LDR`/`STR` unsigned-offset
/// form); `offset` is a byte offset, scaled down by the access size when
/// encoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemArg {
    pub base: RegRef,
    pub offset: i32,
}

#[derive(Clone, Debug)]
pub enum Inst {
    MovZ { size: OperandSize, rd: RegRef, imm16: u16, shift: u8 },
    MovK { size: OperandSize, rd: RegRef, imm16: u16, shift: u8 },
    /// `ORR rd, xzr, rm`: the canonical register-move idiom (no dedicated
    /// `MOV Rd, Rn` opcode exists).
    MovReg { size: OperandSize, rd: RegRef, rm: RegRef },
    AluRRR { op: AluOp, size: OperandSize, rd: RegRef, rn: RegRef, rm: RegRef },
    AluRRImm12 { op: AluOp, size: OperandSize, rd: RegRef, rn: RegRef, imm12: u16 },
    /// `MADD`/`MUL` (`ra = xzr`): `rd = rn * rm + ra`.
    Madd { size: OperandSize, rd: RegRef, rn: RegRef, rm: RegRef, ra: RegRef },
    ShiftImm { op: ShiftOp, size: OperandSize, rd: RegRef, rn: RegRef, amount: u8 },
    /// `SBFM`/`UBFM` sign/zero-extending a `from_bits`-wide value in `rn`
    /// up to `to_bits`.
    Extend { signed: bool, rd: RegRef, rn: RegRef, from_bits: u8, to_bits: u8 },
    Ldr { size: OperandSize, rd: RegRef, mem: MemArg },
    Str { size: OperandSize, rd: RegRef, mem: MemArg },
    /// `STP` (64-bit pair), used by the prologue to save `fp`/`lr` together.
    Stp { rt: RegRef, rt2: RegRef, mem: MemArg },
    Ldp { rt: RegRef, rt2: RegRef, mem: MemArg },
    B { target: BranchTarget },
    BCond { cond: Cond, target: BranchTarget },
    Tbz { bit: u8, reg: RegRef, target: BranchTarget },
    Tbnz { bit: u8, reg: RegRef, target: BranchTarget },
    Ccmp { size: OperandSize, rn: RegRef, rm: RegRef, nzcv: u8, cond: Cond },
    CcmpImm { size: OperandSize, rn: RegRef, imm5: u8, nzcv: u8, cond: Cond },
    /// `CSINC rd, rn, rn, invert(cond)`: `rd = cond ? rn+1 : rn`. With
    /// `rn = xzr` this is the `CSET` alias materializing a boolean.
    Cinc { size: OperandSize, rd: RegRef, rn: RegRef, cond: Cond },
    Csel { size: OperandSize, rd: RegRef, rn: RegRef, rm: RegRef, cond: Cond },
    Bl { name: ExternalName, uses: SmallVec<[RegRef; 8]>, defs: SmallVec<[RegRef; 2]> },
    BlrIndirect { rm: RegRef, uses: SmallVec<[RegRef; 8]>, defs: SmallVec<[RegRef; 2]> },
    Ret,
    /// A function parameter the ABI placed on the stack rather than in a
    /// register (spec.md §4.5). `off` is its byte offset within the
    /// stack-argument area, known from `assign_arguments` alone; the
    /// frame-pointer-relative base it's measured from depends on the final
    /// frame size, so `context::compile_with_backend` rewrites every one of
    /// these into a plain `Ldr` (via `Backend::finalize_incoming_stack_args`)
    /// once that size is known, right after register allocation and before
    /// the prologue is spliced in. Never reaches `emit` in a fully compiled
    /// function.
    IncomingStackArg { dst: RegRef, off: i32, size: OperandSize },
    /// `br_table`'s indirect dispatch (spec.md §4.4 "BrTable"): `idx` is
    /// the already bounds-checked (`0 <= idx < targets.len()`) switch
    /// value, `tmp1`/`tmp2` scratch registers the lowering rule reserved
    /// for it. Expands to an `adr` of the jump table (registered via
    /// `MachBuffer::add_jump_table`), an `ldrsw` of `table[idx]` (a
    /// target-relative `i32`), and an indirect `br` to `table_base +
    /// table[idx]`.
    JTSequence { idx: RegRef, tmp1: RegRef, tmp2: RegRef, targets: Vec<BranchTarget> },
}

fn preg_enc(r: RegRef) -> u32 {
    r.as_preg()
        .expect("aarch64 emission requires physical registers; run register allocation first")
        .hw_enc() as u32
        & 31
}

fn enc_arith_rrr(top11: u32, bits15_10: u32, rd: u32, rn: u32, rm: u32) -> u32 {
    (top11 << 21) | (bits15_10 << 10) | (rm << 16) | (rn << 5) | rd
}

fn enc_arith_rr_imm12(top8_with_sf: u32, imm12: u32, rn: u32, rd: u32) -> u32 {
    (top8_with_sf << 24) | (imm12 << 10) | (rn << 5) | rd
}

fn enc_move_wide(is_movk: bool, sf: u32, rd: u32, imm16: u16, shift: u8) -> u32 {
    let op = if is_movk { 0b11 } else { 0b10 };
    0x12800000 | (sf << 31) | (op << 29) | ((shift as u32 / 16) << 21) | ((imm16 as u32) << 5) | rd
}

fn enc_madd(sf: u32, rd: u32, rn: u32, rm: u32, ra: u32) -> u32 {
    (0b0_00_11011_000 << 21) | (sf << 31) | (rm << 16) | (ra << 10) | (rn << 5) | rd
}

fn enc_bfm(opc: u32, sf: u32, rd: u32, rn: u32, immr: u32, imms: u32) -> u32 {
    0b0_00_100110_0_000000_000000_00000_00000
        | (sf << 31)
        | (opc << 29)
        | (sf << 22) // N bit tracks sf for the 32-/64-bit forms used here.
        | (immr << 16)
        | (imms << 10)
        | (rn << 5)
        | rd
}

/// Shared helper for `LSL`/`LSR`/`ASR #imm`, encoded as `UBFM` aliases per
/// the ARM ARM's immediate-shift pseudocode.
fn enc_shift_imm(op: ShiftOp, size: OperandSize, rd: u32, rn: u32, amount: u8) -> u32 {
    let bits = size.bits();
    let sf = size.sf();
    let (immr, imms) = match op {
        ShiftOp::Lsl => (((bits - amount as u32) % bits), bits - 1 - amount as u32),
        ShiftOp::Lsr => (amount as u32, bits - 1),
        ShiftOp::Asr => (amount as u32, bits - 1),
    };
    let opc = match op {
        ShiftOp::Asr => 0b00,
        _ => 0b10,
    };
    enc_bfm(opc, sf, rd, rn, immr, imms)
}

/// Bits 31-22 of the "load/store register (unsigned immediate)" class:
/// `size(2) 111 V=0 00 opc(2)`, `opc` = `00` store / `01` load (ARM ARM
/// C4.1.3). `size_code` is `10` for a 32-bit access, `11` for 64-bit.
fn ldst_op(size_code: u32, is_load: bool) -> u32 {
    (size_code << 8) | 0b11100000 | if is_load { 0b01 } else { 0b00 }
}

fn enc_ldst_uimm12(op_31_22: u32, imm12: u32, rn: u32, rd: u32) -> u32 {
    (op_31_22 << 22) | (1 << 24) | (imm12 << 10) | (rn << 5) | rd
}

/// `STP`/`LDP` (64-bit GPR pair, signed-offset addressing mode, ARM ARM
/// C4.1.4). `0b1010100100`/`...101` are the store/load forms of bits 31-22.
fn enc_ldst_pair(op_31_22: u32, simm7: i32, rn: u32, rt: u32, rt2: u32) -> u32 {
    let imm7 = (simm7 / 8) as u32 & 0x7F;
    (op_31_22 << 22) | (imm7 << 15) | (rt2 << 10) | (rn << 5) | rt
}

/// `ADR rd, #imm21` (PC-relative address, ARM ARM C6.2.10): `immlo`/`immhi`
/// split across bits 30-29 and 23-5.
fn enc_adr(imm21: i32, rd: u32) -> u32 {
    let immlo = (imm21 as u32) & 0x3;
    let immhi = ((imm21 as u32) >> 2) & 0x7FFFF;
    (immlo << 29) | (0b10000 << 24) | (immhi << 5) | rd
}

/// Bits 31-22 of `LDRSW` (immediate, unsigned offset): a 32-bit load
/// (`size = 10`) that sign-extends into the 64-bit destination (`opc =
/// 10`), unlike the zero-extending `LDR`/`STR` pair `ldst_op` builds.
fn ldst_op_ldrsw() -> u32 {
    (0b10 << 8) | 0b11100000 | 0b10
}

fn enc_br(rn: u32) -> u32 {
    0b1101011_0000_11111_000000_00000_00000 | (rn << 5)
}

fn enc_b(off_26: u32) -> u32 {
    (0b000101 << 26) | (off_26 & 0x03FF_FFFF)
}

fn enc_bl(off_26: u32) -> u32 {
    (0b100101 << 26) | (off_26 & 0x03FF_FFFF)
}

fn enc_bcond(cond: Cond, off_19: u32) -> u32 {
    (0b01010100 << 24) | ((off_19 & 0x7FFFF) << 5) | cond.bits()
}

fn enc_tbz(is_nz: bool, bit: u8, off_14: u32, reg: u32) -> u32 {
    let b5 = (bit >> 5) as u32;
    let b40 = (bit & 0x1F) as u32;
    let nz = if is_nz { 1 } else { 0 };
    (b5 << 31) | (0b0110110 << 24) | (nz << 24) | (b40 << 19) | ((off_14 & 0x3FFF) << 5) | reg
}

fn enc_ccmp(sf: u32, rn: u32, rm: u32, nzcv: u8, cond: Cond) -> u32 {
    0b0_1_1_11010010_00000_0000_00_00000_0_0000
        | (sf << 31)
        | (rm << 16)
        | (cond.bits() << 12)
        | (rn << 5)
        | (nzcv as u32 & 0xF)
}

fn enc_ccmp_imm(sf: u32, rn: u32, imm5: u8, nzcv: u8, cond: Cond) -> u32 {
    0b0_1_1_11010010_00000_0000_10_00000_0_0000
        | (sf << 31)
        | ((imm5 as u32 & 0x1F) << 16)
        | (cond.bits() << 12)
        | (rn << 5)
        | (nzcv as u32 & 0xF)
}

/// `op`/`o2` select `CSEL` (0,0), `CSINC` (0,1), `CSINV` (1,0), `CSNEG`
/// (1,1); this backend only needs `CSEL` and `CSINC`.
fn enc_csel(sf: u32, rd: u32, rn: u32, rm: u32, cond: Cond, op: u32, o2: u32) -> u32 {
    0b0_0_0_11010100_00000_0000_00_00000_00000
        | (sf << 31)
        | (op << 30)
        | (rm << 16)
        | (cond.bits() << 12)
        | (o2 << 10)
        | (rn << 5)
        | rd
}

impl MachInst for Inst {
    fn uses(&self) -> SmallVec<[RegRef; 4]> {
        match self {
            Inst::MovZ { .. } | Inst::MovK { .. } => smallvec![],
            Inst::MovReg { rm, .. } => smallvec![*rm],
            Inst::AluRRR { rn, rm, .. } => smallvec![*rn, *rm],
            Inst::AluRRImm12 { rn, .. } => smallvec![*rn],
            Inst::Madd { rn, rm, ra, .. } => smallvec![*rn, *rm, *ra],
            Inst::ShiftImm { rn, .. } => smallvec![*rn],
            Inst::Extend { rn, .. } => smallvec![*rn],
            Inst::Ldr { mem, .. } => smallvec![mem.base],
            Inst::Str { rd, mem, .. } => smallvec![*rd, mem.base],
            Inst::Stp { rt, rt2, mem } => smallvec![*rt, *rt2, mem.base],
            Inst::Ldp { mem, .. } => smallvec![mem.base],
            Inst::B { .. } | Inst::BCond { .. } | Inst::Ret => smallvec![],
            Inst::Tbz { reg, .. } | Inst::Tbnz { reg, .. } => smallvec![*reg],
            Inst::Ccmp { rn, rm, .. } => smallvec![*rn, *rm],
            Inst::CcmpImm { rn, .. } => smallvec![*rn],
            Inst::Cinc { rn, .. } => smallvec![*rn],
            Inst::Csel { rn, rm, .. } => smallvec![*rn, *rm],
            Inst::Bl { uses, .. } => uses.clone(),
            Inst::BlrIndirect { rm, uses, .. } => {
                let mut v = uses.clone();
                v.push(*rm);
                v
            }
            Inst::IncomingStackArg { .. } => smallvec![],
            Inst::JTSequence { idx, .. } => smallvec![*idx],
        }
    }

    fn defs(&self) -> SmallVec<[RegRef; 2]> {
        match self {
            Inst::MovZ { rd, .. }
            | Inst::MovK { rd, .. }
            | Inst::MovReg { rd, .. }
            | Inst::AluRRR { rd, .. }
            | Inst::AluRRImm12 { rd, .. }
            | Inst::Madd { rd, .. }
            | Inst::ShiftImm { rd, .. }
            | Inst::Extend { rd, .. }
            | Inst::Ldr { rd, .. }
            | Inst::Cinc { rd, .. }
            | Inst::Csel { rd, .. }
            | Inst::IncomingStackArg { dst: rd, .. } => smallvec![*rd],
            Inst::Stp { .. }
            | Inst::Str { .. }
            | Inst::B { .. }
            | Inst::BCond { .. }
            | Inst::Tbz { .. }
            | Inst::Tbnz { .. }
            | Inst::Ccmp { .. }
            | Inst::CcmpImm { .. }
            | Inst::Ret => smallvec![],
            Inst::Ldp { rt, rt2, .. } => smallvec![*rt, *rt2],
            Inst::Bl { defs, .. } | Inst::BlrIndirect { defs, .. } => defs.clone(),
            Inst::JTSequence { tmp1, tmp2, .. } => smallvec![*tmp1, *tmp2],
        }
    }

    fn is_move(&self) -> Option<(RegRef, RegRef)> {
        match self {
            Inst::MovReg { rd, rm, .. } => Some((*rd, *rm)),
            _ => None,
        }
    }

    fn rewrite_regs(&mut self, map: &mut dyn FnMut(RegRef) -> RegRef) {
        match self {
            Inst::MovZ { rd, .. } | Inst::MovK { rd, .. } => *rd = map(*rd),
            Inst::MovReg { rd, rm, .. } => {
                *rd = map(*rd);
                *rm = map(*rm);
            }
            Inst::AluRRR { rd, rn, rm, .. } => {
                *rd = map(*rd);
                *rn = map(*rn);
                *rm = map(*rm);
            }
            Inst::AluRRImm12 { rd, rn, .. } => {
                *rd = map(*rd);
                *rn = map(*rn);
            }
            Inst::Madd { rd, rn, rm, ra, .. } => {
                *rd = map(*rd);
                *rn = map(*rn);
                *rm = map(*rm);
                *ra = map(*ra);
            }
            Inst::ShiftImm { rd, rn, .. } | Inst::Extend { rd, rn, .. } => {
                *rd = map(*rd);
                *rn = map(*rn);
            }
            Inst::Ldr { rd, mem, .. } => {
                *rd = map(*rd);
                mem.base = map(mem.base);
            }
            Inst::Str { rd, mem, .. } => {
                *rd = map(*rd);
                mem.base = map(mem.base);
            }
            Inst::Stp { rt, rt2, mem } => {
                *rt = map(*rt);
                *rt2 = map(*rt2);
                mem.base = map(mem.base);
            }
            Inst::Ldp { rt, rt2, mem } => {
                *rt = map(*rt);
                *rt2 = map(*rt2);
                mem.base = map(mem.base);
            }
            Inst::B { .. } | Inst::Ret => {}
            Inst::BCond { .. } => {}
            Inst::Tbz { reg, .. } | Inst::Tbnz { reg, .. } => *reg = map(*reg),
            Inst::Ccmp { rn, rm, .. } => {
                *rn = map(*rn);
                *rm = map(*rm);
            }
            Inst::CcmpImm { rn, .. } => *rn = map(*rn),
            Inst::Cinc { rd, rn, .. } => {
                *rd = map(*rd);
                *rn = map(*rn);
            }
            Inst::Csel { rd, rn, rm, .. } => {
                *rd = map(*rd);
                *rn = map(*rn);
                *rm = map(*rm);
            }
            Inst::Bl { uses, defs, .. } => {
                for u in uses.iter_mut() {
                    *u = map(*u);
                }
                for d in defs.iter_mut() {
                    *d = map(*d);
                }
            }
            Inst::BlrIndirect { rm, uses, defs } => {
                *rm = map(*rm);
                for u in uses.iter_mut() {
                    *u = map(*u);
                }
                for d in defs.iter_mut() {
                    *d = map(*d);
                }
            }
            Inst::IncomingStackArg { dst, .. } => *dst = map(*dst),
            Inst::JTSequence { idx, tmp1, tmp2, .. } => {
                *idx = map(*idx);
                *tmp1 = map(*tmp1);
                *tmp2 = map(*tmp2);
            }
        }
    }

    fn clobbers(&self) -> &[PReg] {
        match self {
            Inst::Bl { .. } | Inst::BlrIndirect { .. } => super::regs::AAPCS64_CALLER_SAVED,
            _ => &[],
        }
    }

    fn is_call(&self) -> bool {
        matches!(self, Inst::Bl { .. } | Inst::BlrIndirect { .. })
    }

    fn branch_target(&self) -> Option<BranchTarget> {
        match self {
            Inst::B { target } => Some(*target),
            Inst::BCond { target, .. } => Some(*target),
            Inst::Tbz { target, .. } => Some(*target),
            Inst::Tbnz { target, .. } => Some(*target),
            _ => None,
        }
    }

    fn with_branch_target(&self, target: BranchTarget) -> Self {
        match self {
            Inst::B { .. } => Inst::B { target },
            Inst::BCond { cond, .. } => Inst::BCond { cond: *cond, target },
            Inst::Tbz { bit, reg, .. } => Inst::Tbz { bit: *bit, reg: *reg, target },
            Inst::Tbnz { bit, reg, .. } => Inst::Tbnz { bit: *bit, reg: *reg, target },
            _ => self.clone(),
        }
    }

    /// Float-class moves reuse `MovReg`'s GPR encoding, which is wrong for
    /// V registers (no `fmov`/vector-register form exists in this `Inst`
    /// enum — this backend has no float arithmetic encodings at all yet).
    /// Harmless for the int-only test programs this crate currently
    /// exercises.
    fn gen_move(dst: RegRef, src: RegRef, _class: RegClass) -> Self {
        Inst::MovReg { size: OperandSize::S64, rd: dst, rm: src }
    }

    fn spill_load(dst: RegRef, slot_offset: i32, _class: RegClass) -> Self {
        Inst::Ldr {
            size: OperandSize::S64,
            rd: dst,
            mem: MemArg { base: RegRef::Physical(super::regs::FP), offset: slot_offset },
        }
    }

    fn spill_store(src: RegRef, slot_offset: i32, _class: RegClass) -> Self {
        Inst::Str {
            size: OperandSize::S64,
            rd: src,
            mem: MemArg { base: RegRef::Physical(super::regs::FP), offset: slot_offset },
        }
    }

    fn emit(&self, buf: &mut MachBuffer) {
        match self {
            Inst::MovZ { size, rd, imm16, shift } => {
                buf.put4(enc_move_wide(false, size.sf(), preg_enc(*rd), *imm16, *shift));
            }
            Inst::MovK { size, rd, imm16, shift } => {
                buf.put4(enc_move_wide(true, size.sf(), preg_enc(*rd), *imm16, *shift));
            }
            Inst::MovReg { size, rd, rm } => {
                buf.put4(enc_arith_rrr(
                    AluOp::Orr.rrr_top11() | (size.sf() << 9),
                    0,
                    preg_enc(*rd),
                    ZR.hw_enc() as u32,
                    preg_enc(*rm),
                ));
            }
            Inst::AluRRR { op, size, rd, rn, rm } => {
                let rd_enc = if matches!(op, AluOp::SubS | AluOp::AndS) {
                    ZR.hw_enc() as u32
                } else {
                    preg_enc(*rd)
                };
                buf.put4(enc_arith_rrr(
                    op.rrr_top11() | (size.sf() << 10),
                    op.rrr_bits15_10(),
                    rd_enc,
                    preg_enc(*rn),
                    preg_enc(*rm),
                ));
            }
            Inst::AluRRImm12 { op, size, rd, rn, imm12 } => {
                let top8 = op.imm12_top8() | (size.sf() << 7);
                buf.put4(enc_arith_rr_imm12(top8, *imm12 as u32, preg_enc(*rn), preg_enc(*rd)));
            }
            Inst::Madd { size, rd, rn, rm, ra } => {
                buf.put4(enc_madd(size.sf(), preg_enc(*rd), preg_enc(*rn), preg_enc(*rm), preg_enc(*ra)));
            }
            Inst::ShiftImm { op, size, rd, rn, amount } => {
                buf.put4(enc_shift_imm(*op, *size, preg_enc(*rd), preg_enc(*rn), *amount));
            }
            Inst::Extend { signed, rd, rn, from_bits, to_bits } => {
                let opc = if *signed { 0b00 } else { 0b10 };
                let size = if *to_bits > 32 { OperandSize::S64 } else { OperandSize::S32 };
                buf.put4(enc_bfm(opc, size.sf(), preg_enc(*rd), preg_enc(*rn), 0, (*from_bits - 1) as u32));
            }
            Inst::Ldr { size, rd, mem } => {
                let (scale, size_code) = if *size == OperandSize::S64 { (3, 0b11) } else { (2, 0b10) };
                let imm12 = (mem.offset >> scale) as u32;
                buf.put4(enc_ldst_uimm12(ldst_op(size_code, true), imm12, preg_enc(mem.base), preg_enc(*rd)));
            }
            Inst::Str { size, rd, mem } => {
                let (scale, size_code) = if *size == OperandSize::S64 { (3, 0b11) } else { (2, 0b10) };
                let imm12 = (mem.offset >> scale) as u32;
                buf.put4(enc_ldst_uimm12(ldst_op(size_code, false), imm12, preg_enc(mem.base), preg_enc(*rd)));
            }
            Inst::Stp { rt, rt2, mem } => {
                buf.put4(enc_ldst_pair(
                    0b1010100100,
                    mem.offset,
                    preg_enc(mem.base),
                    preg_enc(*rt),
                    preg_enc(*rt2),
                ));
            }
            Inst::Ldp { rt, rt2, mem } => {
                buf.put4(enc_ldst_pair(
                    0b1010100101,
                    mem.offset,
                    preg_enc(mem.base),
                    preg_enc(*rt),
                    preg_enc(*rt2),
                ));
            }
            Inst::B { target } => emit_b(buf, *target),
            Inst::BCond { cond, target } => emit_bcond(buf, *cond, *target),
            Inst::Tbz { bit, reg, target } => emit_tbz(buf, false, *bit, *reg, *target),
            Inst::Tbnz { bit, reg, target } => emit_tbz(buf, true, *bit, *reg, *target),
            Inst::Ccmp { size, rn, rm, nzcv, cond } => {
                buf.put4(enc_ccmp(size.sf(), preg_enc(*rn), preg_enc(*rm), *nzcv, *cond));
            }
            Inst::CcmpImm { size, rn, imm5, nzcv, cond } => {
                buf.put4(enc_ccmp_imm(size.sf(), preg_enc(*rn), *imm5, *nzcv, *cond));
            }
            Inst::Cinc { size, rd, rn, cond } => {
                let rn_enc = preg_enc(*rn);
                buf.put4(enc_csel(size.sf(), preg_enc(*rd), rn_enc, rn_enc, cond.invert(), 0, 1));
            }
            Inst::Csel { size, rd, rn, rm, cond } => {
                buf.put4(enc_csel(size.sf(), preg_enc(*rd), preg_enc(*rn), preg_enc(*rm), *cond, 0, 0));
            }
            Inst::Ret => buf.put4(0xd65f03c0),
            Inst::Bl { name, .. } => {
                let site = buf.cur_offset();
                buf.add_reloc(site, RelocKind::Arm64Call, name.clone(), 0);
                buf.put4(enc_bl(0));
            }
            Inst::BlrIndirect { rm, .. } => {
                buf.put4(0b1101011_0001_11111_000000_00000_00000 | (preg_enc(*rm) << 5));
            }
            Inst::IncomingStackArg { .. } => {
                unreachable!("IncomingStackArg must be resolved by Backend::finalize_incoming_stack_args before emission")
            }
            Inst::JTSequence { idx, tmp1, tmp2, targets } => {
                let table_labels: Vec<MachLabel> = targets
                    .iter()
                    .map(|t| match t {
                        BranchTarget::Label(b) => buf.label_for_block(*b),
                        BranchTarget::ResolvedOffset(_) => {
                            unreachable!("jump-table targets are always labels")
                        }
                    })
                    .collect();
                let table = buf.add_jump_table(table_labels);

                let (ix, t1, t2) = (preg_enc(*idx), preg_enc(*tmp1), preg_enc(*tmp2));

                // adr tmp1, table
                let site = buf.cur_offset();
                buf.put4(enc_adr(0, t1));
                buf.add_fixup(site, 4, FixupKind::Arm64Adr21, table, move |disp| {
                    enc_adr(disp as i32, t1).to_le_bytes().to_vec()
                });
                // lsl tmp2, idx, #2 (32-bit; implicitly zero-extends to 64)
                buf.put4(enc_shift_imm(ShiftOp::Lsl, OperandSize::S32, t2, ix, 2));
                // add tmp1, tmp1, tmp2 -> tmp1 = table address + idx*4
                buf.put4(enc_arith_rrr(AluOp::Add.rrr_top11() | (1 << 10), 0, t1, t1, t2));
                // ldrsw tmp2, [tmp1] -> tmp2 = sign-extended table[idx]
                buf.put4(enc_ldst_uimm12(ldst_op_ldrsw(), 0, t1, t2));
                // add tmp1, tmp1, tmp2 -> tmp1 = target absolute address
                buf.put4(enc_arith_rrr(AluOp::Add.rrr_top11() | (1 << 10), 0, t1, t1, t2));
                // br tmp1
                buf.put4(enc_br(t1));
            }
        }
    }

    fn load_incoming_stack_arg(dst: RegRef, off: i32, ty: crate::ir::Type) -> Self {
        let size = if ty.bits() > 32 { OperandSize::S64 } else { OperandSize::S32 };
        Inst::IncomingStackArg { dst, off, size }
    }
}

fn emit_b(buf: &mut MachBuffer, target: BranchTarget) {
    let site = buf.cur_offset();
    match target {
        BranchTarget::Label(block) => {
            buf.put4(enc_b(0));
            let label = buf.label_for_block(block);
            buf.add_fixup(site, 4, FixupKind::Arm64Br26, label, move |disp| {
                enc_b(((disp / 4) as u32) & 0x03FF_FFFF).to_le_bytes().to_vec()
            });
        }
        BranchTarget::ResolvedOffset(off) => buf.put4(enc_b(((off / 4) as u32) & 0x03FF_FFFF)),
    }
}

fn emit_bcond(buf: &mut MachBuffer, cond: Cond, target: BranchTarget) {
    let site = buf.cur_offset();
    match target {
        BranchTarget::Label(block) => {
            buf.put4(enc_bcond(cond, 0));
            let label = buf.label_for_block(block);
            buf.add_fixup(site, 4, FixupKind::Arm64CondBr19, label, move |disp| {
                enc_bcond(cond, ((disp / 4) as u32) & 0x7FFFF).to_le_bytes().to_vec()
            });
        }
        BranchTarget::ResolvedOffset(off) => buf.put4(enc_bcond(cond, ((off / 4) as u32) & 0x7FFFF)),
    }
}

fn emit_tbz(buf: &mut MachBuffer, is_nz: bool, bit: u8, reg: RegRef, target: BranchTarget) {
    let site = buf.cur_offset();
    let reg_enc = preg_enc(reg);
    match target {
        BranchTarget::Label(block) => {
            buf.put4(enc_tbz(is_nz, bit, 0, reg_enc));
            let label = buf.label_for_block(block);
            buf.add_fixup(site, 4, FixupKind::Arm64Tbz14, label, move |disp| {
                enc_tbz(is_nz, bit, ((disp / 4) as u32) & 0x3FFF, reg_enc).to_le_bytes().to_vec()
            });
        }
        BranchTarget::ResolvedOffset(off) => {
            buf.put4(enc_tbz(is_nz, bit, ((off / 4) as u32) & 0x3FFF, reg_enc))
        }
    }
}
