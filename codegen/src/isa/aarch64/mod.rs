//! The AArch64 backend: AAPCS64 ABI, fixed-width ARM-ARM-exact instruction
//! encodings, and the lowering rules from `ir::Opcode` to them.

pub mod abi;
pub mod inst;
pub mod lower;
pub mod regs;

pub use abi::AAPCS64AbiSpec;
pub use inst::Inst;

use crate::binemit::reloc::RelocKind;
use crate::binemit::unwind::{UnwindCode, UnwindInfo};
use crate::ir::CallConv;
use crate::machinst::abi::FrameLayout;
use crate::machinst::reg::{PReg, RegRef};
use crate::machinst::vcode::BranchTarget;
use inst::{AluOp, MemArg, OperandSize};

const CALLEE_SAVED_CANDIDATES: &[PReg] = &[
    regs::X19,
    regs::X20,
    regs::X21,
    regs::X22,
    regs::X23,
    regs::X24,
    regs::X25,
    regs::X26,
    regs::X27,
    regs::X28,
];

fn round_up(x: u32, align: u32) -> u32 {
    (x + align - 1) / align * align
}

/// Total bytes `sp` moves by in the prologue: locals/spill area, `fp`/`lr`,
/// and each saved callee-saved register, 16-byte aligned (`Stp`/`Ldp`
/// require SP itself to stay 16-byte aligned throughout AAPCS64 code).
fn total_frame_size(frame: &FrameLayout) -> u32 {
    round_up(frame.locals_size() + 16 + 8 * frame.callee_saved.len() as u32, 16)
}

pub struct Aarch64Backend;

impl crate::context::Backend for Aarch64Backend {
    type Inst = Inst;
    type Abi = AAPCS64AbiSpec;

    fn rule_table() -> crate::machinst::lower::RuleTable<Inst> {
        lower::rule_table()
    }

    fn allocatable_int() -> &'static [PReg] {
        regs::AAPCS64_ALLOCATABLE_INT
    }

    fn allocatable_float() -> &'static [PReg] {
        regs::AAPCS64_ALLOCATABLE_FLOAT
    }

    fn scratch_int() -> PReg {
        regs::SCRATCH_INT
    }

    fn exception_value_reg() -> PReg {
        regs::X0
    }

    fn callee_saved_candidates() -> &'static [PReg] {
        CALLEE_SAVED_CANDIDATES
    }

    fn is_return(inst: &Inst) -> bool {
        matches!(inst, Inst::Ret)
    }

    fn gen_jump(target: BranchTarget) -> Inst {
        Inst::B { target }
    }

    /// `sub sp, sp, #total; stp fp, lr, [sp, #locals]; str` each used
    /// callee-saved register above that pair; `add fp, sp, #locals`. `fp`
    /// ends up at the *bottom* of the locals/spill region, matching the
    /// positive-offset convention `spill_load`/`spill_store`/`stack_addr`
    /// already use (see `inst.rs`). `Stp`/`Ldp`/`AluRRImm12` only take a
    /// 12-bit unsigned immediate, so a frame bigger than 4095 bytes isn't
    /// representable here — an existing, documented limit (see
    /// `DESIGN.md`), not something new this pass introduces.
    fn gen_prologue(frame: &FrameLayout) -> Vec<Inst> {
        let locals = frame.locals_size();
        let total = total_frame_size(frame);
        let mut insts = vec![Inst::AluRRImm12 {
            op: AluOp::Sub,
            size: OperandSize::S64,
            rd: RegRef::Physical(regs::SP),
            rn: RegRef::Physical(regs::SP),
            imm12: total as u16,
        }];
        insts.push(Inst::Stp {
            rt: RegRef::Physical(regs::FP),
            rt2: RegRef::Physical(regs::LR),
            mem: MemArg {
                base: RegRef::Physical(regs::SP),
                offset: locals as i32,
            },
        });
        for (i, &r) in frame.callee_saved.iter().enumerate() {
            insts.push(Inst::Str {
                size: OperandSize::S64,
                rd: RegRef::Physical(r),
                mem: MemArg {
                    base: RegRef::Physical(regs::SP),
                    offset: (locals + 16 + 8 * i as u32) as i32,
                },
            });
        }
        insts.push(Inst::AluRRImm12 {
            op: AluOp::Add,
            size: OperandSize::S64,
            rd: RegRef::Physical(regs::FP),
            rn: RegRef::Physical(regs::SP),
            imm12: locals as u16,
        });
        insts
    }

    /// `fp` sits `locals` bytes above the lowered `sp` (see `gen_prologue`),
    /// which itself sits `total - locals` bytes below the incoming `sp` —
    /// the stack-argument area starts right there, since AAPCS64 passes the
    /// return address in `lr`, not on the stack. `off == 0` is the first
    /// stack-passed argument.
    fn finalize_incoming_stack_args(vcode: &mut crate::machinst::vcode::VCode<Inst>, frame: &FrameLayout) {
        let base = (total_frame_size(frame) - frame.locals_size()) as i32;
        for inst in vcode.insts.iter_mut() {
            if let Inst::IncomingStackArg { dst, off, size } = *inst {
                *inst = Inst::Ldr {
                    size,
                    rd: dst,
                    mem: MemArg { base: RegRef::Physical(regs::FP), offset: base + off },
                };
            }
        }
    }

    fn gen_epilogue(frame: &FrameLayout) -> Vec<Inst> {
        let locals = frame.locals_size();
        let total = total_frame_size(frame);
        let mut insts = Vec::new();
        for (i, &r) in frame.callee_saved.iter().enumerate().rev() {
            insts.push(Inst::Ldr {
                size: OperandSize::S64,
                rd: RegRef::Physical(r),
                mem: MemArg {
                    base: RegRef::Physical(regs::SP),
                    offset: (locals + 16 + 8 * i as u32) as i32,
                },
            });
        }
        insts.push(Inst::Ldp {
            rt: RegRef::Physical(regs::FP),
            rt2: RegRef::Physical(regs::LR),
            mem: MemArg {
                base: RegRef::Physical(regs::SP),
                offset: locals as i32,
            },
        });
        insts.push(Inst::AluRRImm12 {
            op: AluOp::Add,
            size: OperandSize::S64,
            rd: RegRef::Physical(regs::SP),
            rn: RegRef::Physical(regs::SP),
            imm12: total as u16,
        });
        insts
    }

    /// AAPCS64 has no Windows-specific calling convention in this crate's
    /// `CallConv` (`Aapcs64`/`AppleAarch64` are the only AArch64 variants),
    /// so this always emits the System V unwind encoding — see
    /// `DESIGN.md`.
    fn unwind_info(frame: &FrameLayout, _call_conv: CallConv) -> Option<UnwindInfo> {
        let locals = frame.locals_size();
        let total = total_frame_size(frame);
        let mut codes = vec![
            UnwindCode::PushReg {
                offset_from_sp: locals,
                reg: regs::FP,
            },
            UnwindCode::PushReg {
                offset_from_sp: locals + 8,
                reg: regs::LR,
            },
            UnwindCode::StackAlloc { size: total },
            UnwindCode::SetFramePointer,
        ];
        for (i, &r) in frame.callee_saved.iter().enumerate() {
            codes.push(UnwindCode::SaveReg {
                offset_from_fp: 16 + 8 * i as i32,
                reg: r,
            });
        }
        Some(UnwindInfo::SystemV {
            codes,
            frame_size: total,
        })
    }

    fn reloc_kind_hint() -> RelocKind {
        RelocKind::Arm64Call
    }
}
