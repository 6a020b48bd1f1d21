//! The x86-64 backend: SysV/Windows-fastcall ABI, Intel-SDM-exact
//! instruction encodings, and the lowering rules from `ir::Opcode` to them.

pub mod abi;
pub mod inst;
pub mod lower;
pub mod regs;

pub use abi::X64AbiSpec;
pub use inst::Inst;

use crate::binemit::reloc::RelocKind;
use crate::binemit::unwind::{UnwindCode, UnwindInfo};
use crate::ir::CallConv;
use crate::machinst::abi::FrameLayout;
use crate::machinst::reg::{PReg, RegRef};
use crate::machinst::vcode::BranchTarget;
use inst::{AluOp, MemArg, OperandSize};

/// Callee-saved registers beyond RBP, which the prologue/epilogue always
/// push/pop regardless of whether the function happens to clobber it.
const CALLEE_SAVED_CANDIDATES: &[PReg] = &[regs::RBX, regs::R12, regs::R13, regs::R14, regs::R15];

pub struct X64Backend;

impl crate::context::Backend for X64Backend {
    type Inst = Inst;
    type Abi = X64AbiSpec;

    fn rule_table() -> crate::machinst::lower::RuleTable<Inst> {
        lower::rule_table()
    }

    fn allocatable_int() -> &'static [PReg] {
        regs::ALLOCATABLE_INT
    }

    fn allocatable_float() -> &'static [PReg] {
        regs::ALLOCATABLE_FLOAT
    }

    fn scratch_int() -> PReg {
        regs::SCRATCH_INT
    }

    fn exception_value_reg() -> PReg {
        regs::RAX
    }

    fn callee_saved_candidates() -> &'static [PReg] {
        CALLEE_SAVED_CANDIDATES
    }

    fn is_return(inst: &Inst) -> bool {
        matches!(inst, Inst::Ret)
    }

    fn gen_jump(target: BranchTarget) -> Inst {
        Inst::Jmp { target }
    }

    /// `push rbp; sub rsp, locals; mov rbp, rsp; push` each used
    /// callee-saved register. RBP ends up pointing at the *bottom* of the
    /// locals/spill region, not the classic top-of-frame convention,
    /// because `spill_load`/`spill_store`/`stack_addr` all address their
    /// slots as positive RBP-relative offsets (see `inst.rs`).
    fn gen_prologue(frame: &FrameLayout) -> Vec<Inst> {
        let mut insts = vec![Inst::PushR {
            src: RegRef::Physical(regs::RBP),
        }];
        let locals = frame.locals_size();
        if locals > 0 {
            insts.push(Inst::AluImm {
                op: AluOp::Sub,
                size: OperandSize::S64,
                dst: RegRef::Physical(regs::RSP),
                imm: locals as i32,
            });
        }
        insts.push(Inst::MovRR {
            size: OperandSize::S64,
            dst: RegRef::Physical(regs::RBP),
            src: RegRef::Physical(regs::RSP),
        });
        for &r in &frame.callee_saved {
            insts.push(Inst::PushR {
                src: RegRef::Physical(r),
            });
        }
        insts
    }

    /// `push rbp; sub rsp, locals; mov rbp, rsp` (see `gen_prologue`) puts
    /// `rbp` exactly `locals` bytes below the incoming `rsp`, which in turn
    /// sat one word above the return address `call` pushed; the first
    /// stack-passed argument (`off == 0`) is the next word up from there.
    fn finalize_incoming_stack_args(vcode: &mut crate::machinst::vcode::VCode<Inst>, frame: &FrameLayout) {
        let base = frame.locals_size() as i32 + 16;
        for inst in vcode.insts.iter_mut() {
            if let Inst::IncomingStackArg { dst, off, size } = *inst {
                *inst = Inst::Load {
                    size,
                    dst,
                    mem: MemArg { base: RegRef::Physical(regs::RBP), offset: base + off },
                };
            }
        }
    }

    fn gen_epilogue(frame: &FrameLayout) -> Vec<Inst> {
        let mut insts = Vec::new();
        for &r in frame.callee_saved.iter().rev() {
            insts.push(Inst::PopR {
                dst: RegRef::Physical(r),
            });
        }
        insts.push(Inst::Lea {
            dst: RegRef::Physical(regs::RSP),
            mem: MemArg {
                base: RegRef::Physical(regs::RBP),
                offset: frame.locals_size() as i32,
            },
        });
        insts.push(Inst::PopR {
            dst: RegRef::Physical(regs::RBP),
        });
        insts
    }

    fn unwind_info(frame: &FrameLayout, call_conv: CallConv) -> Option<UnwindInfo> {
        let mut codes = vec![UnwindCode::PushReg {
            offset_from_sp: 0,
            reg: regs::RBP,
        }];
        let locals = frame.locals_size();
        if locals > 0 {
            codes.push(UnwindCode::StackAlloc { size: locals });
        }
        codes.push(UnwindCode::SetFramePointer);
        for (i, &r) in frame.callee_saved.iter().enumerate() {
            codes.push(UnwindCode::SaveReg {
                offset_from_fp: -8 * (i as i32 + 1),
                reg: r,
            });
        }
        let frame_size = locals + 8 + 8 * frame.callee_saved.len() as u32;
        match call_conv {
            CallConv::WindowsFastcall => Some(UnwindInfo::WindowsX64 { codes, frame_size }),
            _ => Some(UnwindInfo::SystemV { codes, frame_size }),
        }
    }

    fn reloc_kind_hint() -> RelocKind {
        RelocKind::X86CallPCRel4
    }
}
