//! x86-64 lowering rules (spec.md §4.4).
//!
//! Priorities: fused comparison+branch/select beats a plain `icmp`/`select`
//! pair materializing a boolean register, which beats nothing (no rule
//! matches an opcode this backend doesn't implement at all).

use crate::ir::condcodes::IntCC;
use crate::ir::entities::{StackSlot, Value};
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::Type;
use crate::machinst::abi::{assign_arguments, ArgLoc};
use crate::machinst::lower::{LowerCtx, Rule, RuleTable, PRIO_FUSED, PRIO_GENERIC, PRIO_STRENGTH_REDUCED};
use crate::machinst::reg::RegRef;
use crate::machinst::vcode::{BranchTarget, ParallelMove};
use crate::result::CodegenResult;
use retarget_entity::EntityRef;

use super::abi::X64AbiSpec;
use super::inst::{AluOp, CC, Inst, MemArg, OperandSize, ShiftOp};

fn size_of(ty: Type) -> OperandSize {
    if ty.bits() > 32 {
        OperandSize::S64
    } else {
        OperandSize::S32
    }
}

fn reg(ctx: &mut LowerCtx<Inst>, v: Value) -> RegRef {
    RegRef::Virtual(ctx.value_reg(v))
}

fn alu_op_for(opcode: Opcode) -> Option<AluOp> {
    match opcode {
        Opcode::Iadd => Some(AluOp::Add),
        Opcode::Isub => Some(AluOp::Sub),
        Opcode::Band => Some(AluOp::And),
        Opcode::Bor => Some(AluOp::Or),
        Opcode::Bxor => Some(AluOp::Xor),
        _ => None,
    }
}

fn shift_op_for(opcode: Opcode) -> Option<ShiftOp> {
    match opcode {
        Opcode::Ishl => Some(ShiftOp::Shl),
        Opcode::Ushr => Some(ShiftOp::Shr),
        Opcode::Sshr => Some(ShiftOp::Sar),
        _ => None,
    }
}

/// If `v` is the result of an `iconst`, its immediate value.
fn const_operand(ctx: &LowerCtx<Inst>, v: Value) -> Option<i64> {
    let inst = ctx.func.dfg.value_def_inst(v)?;
    match ctx.func.dfg.inst_data(inst) {
        InstructionData::UnaryImm { opcode: Opcode::Iconst, imm } => Some(*imm),
        _ => None,
    }
}

/// `n` if `imm` is a power of two other than 1 (shifting by the trivial
/// `n == 0` case would just be a move, not worth a dedicated rule).
fn shift_amount_for_pow2(imm: i64) -> Option<u8> {
    if imm > 1 && (imm & (imm - 1)) == 0 {
        Some(imm.trailing_zeros() as u8)
    } else {
        None
    }
}

/// If `v` is the result of an `icmp`, its condition and operands.
fn icmp_operand(ctx: &LowerCtx<Inst>, v: Value) -> Option<(IntCC, Value, Value)> {
    let inst = ctx.func.dfg.value_def_inst(v)?;
    match ctx.func.dfg.inst_data(inst) {
        InstructionData::IntCompare { opcode: Opcode::Icmp, cond, args } => {
            Some((*cond, args[0], args[1]))
        }
        _ => None,
    }
}

fn emit_cmp(ctx: &mut LowerCtx<Inst>, ty: Type, a: Value, b: Value) {
    let (ra, rb) = (reg(ctx, a), reg(ctx, b));
    ctx.emit(Inst::AluRR { op: AluOp::Cmp, size: size_of(ty), dst: ra, src: rb });
}

fn rules() -> Vec<Rule<Inst>> {
    vec![
        Rule { name: "iconst", priority: PRIO_GENERIC, body: iconst },
        Rule { name: "alu_binop", priority: PRIO_GENERIC, body: alu_binop },
        Rule { name: "imul_pow2_shift", priority: PRIO_STRENGTH_REDUCED, body: imul_pow2_shift },
        Rule { name: "imul", priority: PRIO_GENERIC, body: imul },
        Rule { name: "shift", priority: PRIO_GENERIC, body: shift },
        Rule { name: "ineg", priority: PRIO_GENERIC, body: ineg },
        Rule { name: "bnot", priority: PRIO_GENERIC, body: bnot },
        Rule { name: "extend", priority: PRIO_GENERIC, body: extend },
        Rule { name: "load", priority: PRIO_GENERIC, body: load },
        Rule { name: "store", priority: PRIO_GENERIC, body: store },
        Rule { name: "stack_addr", priority: PRIO_GENERIC, body: stack_addr },
        Rule { name: "brif_fused_icmp", priority: PRIO_FUSED, body: brif_fused_icmp },
        Rule { name: "brif_plain", priority: PRIO_GENERIC, body: brif_plain },
        Rule { name: "jump", priority: PRIO_GENERIC, body: jump },
        Rule { name: "br_table", priority: PRIO_GENERIC, body: br_table },
        Rule { name: "select_fused_icmp", priority: PRIO_FUSED, body: select_fused_icmp },
        Rule { name: "select_plain", priority: PRIO_GENERIC, body: select_plain },
        Rule { name: "icmp_materialize", priority: PRIO_GENERIC, body: icmp_materialize },
        Rule { name: "return", priority: PRIO_GENERIC, body: return_ },
        Rule { name: "call", priority: PRIO_GENERIC, body: call },
        Rule { name: "try_call", priority: PRIO_GENERIC, body: try_call },
    ]
}

pub fn rule_table() -> RuleTable<Inst> {
    RuleTable::new(rules())
}

fn iconst(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (imm, ty) = match data {
        InstructionData::UnaryImm { opcode: Opcode::Iconst, imm } => (*imm, ctx.result_type(inst)),
        _ => return Ok(false),
    };
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    ctx.emit(Inst::MovImm { size: size_of(ty), dst, imm });
    Ok(true)
}

fn alu_binop(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (op, a, b, ty) = match data {
        InstructionData::Binary { opcode, args } if alu_op_for(*opcode).is_some() => {
            (alu_op_for(*opcode).unwrap(), args[0], args[1], ctx.result_type(inst))
        }
        _ => return Ok(false),
    };
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let (ra, rb) = (reg(ctx, a), reg(ctx, b));
    let size = size_of(ty);
    ctx.emit(Inst::MovRR { size, dst, src: ra });
    ctx.emit(Inst::AluRR { op, size, dst, src: rb });
    Ok(true)
}

/// `imul x, (iconst 2^n)` -> `shl x, n` (spec.md §4.4 "Strength reduction
/// and fusion"): one `ShiftImm` beats `MovRR` + `ImulRR`.
fn imul_pow2_shift(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (a, b, ty) = match data {
        InstructionData::Binary { opcode: Opcode::Imul, args } => (args[0], args[1], ctx.result_type(inst)),
        _ => return Ok(false),
    };
    let amount = match const_operand(ctx, b).and_then(shift_amount_for_pow2) {
        Some(n) => n,
        None => return Ok(false),
    };
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let ra = reg(ctx, a);
    let size = size_of(ty);
    ctx.emit(Inst::MovRR { size, dst, src: ra });
    ctx.emit(Inst::ShiftImm { op: ShiftOp::Shl, size, dst, amount });
    Ok(true)
}

fn imul(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (a, b, ty) = match data {
        InstructionData::Binary { opcode: Opcode::Imul, args } => (args[0], args[1], ctx.result_type(inst)),
        _ => return Ok(false),
    };
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let (ra, rb) = (reg(ctx, a), reg(ctx, b));
    let size = size_of(ty);
    ctx.emit(Inst::MovRR { size, dst, src: ra });
    ctx.emit(Inst::ImulRR { size, dst, src: rb });
    Ok(true)
}

/// Only the constant-shift-amount case is implemented; a variable shift
/// count would need the count pinned in `%cl`, which this backend's
/// fixed-preg machinery doesn't model yet.
fn shift(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (op, a, b, ty) = match data {
        InstructionData::Binary { opcode, args } if shift_op_for(*opcode).is_some() => {
            (shift_op_for(*opcode).unwrap(), args[0], args[1], ctx.result_type(inst))
        }
        _ => return Ok(false),
    };
    let amount = match const_operand(ctx, b) {
        Some(n) => n as u8,
        None => return Ok(false),
    };
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let ra = reg(ctx, a);
    let size = size_of(ty);
    ctx.emit(Inst::MovRR { size, dst, src: ra });
    ctx.emit(Inst::ShiftImm { op, size, dst, amount });
    Ok(true)
}

fn ineg(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let a = match data {
        InstructionData::Unary { opcode: Opcode::Ineg, arg } => *arg,
        _ => return Ok(false),
    };
    let ty = ctx.result_type(inst);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let ra = reg(ctx, a);
    ctx.emit(Inst::MovRR { size: size_of(ty), dst, src: ra });
    ctx.emit(Inst::Neg { size: size_of(ty), dst });
    Ok(true)
}

fn bnot(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let a = match data {
        InstructionData::Unary { opcode: Opcode::Bnot, arg } => *arg,
        _ => return Ok(false),
    };
    let ty = ctx.result_type(inst);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let ra = reg(ctx, a);
    ctx.emit(Inst::MovRR { size: size_of(ty), dst, src: ra });
    ctx.emit(Inst::Not { size: size_of(ty), dst });
    Ok(true)
}

fn extend(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (a, signed) = match data {
        InstructionData::Unary { opcode: Opcode::Sextend, arg } => (*arg, true),
        InstructionData::Unary { opcode: Opcode::Uextend, arg } => (*arg, false),
        _ => return Ok(false),
    };
    let src_ty = ctx.func.dfg.value_type(a);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let ra = reg(ctx, a);
    let bits = src_ty.bits() as u8;
    if signed {
        ctx.emit(Inst::MovsxRmR { src_bits: bits, dst, src: ra });
    } else {
        ctx.emit(Inst::MovzxRmR { src_bits: bits, dst, src: ra });
    }
    Ok(true)
}

fn load(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (addr, offset) = match data {
        InstructionData::Load { opcode: Opcode::Load, arg, offset, .. } => (*arg, *offset),
        _ => return Ok(false),
    };
    let ty = ctx.result_type(inst);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let base = reg(ctx, addr);
    ctx.emit(Inst::load(size_of(ty), dst, MemArg { base, offset }));
    Ok(true)
}

fn store(ctx: &mut LowerCtx<Inst>, _inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (val, addr, offset) = match data {
        InstructionData::Store { opcode: Opcode::Store, args, offset, .. } => (args[0], args[1], *offset),
        _ => return Ok(false),
    };
    let ty = ctx.func.dfg.value_type(val);
    let src = reg(ctx, val);
    let base = reg(ctx, addr);
    ctx.emit(Inst::store(size_of(ty), src, MemArg { base, offset }));
    Ok(true)
}

fn stack_addr(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    // The stack-slot index and byte offset are packed into `imm` by
    // `FunctionBuilder::stack_addr`; `ctx.stack_slot_offsets` (filled in by
    // the caller before lowering, since a slot's size is known from the IR
    // alone) gives the slot's base offset from the frame pointer.
    let (slot, byte_offset) = match data {
        InstructionData::UnaryImm { opcode: Opcode::StackAddr, imm } => {
            (StackSlot::new((*imm >> 32) as usize), (*imm & 0xffff_ffff) as i32)
        }
        _ => return Ok(false),
    };
    let base_offset = *ctx.stack_slot_offsets.get(&slot).unwrap_or(&0);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let base = RegRef::Physical(super::regs::RBP);
    ctx.emit(Inst::Lea { dst, mem: MemArg { base, offset: base_offset + byte_offset } });
    Ok(true)
}

fn branch_args_moves(ctx: &mut LowerCtx<Inst>, from: crate::ir::entities::Block, call: &crate::ir::entities::BlockCall) {
    let to = call.block;
    let mut moves = Vec::with_capacity(call.args.len());
    let params = ctx.func.dfg.block_params(to).to_vec();
    for (&param, &arg) in params.iter().zip(call.args.iter()) {
        let dst = ctx.value_reg(param);
        let src = ctx.value_reg(arg);
        moves.push(ParallelMove { dst: RegRef::Virtual(dst), src: RegRef::Virtual(src), class: dst.class() });
    }
    if !moves.is_empty() {
        ctx.vcode.edge_moves.insert((from, to), moves);
    }
}

fn brif_fused_icmp(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (cond_arg, then_dest, else_dest) = match data {
        InstructionData::BranchZ { opcode: Opcode::Brif, cond_arg, dest, else_dest } => {
            (*cond_arg, dest, else_dest)
        }
        _ => return Ok(false),
    };
    let (cc, a, b) = match icmp_operand(ctx, cond_arg) {
        Some(v) => v,
        None => return Ok(false),
    };
    let ty = ctx.func.dfg.value_type(a);
    emit_cmp(ctx, ty, a, b);
    let block = ctx.func.layout.inst_block(inst).expect("branch laid out");
    branch_args_moves(ctx, block, then_dest);
    branch_args_moves(ctx, block, else_dest);
    ctx.emit(Inst::JmpCond { cc: CC::from_int_cc(cc), target: BranchTarget::Label(then_dest.block) });
    ctx.emit(Inst::Jmp { target: BranchTarget::Label(else_dest.block) });
    Ok(true)
}

fn brif_plain(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (cond_arg, then_dest, else_dest) = match data {
        InstructionData::BranchZ { opcode: Opcode::Brif, cond_arg, dest, else_dest } => {
            (*cond_arg, dest, else_dest)
        }
        _ => return Ok(false),
    };
    let cr = reg(ctx, cond_arg);
    ctx.emit(Inst::TestRR { size: OperandSize::S32, a: cr, b: cr });
    let block = ctx.func.layout.inst_block(inst).expect("branch laid out");
    branch_args_moves(ctx, block, then_dest);
    branch_args_moves(ctx, block, else_dest);
    ctx.emit(Inst::JmpCond { cc: CC::Nz, target: BranchTarget::Label(then_dest.block) });
    ctx.emit(Inst::Jmp { target: BranchTarget::Label(else_dest.block) });
    Ok(true)
}

fn jump(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let dest = match data {
        InstructionData::Jump { opcode: Opcode::Jump, dest } => dest,
        _ => return Ok(false),
    };
    let block = ctx.func.layout.inst_block(inst).expect("jump laid out");
    branch_args_moves(ctx, block, dest);
    ctx.emit(Inst::Jmp { target: BranchTarget::Label(dest.block) });
    Ok(true)
}

/// `br_table idx, default, [t0, t1, ...]` (spec.md §4.4 "BrTable"): an
/// unsigned bounds check sends an out-of-range index to `default`, an
/// in-range one dispatches through `Inst::JTSequence`'s indirect jump.
fn br_table(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (arg, table) = match data {
        InstructionData::BranchTable { opcode: Opcode::BrTable, arg, table } => (*arg, *table),
        _ => return Ok(false),
    };
    let jt = ctx.func.dfg.jump_table(table).clone();
    let block = ctx.func.layout.inst_block(inst).expect("br_table laid out");

    // `BranchTable`'s `arguments()` only reports the index itself (see
    // `ir::instructions::InstructionData::arguments`), not the block-call
    // arguments nested in the table, so a value used only as one of those
    // needs marking live here or its producer would look dead to the
    // reverse walk.
    for call in jt.all_branches() {
        for &a in &call.args {
            ctx.mark_live(a);
        }
        branch_args_moves(ctx, block, call);
    }

    let idx = reg(ctx, arg);
    let len = jt.as_slice().len() as i32;
    ctx.emit(Inst::AluImm { op: AluOp::Cmp, size: OperandSize::S32, dst: idx, imm: len });
    ctx.emit(Inst::JmpCond { cc: CC::Ae, target: BranchTarget::Label(jt.default_block().block) });

    let targets: Vec<BranchTarget> = jt.as_slice().iter().map(|c| BranchTarget::Label(c.block)).collect();
    let tmp1 = RegRef::Virtual(ctx.vreg_alloc.alloc(crate::machinst::reg::RegClass::Int));
    let tmp2 = RegRef::Virtual(ctx.vreg_alloc.alloc(crate::machinst::reg::RegClass::Int));
    ctx.emit(Inst::JTSequence { idx, tmp1, tmp2, targets });
    Ok(true)
}

fn select_fused_icmp(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (cond, t, f) = match data {
        InstructionData::Ternary { opcode: Opcode::Select, args } => (args[0], args[1], args[2]),
        _ => return Ok(false),
    };
    let (cc, a, b) = match icmp_operand(ctx, cond) {
        Some(v) => v,
        None => return Ok(false),
    };
    let cmp_ty = ctx.func.dfg.value_type(a);
    let ty = ctx.result_type(inst);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let (rt, rf) = (reg(ctx, t), reg(ctx, f));
    emit_cmp(ctx, cmp_ty, a, b);
    ctx.emit(Inst::MovRR { size: size_of(ty), dst, src: rf });
    ctx.emit(Inst::CMovCC { cc: CC::from_int_cc(cc), size: size_of(ty), dst, src: rt });
    Ok(true)
}

fn select_plain(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (cond, t, f) = match data {
        InstructionData::Ternary { opcode: Opcode::Select, args } => (args[0], args[1], args[2]),
        _ => return Ok(false),
    };
    let ty = ctx.result_type(inst);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    let cr = reg(ctx, cond);
    let (rt, rf) = (reg(ctx, t), reg(ctx, f));
    ctx.emit(Inst::TestRR { size: OperandSize::S32, a: cr, b: cr });
    ctx.emit(Inst::MovRR { size: size_of(ty), dst, src: rf });
    ctx.emit(Inst::CMovCC { cc: CC::Nz, size: size_of(ty), dst, src: rt });
    Ok(true)
}

fn icmp_materialize(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (cc, a, b) = match data {
        InstructionData::IntCompare { opcode: Opcode::Icmp, cond, args } => (*cond, args[0], args[1]),
        _ => return Ok(false),
    };
    let ty = ctx.func.dfg.value_type(a);
    let dst = reg(ctx, ctx.func.dfg.first_result(inst));
    emit_cmp(ctx, ty, a, b);
    ctx.emit(Inst::MovImm { size: OperandSize::S32, dst, imm: 0 });
    ctx.emit(Inst::SetCC { cc: CC::from_int_cc(cc), dst });
    Ok(true)
}

fn return_(ctx: &mut LowerCtx<Inst>, _inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let args = match data {
        InstructionData::MultiAry { opcode: Opcode::Return, args } => args.clone(),
        _ => return Ok(false),
    };
    let sig = ctx.func.signature.clone();
    let assigns = assign_arguments::<X64AbiSpec>(&sig.returns, sig.call_conv, None);
    for (assign, &val) in assigns.iter().zip(args.iter()) {
        let src = reg(ctx, val);
        let ty = ctx.func.dfg.value_type(val);
        match assign.locs.as_slice() {
            [ArgLoc::Reg(preg)] => {
                ctx.emit(Inst::MovRR { size: size_of(ty), dst: RegRef::Physical(*preg), src });
            }
            _ => {
                // Multi-register/struct/stack returns aren't implemented
                // by this backend; every scenario this crate targets
                // returns a single scalar.
                return Ok(false);
            }
        }
    }
    ctx.emit(Inst::Ret);
    Ok(true)
}

fn call(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (func_ref, args) = match data {
        InstructionData::Call { opcode: Opcode::Call, func_ref, args } => (*func_ref, args.clone()),
        _ => return Ok(false),
    };
    let sig = ctx.func.dfg.func_signature(func_ref).clone();
    let name = ctx.func.dfg.ext_func(func_ref).name.clone();
    let assigns = assign_arguments::<X64AbiSpec>(&sig.params, sig.call_conv, None);

    let mut uses = smallvec::SmallVec::new();
    for (assign, &val) in assigns.iter().zip(args.iter()) {
        let ty = ctx.func.dfg.value_type(val);
        let src = reg(ctx, val);
        match assign.locs.as_slice() {
            [ArgLoc::Reg(preg)] => {
                let pr = RegRef::Physical(*preg);
                ctx.emit(Inst::MovRR { size: size_of(ty), dst: pr, src });
                uses.push(pr);
            }
            _ => return Ok(false), // stack-passed call arguments: not yet supported.
        }
    }

    let ret_assigns = assign_arguments::<X64AbiSpec>(&sig.returns, sig.call_conv, None);
    let mut defs = smallvec::SmallVec::new();
    for assign in &ret_assigns {
        match assign.locs.as_slice() {
            [ArgLoc::Reg(preg)] => defs.push(RegRef::Physical(*preg)),
            _ => return Ok(false),
        }
    }

    ctx.emit(Inst::CallKnown { name, uses, defs: defs.clone() });

    let results = ctx.func.dfg.inst_results(inst).to_vec();
    for (&result, &preg_ref) in results.iter().zip(defs.iter()) {
        let ty = ctx.func.dfg.value_type(result);
        let dst = reg(ctx, result);
        ctx.emit(Inst::MovRR { size: size_of(ty), dst, src: preg_ref });
    }
    Ok(true)
}

/// `try_call` (spec.md §4.5 "Try-call"): same argument marshaling and
/// `CallKnown` as a plain `call`, then an unconditional jump to the
/// normal successor — the fallthrough path this backend actually
/// generates code for. The exception successor is real in the CFG (the
/// verifier and liveness both see it) but is only reachable here via an
/// external unwinder consulting this function's unwind info, which this
/// crate doesn't emit a landing-pad dispatch table for (see `DESIGN.md`);
/// no instruction in this function ever branches there, so there's
/// nothing for `branch_args_moves` to wire up on that edge.
fn try_call(ctx: &mut LowerCtx<Inst>, inst: crate::ir::entities::Inst, data: &InstructionData) -> CodegenResult<bool> {
    let (func_ref, args, normal_dest) = match data {
        InstructionData::TryCall {
            opcode: Opcode::TryCall,
            func_ref,
            args,
            normal_dest,
            ..
        } => (*func_ref, args.clone(), normal_dest.clone()),
        _ => return Ok(false),
    };
    let sig = ctx.func.dfg.func_signature(func_ref).clone();
    let name = ctx.func.dfg.ext_func(func_ref).name.clone();
    let assigns = assign_arguments::<X64AbiSpec>(&sig.params, sig.call_conv, None);

    let mut uses = smallvec::SmallVec::new();
    for (assign, &val) in assigns.iter().zip(args.iter()) {
        let ty = ctx.func.dfg.value_type(val);
        let src = reg(ctx, val);
        match assign.locs.as_slice() {
            [ArgLoc::Reg(preg)] => {
                let pr = RegRef::Physical(*preg);
                ctx.emit(Inst::MovRR { size: size_of(ty), dst: pr, src });
                uses.push(pr);
            }
            _ => return Ok(false), // stack-passed call arguments: not yet supported.
        }
    }

    let ret_assigns = assign_arguments::<X64AbiSpec>(&sig.returns, sig.call_conv, None);
    let mut defs = smallvec::SmallVec::new();
    for assign in &ret_assigns {
        match assign.locs.as_slice() {
            [ArgLoc::Reg(preg)] => defs.push(RegRef::Physical(*preg)),
            _ => return Ok(false),
        }
    }

    ctx.emit(Inst::CallKnown { name, uses, defs: defs.clone() });

    let results = ctx.func.dfg.inst_results(inst).to_vec();
    for (&result, &preg_ref) in results.iter().zip(defs.iter()) {
        let ty = ctx.func.dfg.value_type(result);
        let dst = reg(ctx, result);
        ctx.emit(Inst::MovRR { size: size_of(ty), dst, src: preg_ref });
    }

    let block = ctx.func.layout.inst_block(inst).expect("try_call laid out");
    branch_args_moves(ctx, block, &normal_dest);
    ctx.emit(Inst::Jmp { target: BranchTarget::Label(normal_dest.block) });
    Ok(true)
}
