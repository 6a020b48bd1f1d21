//! Function construction primitives (spec.md §4.1).
//!
//! `FunctionBuilder` wraps a `&mut Function` with an "active block" cursor
//! and opcode-shorthand helpers (`iconst`, `iadd`, `return_`, ...). Result
//! arity is fixed by the opcode (`opcode_result_arity`); appending more or
//! fewer results than that is a `ConstructionError`, not a silent
//! truncation. Instructions are **not** auto-removed when their results
//! become dead — that's the lowering engine's reverse-walk DCE, or a
//! client-side pass; the builder never deletes what you told it to build.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{Block, BlockCall, ExternalName, FuncRef, Inst, JumpTable, Linkage, SigRef, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, MemFlags, Opcode};
use crate::ir::signature::Signature;
use crate::ir::types::Type;

/// Construction-time API misuse: wrong instruction shape, excess results,
/// a dangling/unsealed block reference. Fatal at the offending call.
#[derive(Debug, Clone, failure_derive::Fail)]
pub enum ConstructionError {
    #[fail(display = "opcode {:?} produces {} result(s), tried to append {}", opcode, arity, attempted)]
    ResultArityMismatch {
        opcode: Opcode,
        arity: usize,
        attempted: usize,
    },
    #[fail(display = "no active block: call switch_to_block first")]
    NoActiveBlock,
}

fn opcode_result_arity(opcode: Opcode) -> usize {
    use Opcode::*;
    match opcode {
        Store | Jump | Brz | Brnz | Brif | BrTable | Return | LandingPad => 0,
        Call | CallIndirect | TryCall => usize::MAX, // arity == signature returns; checked separately
        _ => 1,
    }
}

pub struct FunctionBuilder<'f> {
    pub func: &'f mut Function,
    current: Option<Block>,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            func,
            current: None,
        }
    }

    // ---- blocks ----

    pub fn create_block(&mut self) -> Block {
        let block = self.func.dfg.make_block();
        self.func.layout.append_block(block);
        block
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        self.func.dfg.append_block_param(block, ty)
    }

    pub fn set_block_params(&mut self, block: Block, types: &[Type]) {
        self.func.dfg.set_block_params(block, types)
    }

    /// Mark `block` as a landing pad: it receives the exception value as
    /// an implicit first parameter (spec.md §3, Block). Call before
    /// appending any further explicit parameters.
    pub fn make_landing_pad(&mut self, block: Block, exception_type: Type) -> Value {
        self.func.dfg.set_landing_pad(block, true);
        self.func.dfg.append_block_param(block, exception_type)
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    fn active_block(&self) -> Block {
        self.current
            .unwrap_or_else(|| panic!("{}", ConstructionError::NoActiveBlock))
    }

    // ---- raw instruction construction ----

    /// Create an instruction, append it to the active block, and append
    /// `result_types.len()` results to it. Panics (a `ConstructionError`
    /// upstream should have prevented this) if the opcode's fixed arity
    /// disagrees with `result_types.len()`.
    fn emit(&mut self, data: InstructionData, result_types: &[Type]) -> Inst {
        let opcode = data.opcode();
        let arity = opcode_result_arity(opcode);
        if arity != usize::MAX && arity != result_types.len() {
            panic!(
                "{}",
                ConstructionError::ResultArityMismatch {
                    opcode,
                    arity,
                    attempted: result_types.len(),
                }
            );
        }
        let block = self.active_block();
        let inst = self.func.dfg.make_inst(data);
        self.func.layout.append_inst(inst, block);
        for &ty in result_types {
            self.func.dfg.append_result(inst, ty);
        }
        inst
    }

    fn emit1(&mut self, data: InstructionData, ty: Type) -> Value {
        let inst = self.emit(data, &[ty]);
        self.func.dfg.first_result(inst)
    }

    // ---- constants ----

    pub fn iconst(&mut self, ty: Type, imm: i64) -> Value {
        self.emit1(
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm,
            },
            ty,
        )
    }

    pub fn fconst(&mut self, ty: Type, bits: i64) -> Value {
        self.emit1(
            InstructionData::UnaryImm {
                opcode: Opcode::Fconst,
                imm: bits,
            },
            ty,
        )
    }

    pub fn bconst(&mut self, imm: bool) -> Value {
        self.emit1(
            InstructionData::UnaryBool {
                opcode: Opcode::Bconst,
                imm,
            },
            crate::ir::types::B1,
        )
    }

    // ---- integer arithmetic ----

    fn binary(&mut self, opcode: Opcode, a: Value, b: Value, ty: Type) -> Value {
        self.emit1(
            InstructionData::Binary {
                opcode,
                args: [a, b],
            },
            ty,
        )
    }

    pub fn iadd(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Iadd, a, b, ty)
    }
    pub fn isub(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Isub, a, b, ty)
    }
    pub fn imul(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Imul, a, b, ty)
    }
    pub fn udiv(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Udiv, a, b, ty)
    }
    pub fn sdiv(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Sdiv, a, b, ty)
    }
    pub fn urem(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Urem, a, b, ty)
    }
    pub fn srem(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Srem, a, b, ty)
    }
    pub fn band(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Band, a, b, ty)
    }
    pub fn bor(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Bor, a, b, ty)
    }
    pub fn bxor(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Bxor, a, b, ty)
    }
    pub fn ishl(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Ishl, a, b, ty)
    }
    pub fn ushr(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Ushr, a, b, ty)
    }
    pub fn sshr(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Sshr, a, b, ty)
    }

    pub fn ineg(&mut self, a: Value, ty: Type) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Ineg,
                arg: a,
            },
            ty,
        )
    }
    pub fn bnot(&mut self, a: Value, ty: Type) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Bnot,
                arg: a,
            },
            ty,
        )
    }

    // ---- float arithmetic ----

    pub fn fadd(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Fadd, a, b, ty)
    }
    pub fn fsub(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Fsub, a, b, ty)
    }
    pub fn fmul(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Fmul, a, b, ty)
    }
    pub fn fdiv(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::Fdiv, a, b, ty)
    }
    pub fn fneg(&mut self, a: Value, ty: Type) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Fneg,
                arg: a,
            },
            ty,
        )
    }

    // ---- conversions ----

    pub fn sextend(&mut self, ty: Type, a: Value) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Sextend,
                arg: a,
            },
            ty,
        )
    }
    pub fn uextend(&mut self, ty: Type, a: Value) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Uextend,
                arg: a,
            },
            ty,
        )
    }
    pub fn ireduce(&mut self, ty: Type, a: Value) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Ireduce,
                arg: a,
            },
            ty,
        )
    }
    pub fn bitcast(&mut self, ty: Type, a: Value) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Bitcast,
                arg: a,
            },
            ty,
        )
    }

    // ---- comparisons ----

    pub fn icmp(&mut self, cond: IntCC, a: Value, b: Value) -> Value {
        self.emit1(
            InstructionData::IntCompare {
                opcode: Opcode::Icmp,
                cond,
                args: [a, b],
            },
            crate::ir::types::B1,
        )
    }

    pub fn fcmp(&mut self, cond: FloatCC, a: Value, b: Value) -> Value {
        self.emit1(
            InstructionData::FloatCompare {
                opcode: Opcode::Fcmp,
                cond,
                args: [a, b],
            },
            crate::ir::types::B1,
        )
    }

    pub fn select(&mut self, cond: Value, a: Value, b: Value, ty: Type) -> Value {
        self.emit1(
            InstructionData::Ternary {
                opcode: Opcode::Select,
                args: [cond, a, b],
            },
            ty,
        )
    }

    // ---- memory ----

    pub fn load(&mut self, ty: Type, flags: MemFlags, addr: Value, offset: i32) -> Value {
        self.emit1(
            InstructionData::Load {
                opcode: Opcode::Load,
                flags,
                arg: addr,
                offset,
            },
            ty,
        )
    }

    pub fn store(&mut self, flags: MemFlags, val: Value, addr: Value, offset: i32) -> Inst {
        self.emit(
            InstructionData::Store {
                opcode: Opcode::Store,
                flags,
                args: [val, addr],
                offset,
            },
            &[],
        )
    }

    pub fn stack_addr(&mut self, ptr_ty: Type, ss: crate::ir::entities::StackSlot, offset: i32) -> Value {
        // Reuses `UnaryImm` to carry the stack-slot index packed in `imm`;
        // the lowering engine's extractor recovers it with `StackSlot::new`.
        self.emit1(
            InstructionData::UnaryImm {
                opcode: Opcode::StackAddr,
                imm: (retarget_entity::EntityRef::index(ss) as i64) << 32 | offset as i64 & 0xffff_ffff,
            },
            ptr_ty,
        )
    }

    // ---- control flow ----

    pub fn jump(&mut self, dest: Block, args: Vec<Value>) -> Inst {
        self.emit(
            InstructionData::Jump {
                opcode: Opcode::Jump,
                dest: BlockCall::new(dest, args),
            },
            &[],
        )
    }

    /// `if cond != 0 { goto then } else { goto else_ }`.
    pub fn brif(
        &mut self,
        cond: Value,
        then_block: Block,
        then_args: Vec<Value>,
        else_block: Block,
        else_args: Vec<Value>,
    ) -> Inst {
        self.emit(
            InstructionData::BranchZ {
                opcode: Opcode::Brif,
                cond_arg: cond,
                dest: BlockCall::new(then_block, then_args),
                else_dest: BlockCall::new(else_block, else_args),
            },
            &[],
        )
    }

    pub fn br_table(&mut self, arg: Value, table: JumpTable) -> Inst {
        self.emit(
            InstructionData::BranchTable {
                opcode: Opcode::BrTable,
                arg,
                table,
            },
            &[],
        )
    }

    pub fn return_(&mut self, args: Vec<Value>) -> Inst {
        self.emit(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args,
            },
            &[],
        )
    }

    // ---- calls ----

    pub fn import_signature(&mut self, sig: Signature) -> SigRef {
        self.func.dfg.import_signature(sig)
    }

    pub fn import_function(&mut self, name: ExternalName, sig_ref: SigRef, linkage: Linkage) -> FuncRef {
        self.func.dfg.import_function(crate::ir::dfg::ExtFuncData {
            name,
            signature: sig_ref,
            linkage,
        })
    }

    pub fn call(&mut self, func_ref: FuncRef, args: Vec<Value>) -> Inst {
        self.emit_call(InstructionData::Call {
            opcode: Opcode::Call,
            func_ref,
            args,
        })
    }

    pub fn call_indirect(&mut self, sig_ref: SigRef, callee: Value, args: Vec<Value>) -> Inst {
        self.emit_call(InstructionData::CallIndirect {
            opcode: Opcode::CallIndirect,
            sig_ref,
            callee,
            args,
        })
    }

    pub fn try_call(
        &mut self,
        func_ref: FuncRef,
        args: Vec<Value>,
        normal_dest: Block,
        normal_args: Vec<Value>,
        exception_dest: Block,
        exception_args: Vec<Value>,
    ) -> Inst {
        let sig = self.func.dfg.func_signature(func_ref).clone();
        let inst = self.func.dfg.make_inst(InstructionData::TryCall {
            opcode: Opcode::TryCall,
            func_ref,
            args,
            normal_dest: BlockCall::new(normal_dest, normal_args),
            exception_dest: BlockCall::new(exception_dest, exception_args),
        });
        let block = self.active_block();
        self.func.layout.append_inst(inst, block);
        for ret in &sig.returns {
            self.func.dfg.append_result(inst, ret.value_type);
        }
        inst
    }

    fn emit_call(&mut self, data: InstructionData) -> Inst {
        let sig = match &data {
            InstructionData::Call { func_ref, .. } => self.func.dfg.func_signature(*func_ref).clone(),
            InstructionData::CallIndirect { sig_ref, .. } => self.func.dfg.signature(*sig_ref).clone(),
            _ => unreachable!(),
        };
        let block = self.active_block();
        let inst = self.func.dfg.make_inst(data);
        self.func.layout.append_inst(inst, block);
        for ret in &sig.returns {
            self.func.dfg.append_result(inst, ret.value_type);
        }
        inst
    }

    pub fn call_results(&self, inst: Inst) -> &[Value] {
        self.func.dfg.inst_results(inst)
    }

    // ---- vectors ----

    pub fn splat(&mut self, ty: Type, a: Value) -> Value {
        self.emit1(
            InstructionData::Unary {
                opcode: Opcode::Splat,
                arg: a,
            },
            ty,
        )
    }

    pub fn vector_add(&mut self, a: Value, b: Value, ty: Type) -> Value {
        self.binary(Opcode::VectorAdd, a, b, ty)
    }
}
