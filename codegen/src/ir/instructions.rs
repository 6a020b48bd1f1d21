//! Instruction opcodes and their payloads.
//!
//! `InstructionData` is a tagged union with one variant per *shape*, not
//! one per opcode — `iadd`/`isub`/`imul` are all `Binary`. The verifier
//! checks that a given opcode only ever shows up wrapped in the shape it's
//! allowed to have.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{FuncRef, JumpTable, SigRef, Value};
use crate::ir::types::Type;
use core::fmt;

/// The closed set of operations this crate knows how to lower. Adding an
/// opcode means adding lowering rules for it on every supported target;
/// there is no generic/interpreted fallback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Constants.
    Iconst,
    Fconst,
    Bconst,
    // Integer arithmetic.
    Iadd,
    Isub,
    Imul,
    Udiv,
    Sdiv,
    Urem,
    Srem,
    Ineg,
    Band,
    Bor,
    Bxor,
    Bnot,
    Ishl,
    Ushr,
    Sshr,
    // Float arithmetic.
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fneg,
    // Conversions.
    Sextend,
    Uextend,
    Ireduce,
    Fpromote,
    Fdemote,
    Bitcast,
    // Comparisons.
    Icmp,
    Fcmp,
    // Memory.
    Load,
    Store,
    StackAddr,
    // Control flow.
    Jump,
    Brz,
    Brnz,
    Brif,
    BrTable,
    Return,
    Select,
    // Calls.
    Call,
    CallIndirect,
    TryCall,
    FuncAddr,
    // Exception handling.
    LandingPad,
    // Vector.
    Splat,
    VectorAdd,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Flags attached to a `load`/`store`: alignment/trapping assumptions the
/// lowering engine may use to pick a cheaper addressing mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemFlags {
    pub aligned: bool,
    pub notrap: bool,
}

/// One IR instruction's operand/immediate payload. The shape determines
/// which fields exist; `Opcode` determines which shapes are legal (the
/// verifier enforces the pairing, see `verifier::verify_inst_shape`).
#[derive(Clone, Debug, PartialEq)]
pub enum InstructionData {
    Nullary {
        opcode: Opcode,
    },
    UnaryImm {
        opcode: Opcode,
        imm: i64,
    },
    UnaryBool {
        opcode: Opcode,
        imm: bool,
    },
    Unary {
        opcode: Opcode,
        arg: Value,
    },
    Binary {
        opcode: Opcode,
        args: [Value; 2],
    },
    BinaryImm64 {
        opcode: Opcode,
        arg: Value,
        imm: i64,
    },
    Ternary {
        opcode: Opcode,
        args: [Value; 3],
    },
    IntCompare {
        opcode: Opcode,
        cond: IntCC,
        args: [Value; 2],
    },
    FloatCompare {
        opcode: Opcode,
        cond: FloatCC,
        args: [Value; 2],
    },
    Load {
        opcode: Opcode,
        flags: MemFlags,
        arg: Value,
        offset: i32,
    },
    Store {
        opcode: Opcode,
        flags: MemFlags,
        args: [Value; 2],
        offset: i32,
    },
    Jump {
        opcode: Opcode,
        dest: crate::ir::entities::BlockCall,
    },
    BranchZ {
        opcode: Opcode,
        cond_arg: Value,
        dest: crate::ir::entities::BlockCall,
        else_dest: crate::ir::entities::BlockCall,
    },
    BranchTable {
        opcode: Opcode,
        arg: Value,
        table: JumpTable,
    },
    Call {
        opcode: Opcode,
        func_ref: FuncRef,
        args: Vec<Value>,
    },
    CallIndirect {
        opcode: Opcode,
        sig_ref: SigRef,
        callee: Value,
        args: Vec<Value>,
    },
    TryCall {
        opcode: Opcode,
        func_ref: FuncRef,
        args: Vec<Value>,
        normal_dest: crate::ir::entities::BlockCall,
        exception_dest: crate::ir::entities::BlockCall,
    },
    LandingPad {
        opcode: Opcode,
    },
    MultiAry {
        opcode: Opcode,
        args: Vec<Value>,
    },
}

impl InstructionData {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstructionData::Nullary { opcode }
            | InstructionData::UnaryImm { opcode, .. }
            | InstructionData::UnaryBool { opcode, .. }
            | InstructionData::Unary { opcode, .. }
            | InstructionData::Binary { opcode, .. }
            | InstructionData::BinaryImm64 { opcode, .. }
            | InstructionData::Ternary { opcode, .. }
            | InstructionData::IntCompare { opcode, .. }
            | InstructionData::FloatCompare { opcode, .. }
            | InstructionData::Load { opcode, .. }
            | InstructionData::Store { opcode, .. }
            | InstructionData::Jump { opcode, .. }
            | InstructionData::BranchZ { opcode, .. }
            | InstructionData::BranchTable { opcode, .. }
            | InstructionData::Call { opcode, .. }
            | InstructionData::CallIndirect { opcode, .. }
            | InstructionData::TryCall { opcode, .. }
            | InstructionData::LandingPad { opcode }
            | InstructionData::MultiAry { opcode, .. } => *opcode,
        }
    }

    /// All `Value` operands this instruction reads, in argument order,
    /// *not* counting block-call arguments carried by terminators (those
    /// are reached through `branch_destinations`).
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            InstructionData::Nullary { .. }
            | InstructionData::UnaryImm { .. }
            | InstructionData::UnaryBool { .. }
            | InstructionData::LandingPad { .. } => vec![],
            InstructionData::Unary { arg, .. } => vec![*arg],
            InstructionData::Binary { args, .. } => args.to_vec(),
            InstructionData::BinaryImm64 { arg, .. } => vec![*arg],
            InstructionData::Ternary { args, .. } => args.to_vec(),
            InstructionData::IntCompare { args, .. } => args.to_vec(),
            InstructionData::FloatCompare { args, .. } => args.to_vec(),
            InstructionData::Load { arg, .. } => vec![*arg],
            InstructionData::Store { args, .. } => args.to_vec(),
            InstructionData::Jump { dest, .. } => dest.args.clone(),
            InstructionData::BranchZ {
                cond_arg,
                dest,
                else_dest,
                ..
            } => {
                let mut v = vec![*cond_arg];
                v.extend(dest.args.iter().copied());
                v.extend(else_dest.args.iter().copied());
                v
            }
            InstructionData::BranchTable { arg, .. } => vec![*arg],
            InstructionData::Call { args, .. } => args.clone(),
            InstructionData::CallIndirect { callee, args, .. } => {
                let mut v = vec![*callee];
                v.extend(args.iter().copied());
                v
            }
            InstructionData::TryCall {
                args,
                normal_dest,
                exception_dest,
                ..
            } => {
                let mut v = args.clone();
                v.extend(normal_dest.args.iter().copied());
                v.extend(exception_dest.args.iter().copied());
                v
            }
            InstructionData::MultiAry { args, .. } => args.clone(),
        }
    }

    /// The block-call edges this (necessarily terminator) instruction
    /// carries, in the order a `BrTable`/`Jump`/`Brif`/`TryCall` would list
    /// them.
    pub fn branch_destinations(&self) -> Vec<&crate::ir::entities::BlockCall> {
        match self {
            InstructionData::Jump { dest, .. } => vec![dest],
            InstructionData::BranchZ {
                dest, else_dest, ..
            } => vec![dest, else_dest],
            InstructionData::TryCall {
                normal_dest,
                exception_dest,
                ..
            } => vec![normal_dest, exception_dest],
            _ => vec![],
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.opcode(),
            Opcode::Jump
                | Opcode::Brz
                | Opcode::Brnz
                | Opcode::Brif
                | Opcode::BrTable
                | Opcode::Return
                | Opcode::TryCall
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self.opcode(),
            Opcode::Call | Opcode::CallIndirect | Opcode::TryCall
        )
    }
}

/// Type constraints an opcode places on its arguments/results, used by the
/// verifier. Not exhaustive of every opcode — opcodes absent here are
/// assumed polymorphic/unconstrained beyond the shape check.
pub fn expected_result_type(opcode: Opcode, arg_types: &[Type]) -> Option<Type> {
    use Opcode::*;
    match opcode {
        Icmp | Fcmp => Some(crate::ir::types::B1),
        Iadd | Isub | Imul | Udiv | Sdiv | Urem | Srem | Band | Bor | Bxor | Ishl | Ushr
        | Sshr | Ineg | Bnot => arg_types.first().copied(),
        Fadd | Fsub | Fmul | Fdiv | Fneg => arg_types.first().copied(),
        _ => None,
    }
}
