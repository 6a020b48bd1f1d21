//! The intermediate representation: SSA values, basic blocks, typed
//! instructions, and the tables that own them (spec.md §3).

pub mod builder;
pub mod condcodes;
pub mod dfg;
pub mod entities;
pub mod function;
pub mod instructions;
pub mod layout;
pub mod signature;
pub mod types;
pub mod write;

pub use builder::FunctionBuilder;
pub use condcodes::{FloatCC, IntCC};
pub use dfg::DataFlowGraph;
pub use entities::{
    AnyEntity, Block, BlockCall, ExternalName, FuncRef, Inst, JumpTable, JumpTableData, Linkage,
    SigRef, StackSlot, Value,
};
pub use function::{Function, StackSlotData};
pub use instructions::{InstructionData, MemFlags, Opcode};
pub use layout::Layout;
pub use signature::{AbiParam, ArgumentExtension, ArgumentPurpose, CallConv, Signature};
pub use types::Type;
