//! Entity references: opaque, 32-bit handles into a `Function`'s arenas.
//!
//! These are never Rust references because (a) the borrow checker makes a
//! graph of cross-referencing instructions and values painful to express,
//! and (b) a `u32` index is a quarter the size of a 64-bit pointer and keeps
//! the arenas cache-friendly for liveness and dominator-tree scans. Every
//! cross-entity reference in this crate goes through one of these handles.

use core::fmt;
use retarget_entity::entity_impl;

/// A basic block. Owns an ordered list of typed parameters (the targets of
/// all its incoming edges) and an ordered, terminator-ending instruction
/// list once laid out.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An SSA-defined datum: the result of an instruction, or a block parameter.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// One IR instruction. Belongs to exactly one block once laid out.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A reference to an external or internally-known callee.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference to a `Signature` table entry.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A reference to a jump table: an ordered list of `BlockCall`s plus a
/// default `BlockCall`, used by `br_table`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// A symbolic stack slot; resolved to a concrete frame offset once the
/// frame layout is finalized after register allocation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A reference to any of the entities above, for diagnostics that need to
/// name "the thing that's wrong" generically (verifier errors, in
/// particular).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnyEntity {
    Function,
    Block(Block),
    Inst(Inst),
    Value(Value),
    FuncRef(FuncRef),
    SigRef(SigRef),
    JumpTable(JumpTable),
    StackSlot(StackSlot),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AnyEntity::Function => write!(f, "function"),
            AnyEntity::Block(r) => r.fmt(f),
            AnyEntity::Inst(r) => r.fmt(f),
            AnyEntity::Value(r) => r.fmt(f),
            AnyEntity::FuncRef(r) => r.fmt(f),
            AnyEntity::SigRef(r) => r.fmt(f),
            AnyEntity::JumpTable(r) => r.fmt(f),
            AnyEntity::StackSlot(r) => r.fmt(f),
        }
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

macro_rules! any_entity_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for AnyEntity {
            fn from(r: $ty) -> Self {
                AnyEntity::$variant(r)
            }
        }
    };
}

any_entity_from!(Block, Block);
any_entity_from!(Inst, Inst);
any_entity_from!(Value, Value);
any_entity_from!(FuncRef, FuncRef);
any_entity_from!(SigRef, SigRef);
any_entity_from!(JumpTable, JumpTable);
any_entity_from!(StackSlot, StackSlot);

/// `(target block, argument value list)`. Every inter-block edge carries
/// arguments to the destination's block parameters — this crate has true
/// SSA with block arguments, not explicit phi instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockCall {
    pub block: Block,
    pub args: Vec<Value>,
}

impl BlockCall {
    pub fn new(block: Block, args: Vec<Value>) -> Self {
        Self { block, args }
    }
}

impl fmt::Display for BlockCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.block)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", a)?;
        }
        write!(f, ")")
    }
}

/// How an external function is named. A real embedder would carry a richer
/// name (module + field, or a `UserFuncName`); we keep this intentionally
/// small since naming/linking is out of scope for this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExternalName {
    /// A name recognized only by the embedder, opaque to this crate.
    User(String),
    /// A libcall-style well-known runtime helper (e.g. integer division
    /// trap, software FP emulation on targets that need it).
    LibCall(&'static str),
}

impl fmt::Display for ExternalName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExternalName::User(n) => write!(f, "%{}", n),
            ExternalName::LibCall(n) => write!(f, "%{}", n),
        }
    }
}

/// How an external function is reached.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Linkage {
    Import,
    Local,
    Preemptible,
    Export,
}

/// A jump table entry list: `table[i]` for `i = 0..N` plus a mandatory
/// default.
#[derive(Clone, Debug, Default)]
pub struct JumpTableData {
    table: Vec<BlockCall>,
    default: Option<BlockCall>,
}

impl JumpTableData {
    pub fn new(default: BlockCall, table: Vec<BlockCall>) -> Self {
        Self {
            table,
            default: Some(default),
        }
    }

    pub fn as_slice(&self) -> &[BlockCall] {
        &self.table
    }

    pub fn default_block(&self) -> &BlockCall {
        self.default
            .as_ref()
            .expect("jump table constructed without a default target")
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// All targets, including the default, for CFG/verifier purposes.
    pub fn all_branches(&self) -> impl Iterator<Item = &BlockCall> {
        self.table.iter().chain(self.default.iter())
    }
}
