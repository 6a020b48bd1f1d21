//! Target-independent machine-instruction layer: virtual/physical
//! registers, the `VCode` container, ABI argument placement, and the
//! lowering engine (spec.md §4.4-§4.5).

pub mod abi;
pub mod lower;
pub mod reg;
pub mod vcode;

pub use abi::{AbiMachineSpec, ArgAssignment, ArgLoc, FrameLayout};
pub use lower::{LowerCtx, Priority, Rule, RuleTable, lower_function};
pub use reg::{PReg, RegClass, RegRef, VReg, VRegAllocator};
pub use vcode::{BranchTarget, MachInst, ParallelMove, VCode};
