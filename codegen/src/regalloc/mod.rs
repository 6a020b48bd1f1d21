//! Register allocation: liveness, interference, and Chaitin-Briggs coloring
//! with iterated coalescing (spec.md §4.6, §4.7).

pub mod coloring;
pub mod interference;
pub mod liveness;

pub use coloring::{allocate, RegAllocResult};
pub use interference::InterferenceGraph;
pub use liveness::Liveness;
