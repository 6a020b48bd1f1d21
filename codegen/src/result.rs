//! The error taxonomy surfaced to clients (spec.md §7).
//!
//! There is no partial recovery in lowering or register allocation: a
//! compile either produces a `CompiledCode` or fails with one of these,
//! reported with as much function/block/instruction context as is known at
//! the point of failure.

use crate::ir::builder::ConstructionError;
use crate::ir::types::Type;
use crate::verifier::VerifierErrors;
use failure_derive::Fail;

#[derive(Debug, Fail)]
pub enum CodegenError {
    #[fail(display = "construction error: {}", _0)]
    Construction(ConstructionError),

    #[fail(display = "{}", _0)]
    Verifier(VerifierErrors),

    #[fail(display = "unsupported operation: no lowering rule matches {:?} on {}", opcode, ty)]
    Unsupported {
        opcode: crate::ir::instructions::Opcode,
        ty: Type,
    },

    #[fail(display = "signature mismatch at call site: {}", _0)]
    Signature(String),

    #[fail(display = "register allocation failed: {}", _0)]
    RegAllocFailure(String),

    #[fail(display = "encoding error: {}", _0)]
    Encoding(String),

    #[fail(display = "function exceeds implementation limits: {}", _0)]
    ImplLimitExceeded(String),

    #[fail(display = "generated code exceeds the maximum buffer size")]
    CodeTooLarge,
}

pub type CodegenResult<T> = Result<T, CodegenError>;

impl From<VerifierErrors> for CodegenError {
    fn from(e: VerifierErrors) -> Self {
        CodegenError::Verifier(e)
    }
}
