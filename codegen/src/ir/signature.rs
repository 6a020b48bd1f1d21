//! Function signatures: the ABI-facing description of a function's
//! parameters and returns, independent of any one calling convention's
//! register assignment (that's `isa::abi`'s job).

use crate::ir::types::{StructLayout, Type};
use core::fmt;

/// Calling convention. `fast` and `preserve_all` are internal-only: `fast`
/// is used for calls between functions compiled by this crate with no
/// external ABI obligation, `preserve_all` clobbers almost nothing and is
/// meant for rarely-called runtime callbacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallConv {
    SystemV,
    WindowsFastcall,
    Aapcs64,
    AppleAarch64,
    Fast,
    PreserveAll,
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CallConv::SystemV => "system_v",
            CallConv::WindowsFastcall => "windows_fastcall",
            CallConv::Aapcs64 => "aapcs64",
            CallConv::AppleAarch64 => "apple_aarch64",
            CallConv::Fast => "fast",
            CallConv::PreserveAll => "preserve_all",
        };
        f.write_str(s)
    }
}

/// Why a parameter/return exists, beyond "it's a normal value" — lets the
/// ABI layer recognize the hidden struct-return pointer and vararg
/// boundary without the lowering engine having to special-case them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgumentPurpose {
    Normal,
    StructReturn,
    VMContext,
}

/// How a sub-register-width integer argument is extended to fill its slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgumentExtension {
    None,
    Sext,
    Uext,
}

/// One parameter or return value in a `Signature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiParam {
    pub value_type: Type,
    pub purpose: ArgumentPurpose,
    pub extension: ArgumentExtension,
    /// Present only for `struct`-typed parameters/returns; `None` for
    /// ordinary scalar/vector values.
    pub struct_layout: Option<StructLayout>,
}

impl AbiParam {
    pub fn new(value_type: Type) -> Self {
        Self {
            value_type,
            purpose: ArgumentPurpose::Normal,
            extension: ArgumentExtension::None,
            struct_layout: None,
        }
    }

    pub fn sext(value_type: Type) -> Self {
        Self {
            extension: ArgumentExtension::Sext,
            ..Self::new(value_type)
        }
    }

    pub fn uext(value_type: Type) -> Self {
        Self {
            extension: ArgumentExtension::Uext,
            ..Self::new(value_type)
        }
    }

    pub fn special(value_type: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            purpose,
            ..Self::new(value_type)
        }
    }

    pub fn struct_arg(layout: StructLayout) -> Self {
        let mut p = Self::new(Type::default());
        p.struct_layout = Some(layout);
        p
    }

    pub fn is_struct(&self) -> bool {
        self.struct_layout.is_some()
    }
}

impl Default for Type {
    fn default() -> Self {
        crate::ir::types::I8
    }
}

/// A function's calling-convention-agnostic shape: parameter and return
/// types in declaration order, plus whether it is variadic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<AbiParam>,
    pub returns: Vec<AbiParam>,
    pub call_conv: CallConv,
    pub is_varargs: bool,
}

impl Signature {
    pub fn new(call_conv: CallConv) -> Self {
        Self {
            params: Vec::new(),
            returns: Vec::new(),
            call_conv,
            is_varargs: false,
        }
    }
}
